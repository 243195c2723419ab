use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algorithms::components::ComponentsConfig;
use crate::algorithms::ktruss::KTrussConfig;
use crate::error::{GraphError, Result};

/// Degree at which a vertex's edges are fanned out across workers instead of
/// being walked by a single worker.
pub const DEFAULT_EDGE_GRAIN: usize = 10;

/// Engine settings, loadable from YAML.
///
/// ```yaml
/// num_threads: 8
/// edge_grain: 16
/// components:
///   vertex_policy: fixed
///   strategy: min_exchange
///   remote_min_warmup: true
/// ktruss:
///   worklist_policy: dynamic
/// ```
///
/// Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads; 0 lets rayon choose.
    pub num_threads: usize,
    pub edge_grain: usize,
    pub components: ComponentsConfig,
    pub ktruss: KTrussConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            edge_grain: DEFAULT_EDGE_GRAIN,
            components: ComponentsConfig::default(),
            ktruss: KTrussConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }
}
