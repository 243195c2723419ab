use crate::graph::VertexId;

/// Errors raised while loading a graph or configuring the engines.
///
/// The analytics core itself has no recoverable failures; misuse of the
/// graph store (missing mirror edges, growing an edge list, unsorted input to
/// k-truss) panics instead.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph or configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The edge list file is not valid UTF-8.
    #[error("edge list {path} is not valid UTF-8")]
    Encoding { path: String },

    /// A non-comment line did not contain two vertex ids.
    #[error("malformed edge on line {line}: {content:?}")]
    Parse { line: usize, content: String },

    /// An edge names a vertex outside the declared vertex range.
    #[error("vertex {vertex} out of range for a graph with {num_vertices} vertices")]
    VertexOutOfRange {
        vertex: VertexId,
        num_vertices: usize,
    },

    /// The YAML engine configuration could not be decoded.
    #[error("invalid engine configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    /// The worker pool could not be created.
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GraphError::Parse {
            line: 3,
            content: "1 x".to_string(),
        };
        assert_eq!(err.to_string(), "malformed edge on line 3: \"1 x\"");

        let err = GraphError::VertexOutOfRange {
            vertex: 9,
            num_vertices: 4,
        };
        assert_eq!(
            err.to_string(),
            "vertex 9 out of range for a graph with 4 vertices"
        );
    }
}
