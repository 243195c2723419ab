use std::fs::File;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use memmap2::Mmap;
use rayon::prelude::*;

use crate::error::{GraphError, Result};
use crate::graph::{EdgeSlot, Graph, VertexId};

/// A raw list of vertex pairs, as read from an edge list file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeList {
    pub num_vertices: usize,
    pub pairs: Vec<(VertexId, VertexId)>,
}

impl EdgeList {
    /// Creates an edge list over `num_vertices` vertices.
    ///
    /// # Errors
    /// [`GraphError::VertexOutOfRange`] if a pair names a vertex `>= num_vertices`.
    pub fn new(num_vertices: usize, pairs: Vec<(VertexId, VertexId)>) -> Result<Self> {
        if let Some(&vertex) = pairs
            .iter()
            .flat_map(|(src, dst)| [src, dst])
            .find(|&&vertex| vertex >= num_vertices)
        {
            return Err(GraphError::VertexOutOfRange {
                vertex,
                num_vertices,
            });
        }
        Ok(Self {
            num_vertices,
            pairs,
        })
    }

    /// Creates an edge list whose vertex count is the largest id plus one.
    pub fn from_pairs(pairs: Vec<(VertexId, VertexId)>) -> Self {
        let num_vertices = pairs
            .iter()
            .map(|&(src, dst)| src.max(dst) + 1)
            .max()
            .unwrap_or(0);
        Self {
            num_vertices,
            pairs,
        }
    }

    /// Parses a whitespace separated `src dst` edge list.
    ///
    /// Blank lines and lines starting with `#` or `%` are skipped. Columns
    /// after the second are ignored, so weighted lists load as unweighted.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with_progress(text, &ProgressBar::hidden())
    }

    fn parse_with_progress(text: &str, progress: &ProgressBar) -> Result<Self> {
        let mut pairs = Vec::new();
        for (index, line) in text.lines().enumerate() {
            progress.inc(line.len() as u64 + 1);
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('%') {
                continue;
            }
            let mut tokens = trimmed.split_whitespace();
            let parsed = match (tokens.next(), tokens.next()) {
                (Some(src), Some(dst)) => src.parse::<VertexId>().ok().zip(dst.parse::<VertexId>().ok()),
                _ => None,
            };
            match parsed {
                Some(pair) => pairs.push(pair),
                None => {
                    return Err(GraphError::Parse {
                        line: index + 1,
                        content: line.to_string(),
                    })
                }
            }
        }
        Ok(Self::from_pairs(pairs))
    }

    /// Memory maps and parses an edge list file, showing load progress.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let io_error = |source| GraphError::Io {
            path: path.display().to_string(),
            source,
        };
        let file = File::open(path).map_err(io_error)?;
        // SAFETY: the map is read-only and dropped before this function returns;
        // the file is not expected to be modified while it is being parsed.
        let mapped = unsafe { Mmap::map(&file) }.map_err(io_error)?;
        let text = std::str::from_utf8(&mapped).map_err(|_| GraphError::Encoding {
            path: path.display().to_string(),
        })?;

        let progress = ProgressBar::new(mapped.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        progress.set_message("Edge list loading.");
        let edge_list = Self::parse_with_progress(text, &progress);
        progress.finish_and_clear();
        edge_list
    }
}

impl<E: EdgeSlot> Graph<E> {
    /// Builds an undirected graph.
    ///
    /// Self loops and duplicate pairs (in either orientation) are dropped.
    /// Each remaining undirected edge gets one handle and is stored as two
    /// directed slots carrying that handle. Edge lists come out sorted by
    /// destination.
    pub fn from_edge_list(edge_list: &EdgeList) -> Self {
        let mut undirected: Vec<(VertexId, VertexId)> = edge_list
            .pairs
            .par_iter()
            .filter(|(src, dst)| src != dst)
            .map(|&(src, dst)| (src.min(dst), src.max(dst)))
            .collect();
        undirected.par_sort_unstable();
        undirected.dedup();

        let mut degrees = vec![0usize; edge_list.num_vertices];
        for &(low, high) in &undirected {
            degrees[low] += 1;
            degrees[high] += 1;
        }
        let mut adjacency: Vec<Vec<E>> = degrees.iter().map(|&d| Vec::with_capacity(d)).collect();
        for (handle, &(low, high)) in undirected.iter().enumerate() {
            adjacency[low].push(E::new(high, handle));
            adjacency[high].push(E::new(low, handle));
        }

        let mut graph = Self::from_adjacency(adjacency, undirected.len());
        graph.sort_edge_lists();
        graph
    }

    /// Builds a graph that keeps each pair as a single directed slot.
    ///
    /// Duplicates and self loops are dropped; every slot gets its own handle.
    /// No mirror slot is guaranteed, so [`Graph::find_out_edge`] may fail on
    /// such graphs.
    pub fn from_directed_edge_list(edge_list: &EdgeList) -> Self {
        let mut directed: Vec<(VertexId, VertexId)> = edge_list
            .pairs
            .par_iter()
            .copied()
            .filter(|(src, dst)| src != dst)
            .collect();
        directed.par_sort_unstable();
        directed.dedup();

        let mut adjacency: Vec<Vec<E>> = vec![Vec::new(); edge_list.num_vertices];
        for (handle, &(src, dst)) in directed.iter().enumerate() {
            adjacency[src].push(E::new(dst, handle));
        }
        Self::from_adjacency(adjacency, directed.len())
    }
}
