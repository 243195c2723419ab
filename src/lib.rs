//! Shared-memory parallel graph analytics.
//!
//! A partitioned graph store ([`graph::Graph`]) holds per-vertex edge arrays
//! that algorithms may compact in place. On top of it sit an edge-balanced
//! [`worklist::Worklist`], replicated reduction scalars in [`parallel`], and
//! two engines: connected components by label propagation with tree climbing,
//! and k-truss decomposition by triangle counting and peeling.

pub mod algorithms;
pub mod config;
pub mod error;
pub mod graph;
pub mod measure;
pub mod parallel;
pub mod worklist;
