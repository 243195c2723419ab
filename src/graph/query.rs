use crate::graph::VertexId;

/// Read-only queries over a graph's current topology.
///
/// This trait is the narrow view the serial verifiers work against, so they
/// never depend on how the parallel engines lay out or mutate edge storage.
pub trait GraphQuery {
    /// Retrieves the current out-neighbors of a vertex.
    ///
    /// # Parameters
    ///
    /// * `vertex_id` - The vertex whose neighbors are being queried.
    ///
    /// # Returns
    ///
    /// The destination ids of every live out-edge, or an empty vector for a
    /// vertex outside the graph.
    fn read_neighbor(&self, vertex_id: &VertexId) -> Vec<VertexId>;

    /// Checks if a vertex exists in the graph.
    fn has_vertex(&self, vertex_id: &VertexId) -> bool;

    /// Determines if a live directed edge `src_id → dst_id` exists.
    fn has_edge(&self, src_id: &VertexId, dst_id: &VertexId) -> bool;

    /// Retrieves every vertex id in the graph.
    fn vertex_list(&self) -> Vec<VertexId>;
}
