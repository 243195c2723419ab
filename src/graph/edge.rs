/// Vertex identifier. Vertex ids are dense, `0..num_vertices`.
pub type VertexId = usize;

/// Identifier shared by both directed slots of one undirected edge.
///
/// Algorithms that keep per-edge state (k-truss support counts) index that
/// state by handle, so an update made through `u→v` is visible through `v→u`
/// without locating the mirror slot, and in-place compaction of an edge list
/// never invalidates it.
pub type EdgeHandle = usize;

/// A directed edge slot stored in a vertex's out-edge array.
pub trait EdgeSlot: Copy + Send + Sync {
    /// Builds a slot pointing at `dst` for the edge identified by `handle`.
    fn new(dst: VertexId, handle: EdgeHandle) -> Self;

    /// Destination vertex of this slot.
    fn dst(&self) -> VertexId;
}

/// Plain edge slot: destination only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub dst: VertexId,
}

impl EdgeSlot for Edge {
    fn new(dst: VertexId, _handle: EdgeHandle) -> Self {
        Self { dst }
    }

    fn dst(&self) -> VertexId {
        self.dst
    }
}

/// Edge slot carrying the handle of its undirected edge, used by k-truss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrussEdge {
    pub dst: VertexId,
    pub handle: EdgeHandle,
}

impl EdgeSlot for TrussEdge {
    fn new(dst: VertexId, handle: EdgeHandle) -> Self {
        Self { dst, handle }
    }

    fn dst(&self) -> VertexId {
        self.dst
    }
}
