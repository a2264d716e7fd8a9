use std::collections::BTreeSet;

/// Control-flow graph of a function.
///
/// Blocks are identified by their index in `blocks_bounds`, which is sorted by
/// address. Each bound is a half-open instruction range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlowGraph {
    edges: BTreeSet<(usize, usize)>,
    blocks_bounds: Vec<(usize, usize)>,
}

impl FlowGraph {
    /// Build a graph without checking it; callers go through fingerprint validation.
    pub(crate) fn new_unchecked(
        edges: BTreeSet<(usize, usize)>,
        blocks_bounds: Vec<(usize, usize)>,
    ) -> Self {
        Self { edges, blocks_bounds }
    }

    pub fn edges(&self) -> &BTreeSet<(usize, usize)> {
        &self.edges
    }

    pub fn blocks_bounds(&self) -> &[(usize, usize)] {
        &self.blocks_bounds
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks_bounds.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.edges.contains(&(from, to))
    }
}

/// Borrowed view of one basic block's attributes.
///
/// Derived on demand from a [`crate::model::Fingerprint`]; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'a> {
    pub itypes: &'a [u32],
    pub strings: Vec<&'a str>,
    pub calls: Vec<&'a str>,
    pub immediates: Vec<u64>,
}

impl Block<'_> {
    pub fn len(&self) -> usize {
        self.itypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itypes.is_empty()
    }
}
