//! Core data model: function fingerprints, their control-flow graphs, and match results.
//!
//! A [`Fingerprint`] can only be built through [`Fingerprint::from_record`], which runs
//! the full validation contract once at the boundary. Everything downstream (filters,
//! heuristics, matching service) reads fingerprints and never mutates them.

mod graph;
mod record;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use graph::{Block, FlowGraph};
pub use record::{FingerprintRecord, FrameRecord, GraphRecord, InvalidFingerprint, REQUIRED_FIELDS};

/// Stack-frame layout of a function, as reported by the analysis front-end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameAttributes {
    pub vars_size: u64,
    pub args_size: u64,
    pub regs_size: u64,
    pub frame_size: u64,
}

impl FrameAttributes {
    /// Frame sizes viewed as a three-key histogram, for histogram similarity.
    ///
    /// `frame_size` is excluded; it is the sum of the other three plus padding.
    pub fn histogram(&self) -> BTreeMap<&'static str, u64> {
        BTreeMap::from([
            ("vars_size", self.vars_size),
            ("args_size", self.args_size),
            ("regs_size", self.regs_size),
        ])
    }
}

/// Gross counters compared by the coarse filter (and by storage-level prefilters).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoarseCounters {
    pub num_insns: u64,
    pub num_blocks: u64,
    pub num_edges: u64,
    pub num_strings: u64,
    pub num_calls: u64,
    pub num_imms: u64,
    pub vars_size: u64,
    pub args_size: u64,
    pub regs_size: u64,
}

/// Validated structural summary of one function.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    signature: String,
    name: String,
    exe_signature: String,
    exe_name: String,
    frame: FrameAttributes,
    itypes: Vec<u32>,
    strings: BTreeMap<usize, String>,
    calls: BTreeMap<usize, String>,
    immediates: BTreeMap<usize, u64>,
    graph: FlowGraph,
}

impl Fingerprint {
    /// Unique key of the function body within a corpus.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exe_signature(&self) -> &str {
        &self.exe_signature
    }

    pub fn exe_name(&self) -> &str {
        &self.exe_name
    }

    pub fn frame(&self) -> &FrameAttributes {
        &self.frame
    }

    /// Opcode-class code per instruction, in program order.
    pub fn itypes(&self) -> &[u32] {
        &self.itypes
    }

    pub fn strings(&self) -> &BTreeMap<usize, String> {
        &self.strings
    }

    pub fn calls(&self) -> &BTreeMap<usize, String> {
        &self.calls
    }

    pub fn immediates(&self) -> &BTreeMap<usize, u64> {
        &self.immediates
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn num_insns(&self) -> usize {
        self.itypes.len()
    }

    pub fn counters(&self) -> CoarseCounters {
        CoarseCounters {
            num_insns: self.itypes.len() as u64,
            num_blocks: self.graph.num_blocks() as u64,
            num_edges: self.graph.num_edges() as u64,
            num_strings: self.strings.len() as u64,
            num_calls: self.calls.len() as u64,
            num_imms: self.immediates.len() as u64,
            vars_size: self.frame.vars_size,
            args_size: self.frame.args_size,
            regs_size: self.frame.regs_size,
        }
    }

    /// Multiset of opcode classes.
    pub fn itype_histogram(&self) -> BTreeMap<u32, u64> {
        crate::heuristics::dictionary::histogram(&self.itypes)
    }

    /// Per-block views over the instruction attributes, in block order.
    pub fn blocks(&self) -> Vec<Block<'_>> {
        self.graph
            .blocks_bounds()
            .iter()
            .map(|&(start, end)| Block {
                itypes: &self.itypes[start..end],
                strings: self.strings.range(start..end).map(|(_, s)| s.as_str()).collect(),
                calls: self.calls.range(start..end).map(|(_, c)| c.as_str()).collect(),
                immediates: self.immediates.range(start..end).map(|(_, imm)| *imm).collect(),
            })
            .collect()
    }
}

/// Human-authored description attached to a corpus function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub user: String,
    pub data: String,
    /// RFC 3339 timestamp of the last modification.
    pub modified: String,
}

/// One accepted candidate for a query, with the evidence that produced its grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub signature: String,
    pub name: String,
    pub exe_name: String,
    /// Final grade in `[0, 1]`.
    pub grade: f64,
    pub graph_ratio: f64,
    pub frame_ratio: f64,
    /// Matched `(query block, candidate block)` pairs.
    pub correspondence: Vec<(usize, usize)>,
    /// `false` when the clique search hit its budget; the grade is then provisional.
    pub exact: bool,
}
