use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Fingerprint, FlowGraph, FrameAttributes};

/// Fields every submitted fingerprint must carry.
pub const REQUIRED_FIELDS: [&str; 10] = [
    "func_signature",
    "func_name",
    "frame_attributes",
    "itypes",
    "strings",
    "immediates",
    "calls",
    "exe_signature",
    "exe_name",
    "graph",
];

/// A fingerprint was rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid fingerprint field '{field}': {reason}")]
pub struct InvalidFingerprint {
    /// Dotted path of the offending field (e.g. `graph.edges`).
    pub field: String,
    pub reason: String,
}

impl InvalidFingerprint {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }

    fn missing(field: &str) -> Self {
        Self::new(field, "required field is missing")
    }
}

/// Wire shape of a fingerprint as produced by the analysis front-end.
///
/// Every field is optional here so that a missing field can be reported by name
/// instead of failing deserialization. Offset-keyed maps use string keys on the
/// wire (`{"12": "printf"}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_attributes: Option<FrameRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itypes: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strings: Option<BTreeMap<usize, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediates: Option<BTreeMap<usize, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calls: Option<BTreeMap<usize, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exe_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exe_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vars_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regs_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<(usize, usize)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks_bounds: Option<Vec<(usize, usize)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_of_blocks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_of_edges: Option<usize>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, InvalidFingerprint> {
    value.ok_or_else(|| InvalidFingerprint::missing(field))
}

impl TryFrom<FingerprintRecord> for Fingerprint {
    type Error = InvalidFingerprint;

    fn try_from(record: FingerprintRecord) -> Result<Self, Self::Error> {
        Fingerprint::from_record(record)
    }
}

impl Fingerprint {
    /// Validate a wire record and build a fingerprint from it.
    ///
    /// Required fields are checked in [`REQUIRED_FIELDS`] order, then the frame,
    /// the block partition, the edge list and the reference offsets.
    pub fn from_record(record: FingerprintRecord) -> Result<Self, InvalidFingerprint> {
        let signature = required(record.func_signature, "func_signature")?;
        let name = required(record.func_name, "func_name")?;
        let frame = required(record.frame_attributes, "frame_attributes")?;
        let itypes = required(record.itypes, "itypes")?;
        let strings = required(record.strings, "strings")?;
        let immediates = required(record.immediates, "immediates")?;
        let calls = required(record.calls, "calls")?;
        let exe_signature = required(record.exe_signature, "exe_signature")?;
        let exe_name = required(record.exe_name, "exe_name")?;
        let graph = required(record.graph, "graph")?;

        if signature.trim().is_empty() {
            return Err(InvalidFingerprint::new("func_signature", "must not be empty"));
        }

        let frame = FrameAttributes {
            vars_size: required(frame.vars_size, "frame_attributes.vars_size")?,
            args_size: required(frame.args_size, "frame_attributes.args_size")?,
            regs_size: required(frame.regs_size, "frame_attributes.regs_size")?,
            frame_size: required(frame.frame_size, "frame_attributes.frame_size")?,
        };

        let num_insns = itypes.len();
        let graph = validate_graph(graph, num_insns)?;
        check_offsets(strings.keys(), num_insns, "strings")?;
        check_offsets(calls.keys(), num_insns, "calls")?;
        check_offsets(immediates.keys(), num_insns, "immediates")?;

        Ok(Self {
            signature,
            name,
            exe_signature,
            exe_name,
            frame,
            itypes,
            strings,
            calls,
            immediates,
            graph,
        })
    }

    /// Convert back to the wire shape (used for storage and export).
    pub fn to_record(&self) -> FingerprintRecord {
        FingerprintRecord {
            func_signature: Some(self.signature.clone()),
            func_name: Some(self.name.clone()),
            frame_attributes: Some(FrameRecord {
                vars_size: Some(self.frame.vars_size),
                args_size: Some(self.frame.args_size),
                regs_size: Some(self.frame.regs_size),
                frame_size: Some(self.frame.frame_size),
            }),
            itypes: Some(self.itypes.clone()),
            strings: Some(self.strings.clone()),
            immediates: Some(self.immediates.clone()),
            calls: Some(self.calls.clone()),
            exe_signature: Some(self.exe_signature.clone()),
            exe_name: Some(self.exe_name.clone()),
            graph: Some(GraphRecord {
                edges: Some(self.graph.edges().iter().copied().collect()),
                blocks_bounds: Some(self.graph.blocks_bounds().to_vec()),
                num_of_blocks: Some(self.graph.num_blocks()),
                num_of_edges: Some(self.graph.num_edges()),
            }),
        }
    }
}

fn validate_graph(graph: GraphRecord, num_insns: usize) -> Result<FlowGraph, InvalidFingerprint> {
    let bounds = required(graph.blocks_bounds, "graph.blocks_bounds")?;
    let edge_list = required(graph.edges, "graph.edges")?;

    // Bounds must partition [0, num_insns) into non-empty, address-ordered blocks.
    let mut expected_start = 0;
    for (idx, &(start, end)) in bounds.iter().enumerate() {
        if start != expected_start {
            return Err(InvalidFingerprint::new(
                "graph.blocks_bounds",
                format!("block {idx} starts at {start}, expected {expected_start}"),
            ));
        }
        if end <= start {
            return Err(InvalidFingerprint::new(
                "graph.blocks_bounds",
                format!("block {idx} is empty or reversed ({start}..{end})"),
            ));
        }
        expected_start = end;
    }
    if expected_start != num_insns {
        return Err(InvalidFingerprint::new(
            "graph.blocks_bounds",
            format!("blocks cover {expected_start} instructions but itypes has {num_insns}"),
        ));
    }
    if let Some(declared) = graph.num_of_blocks {
        if declared != bounds.len() {
            return Err(InvalidFingerprint::new(
                "graph.num_of_blocks",
                format!("declared {declared} but blocks_bounds has {}", bounds.len()),
            ));
        }
    }

    let num_blocks = bounds.len();
    let mut edges = BTreeSet::new();
    for &(from, to) in &edge_list {
        if from >= num_blocks || to >= num_blocks {
            return Err(InvalidFingerprint::new(
                "graph.edges",
                format!("edge ({from}, {to}) references a block outside 0..{num_blocks}"),
            ));
        }
        if !edges.insert((from, to)) {
            return Err(InvalidFingerprint::new(
                "graph.edges",
                format!("duplicate edge ({from}, {to})"),
            ));
        }
    }
    if let Some(declared) = graph.num_of_edges {
        if declared != edges.len() {
            return Err(InvalidFingerprint::new(
                "graph.num_of_edges",
                format!("declared {declared} but edges has {}", edges.len()),
            ));
        }
    }

    Ok(FlowGraph::new_unchecked(edges, bounds))
}

fn check_offsets<'a>(
    offsets: impl Iterator<Item = &'a usize>,
    num_insns: usize,
    field: &str,
) -> Result<(), InvalidFingerprint> {
    for &offset in offsets {
        if offset >= num_insns {
            return Err(InvalidFingerprint::new(
                field,
                format!("offset {offset} is outside 0..{num_insns}"),
            ));
        }
    }
    Ok(())
}
