//! Tunable thresholds and weights for the matching pipeline.
//!
//! All knobs live in one immutable [`MatchingConfig`] handed to the pipeline, so a
//! different weighting can be tried by loading a YAML/JSON file instead of
//! recompiling. Every field has a serde default; partial files override only what
//! they name.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read matching config at {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("Failed to parse matching config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to parse matching config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid matching config: {0}")]
    Invalid(String),
}

/// Maximum relative deviation allowed per gross counter (inclusive bound).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoarseTolerances {
    pub num_insns: f64,
    pub num_blocks: f64,
    pub num_edges: f64,
    pub num_strings: f64,
    pub num_calls: f64,
    pub num_imms: f64,
    pub vars_size: f64,
    pub args_size: f64,
    pub regs_size: f64,
}

impl Default for CoarseTolerances {
    fn default() -> Self {
        Self {
            num_insns: 0.2,
            num_blocks: 0.2,
            num_edges: 0.2,
            num_strings: 0.2,
            num_calls: 0.2,
            num_imms: 0.2,
            vars_size: 0.3,
            args_size: 0.3,
            regs_size: 0.3,
        }
    }
}

impl CoarseTolerances {
    fn all(&self) -> [(&'static str, f64); 9] {
        [
            ("num_insns", self.num_insns),
            ("num_blocks", self.num_blocks),
            ("num_edges", self.num_edges),
            ("num_strings", self.num_strings),
            ("num_calls", self.num_calls),
            ("num_imms", self.num_imms),
            ("vars_size", self.vars_size),
            ("args_size", self.args_size),
            ("regs_size", self.regs_size),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    /// Minimum opcode-histogram ratio for a candidate to survive.
    pub itypes_threshold: f64,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self { itypes_threshold: 0.8 }
    }
}

/// Weights of the four attribute channels of block similarity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockWeights {
    pub itypes: f64,
    pub strings: f64,
    pub calls: f64,
    pub immediates: f64,
}

impl BlockWeights {
    /// Weights used when grading a block pair on its own.
    pub const TOP_LEVEL: BlockWeights =
        BlockWeights { itypes: 0.7, strings: 0.075, calls: 0.15, immediates: 0.075 };

    /// Weights used for candidate-node scoring inside whole-graph similarity.
    pub const GRAPH_PRIMITIVE: BlockWeights =
        BlockWeights { itypes: 0.8, strings: 0.1, calls: 0.1, immediates: 0.0 };

    pub fn sum(&self) -> f64 {
        self.itypes + self.strings + self.calls + self.immediates
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Block pairs scoring at or below this never become correspondence nodes.
    pub min_node_weight: f64,
    /// Largest compatibility graph (in nodes) the clique search is run on.
    pub max_graph_comp_size: usize,
    /// Multiplier applied to the ratio of a truncated clique search.
    pub truncated_penalty: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { min_node_weight: 0.75, max_graph_comp_size: 5000, truncated_penalty: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliqueConfig {
    /// Search nodes expanded before the clique search gives up.
    pub node_budget: u64,
    /// Wall-clock budget per clique search, in milliseconds. `0` disables it.
    pub time_budget_ms: u64,
}

impl Default for CliqueConfig {
    fn default() -> Self {
        Self { node_budget: 2_000_000, time_budget_ms: 2_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeConfig {
    pub graph_weight: f64,
    pub frame_weight: f64,
    /// Grades at or above this are accepted matches.
    pub matching_threshold: f64,
}

impl Default for GradeConfig {
    fn default() -> Self {
        Self { graph_weight: 0.95, frame_weight: 0.05, matching_threshold: 0.9 }
    }
}

/// Complete configuration of one matching pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub coarse: CoarseTolerances,
    pub dictionary: DictionaryConfig,
    pub block_weights: BlockWeights,
    pub graph_block_weights: BlockWeights,
    pub graph: GraphConfig,
    pub clique: CliqueConfig,
    pub grade: GradeConfig,
    /// Worker threads for per-candidate scoring; `0` uses one per CPU.
    pub workers: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            coarse: CoarseTolerances::default(),
            dictionary: DictionaryConfig::default(),
            block_weights: BlockWeights::TOP_LEVEL,
            graph_block_weights: BlockWeights::GRAPH_PRIMITIVE,
            graph: GraphConfig::default(),
            clique: CliqueConfig::default(),
            grade: GradeConfig::default(),
            workers: 0,
        }
    }
}

const WEIGHT_SUM_EPSILON: f64 = 1e-6;

impl MatchingConfig {
    /// Load a config file: `.json` is parsed as JSON, anything else as YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let body = std::fs::read(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        let config: MatchingConfig = if path.extension().and_then(|e| e.to_str()) == Some("json")
        {
            serde_json::from_slice(&body)?
        } else {
            serde_yaml::from_slice(&body)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |name: &str, value: f64| -> Result<(), ConfigError> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{name} must be within [0, 1], got {value}")))
            }
        };

        for (name, tolerance) in self.coarse.all() {
            if tolerance.is_nan() || tolerance < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "coarse.{name} must be non-negative, got {tolerance}"
                )));
            }
        }
        unit("dictionary.itypes_threshold", self.dictionary.itypes_threshold)?;
        unit("graph.min_node_weight", self.graph.min_node_weight)?;
        unit("graph.truncated_penalty", self.graph.truncated_penalty)?;
        unit("grade.matching_threshold", self.grade.matching_threshold)?;

        for (name, weights) in
            [("block_weights", &self.block_weights), ("graph_block_weights", &self.graph_block_weights)]
        {
            for (channel, value) in [
                ("itypes", weights.itypes),
                ("strings", weights.strings),
                ("calls", weights.calls),
                ("immediates", weights.immediates),
            ] {
                unit(&format!("{name}.{channel}"), value)?;
            }
            if (weights.sum() - 1.0).abs() > WEIGHT_SUM_EPSILON {
                return Err(ConfigError::Invalid(format!(
                    "{name} must sum to 1.0, got {}",
                    weights.sum()
                )));
            }
        }

        unit("grade.graph_weight", self.grade.graph_weight)?;
        unit("grade.frame_weight", self.grade.frame_weight)?;
        if (self.grade.graph_weight + self.grade.frame_weight - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ConfigError::Invalid("grade weights must sum to 1.0".into()));
        }
        if self.clique.node_budget == 0 {
            return Err(ConfigError::Invalid("clique.node_budget must be positive".into()));
        }
        Ok(())
    }

    /// SHA-256 of the canonical JSON form; identifies the config in query history.
    pub fn digest(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        format!("{:x}", hasher.finalize())
    }
}
