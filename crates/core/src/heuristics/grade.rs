//! Final grading and ranking of scored candidates.

use crate::config::GradeConfig;
use crate::heuristics::dictionary::dictionary_ratio;
use crate::model::{FrameAttributes, MatchResult};

/// Histogram ratio over the `{vars, args, regs}` frame sizes.
pub fn frame_ratio(a: &FrameAttributes, b: &FrameAttributes) -> f64 {
    dictionary_ratio(&a.histogram(), &b.histogram())
}

pub fn grade(graph_ratio: f64, frame_ratio: f64, config: &GradeConfig) -> f64 {
    config.graph_weight * graph_ratio + config.frame_weight * frame_ratio
}

/// Inclusive threshold.
pub fn is_accepted(grade: f64, config: &GradeConfig) -> bool {
    grade >= config.matching_threshold
}

/// Order by grade descending, then by signature for determinism.
pub fn rank(mut matches: Vec<MatchResult>) -> Vec<MatchResult> {
    matches.sort_by(|a, b| b.grade.total_cmp(&a.grade).then_with(|| a.signature.cmp(&b.signature)));
    matches
}
