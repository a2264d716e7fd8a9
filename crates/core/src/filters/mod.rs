//! Cheap candidate filters that run before graph scoring.
//!
//! Both filters are pure predicates over immutable fingerprints; they preserve the
//! corpus order of their survivors and run across candidates on the rayon pool.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{CoarseTolerances, DictionaryConfig};
use crate::heuristics::dictionary::dictionary_ratio;
use crate::model::{CoarseCounters, Fingerprint};

/// Deviation of one gross counter between query and candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CounterDeviation {
    pub counter: String,
    pub query: u64,
    pub candidate: u64,
    pub deviation: f64,
    pub tolerance: f64,
}

impl CounterDeviation {
    pub fn passes(&self) -> bool {
        self.deviation <= self.tolerance
    }
}

/// `|q - c| / max(q, c, 1)`; two zeros deviate by `0.0`.
pub fn relative_deviation(query: u64, candidate: u64) -> f64 {
    let denominator = query.max(candidate).max(1);
    query.abs_diff(candidate) as f64 / denominator as f64
}

/// Inclusive counter range a candidate must fall in to pass a tolerance, for
/// storage-level prefiltering. The upper bound is `None` when unbounded.
pub fn tolerance_range(query: u64, tolerance: f64) -> (u64, Option<u64>) {
    if tolerance >= 1.0 {
        return (0, None);
    }
    let q = query as f64;
    let low = (q * (1.0 - tolerance)).floor().max(0.0) as u64;
    let high = (q / (1.0 - tolerance)).ceil().max(1.0) as u64;
    (low, Some(high))
}

/// Pair every counter with its tolerance.
pub fn counter_tolerances(
    counters: &CoarseCounters,
    tolerances: &CoarseTolerances,
) -> [(&'static str, u64, f64); 9] {
    [
        ("num_insns", counters.num_insns, tolerances.num_insns),
        ("num_blocks", counters.num_blocks, tolerances.num_blocks),
        ("num_edges", counters.num_edges, tolerances.num_edges),
        ("num_strings", counters.num_strings, tolerances.num_strings),
        ("num_calls", counters.num_calls, tolerances.num_calls),
        ("num_imms", counters.num_imms, tolerances.num_imms),
        ("vars_size", counters.vars_size, tolerances.vars_size),
        ("args_size", counters.args_size, tolerances.args_size),
        ("regs_size", counters.regs_size, tolerances.regs_size),
    ]
}

/// Every counter deviation, in a fixed order.
pub fn coarse_deviations(
    query: &CoarseCounters,
    candidate: &CoarseCounters,
    tolerances: &CoarseTolerances,
) -> Vec<CounterDeviation> {
    counter_tolerances(query, tolerances)
        .into_iter()
        .zip(counter_tolerances(candidate, tolerances))
        .map(|((counter, q, tolerance), (_, c, _))| CounterDeviation {
            counter: counter.to_string(),
            query: q,
            candidate: c,
            deviation: relative_deviation(q, c),
            tolerance,
        })
        .collect()
}

pub fn passes_coarse(
    query: &CoarseCounters,
    candidate: &CoarseCounters,
    tolerances: &CoarseTolerances,
) -> bool {
    counter_tolerances(query, tolerances)
        .into_iter()
        .zip(counter_tolerances(candidate, tolerances))
        .all(|((_, q, tolerance), (_, c, _))| relative_deviation(q, c) <= tolerance)
}

/// Candidates whose gross counters all stay within tolerance, in corpus order.
pub fn coarse_filter<'a>(
    query: &Fingerprint,
    candidates: &'a [Fingerprint],
    tolerances: &CoarseTolerances,
) -> Vec<&'a Fingerprint> {
    let q = query.counters();
    candidates
        .par_iter()
        .filter(|candidate| passes_coarse(&q, &candidate.counters(), tolerances))
        .collect()
}

/// Candidates whose opcode histogram ratio reaches the threshold, with that ratio.
pub fn dictionary_filter<'a>(
    query: &Fingerprint,
    candidates: &[&'a Fingerprint],
    config: &DictionaryConfig,
) -> Vec<(&'a Fingerprint, f64)> {
    let q = query.itype_histogram();
    candidates
        .par_iter()
        .map(|&candidate| (candidate, dictionary_ratio(&q, &candidate.itype_histogram())))
        .filter(|(_, ratio)| *ratio >= config.itypes_threshold)
        .collect()
}
