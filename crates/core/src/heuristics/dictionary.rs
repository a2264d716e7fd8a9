//! Histogram ("dictionary") similarity.

use std::collections::{BTreeMap, BTreeSet};

/// Count occurrences of each element.
pub fn histogram<T: Ord + Copy>(items: &[T]) -> BTreeMap<T, u64> {
    let mut counts = BTreeMap::new();
    for &item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    counts
}

/// Similarity of two multisets.
///
/// Every key contributes its combined count `a + b`, scaled by `min(a, b) / max(a, b)`;
/// the ratio is the scaled sum over the plain sum. Keys absent from one side count
/// as zero there. Two empty histograms compare as identical (`1.0`).
///
/// The result is symmetric: keys are visited in the same sorted order whichever side
/// is passed first.
pub fn dictionary_ratio<K: Ord>(a: &BTreeMap<K, u64>, b: &BTreeMap<K, u64>) -> f64 {
    let keys: BTreeSet<&K> = a.keys().chain(b.keys()).collect();

    let mut f_sum = 0.0;
    let mut d_sum = 0.0;
    for key in keys {
        let a_value = a.get(key).copied().unwrap_or(0);
        let b_value = b.get(key).copied().unwrap_or(0);
        let maximum = a_value.max(b_value);
        if maximum == 0 {
            continue;
        }
        let minimum = a_value.min(b_value);
        let combined = (a_value + b_value) as f64;
        f_sum += combined;
        d_sum += combined * (minimum as f64 / maximum as f64);
    }

    if f_sum > 0.0 {
        d_sum / f_sum
    } else {
        1.0
    }
}
