use std::collections::BTreeMap;

use redb_core::config::BlockWeights;
use redb_core::heuristics::block::{block_ratio, BlockChannels};
use redb_core::heuristics::dictionary::{dictionary_ratio, histogram};
use redb_core::heuristics::sequence::{matching_blocks, sequence_ratio, MatchingBlock};
use redb_core::model::Block;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn block(itypes: &[u32]) -> Block<'_> {
    Block { itypes, strings: Vec::new(), calls: Vec::new(), immediates: Vec::new() }
}

#[test]
fn sequence_ratio_counts_matched_elements() {
    let a: Vec<char> = "abcd".chars().collect();
    let b: Vec<char> = "bcde".chars().collect();
    assert!(close(sequence_ratio(&a, &b), 0.75));

    assert!(close(sequence_ratio(&[1u32, 2, 3, 1], &[1, 2, 3, 1, 1]), 8.0 / 9.0));
}

#[test]
fn sequence_ratio_handles_empty_sequences() {
    let empty: [u32; 0] = [];
    assert_eq!(sequence_ratio(&empty, &empty), 1.0);
    assert_eq!(sequence_ratio(&[1u32], &empty), 0.0);
    assert_eq!(sequence_ratio(&empty, &[1u32]), 0.0);
}

#[test]
fn matching_blocks_recurse_on_both_sides_of_the_longest_run() {
    let a: Vec<char> = "abxcd".chars().collect();
    let b: Vec<char> = "abcd".chars().collect();
    let blocks = matching_blocks(&a, &b);
    assert_eq!(
        blocks,
        vec![MatchingBlock { a: 0, b: 0, len: 2 }, MatchingBlock { a: 3, b: 2, len: 2 }]
    );
}

#[test]
fn matching_blocks_prefer_the_earliest_run_on_ties() {
    let blocks = matching_blocks(&[7u32, 7], &[7u32]);
    assert_eq!(blocks, vec![MatchingBlock { a: 0, b: 0, len: 1 }]);
}

#[test]
fn histogram_counts_occurrences() {
    let counts = histogram(&[1u32, 2, 1, 1]);
    assert_eq!(counts, BTreeMap::from([(1, 3), (2, 1)]));
}

#[test]
fn dictionary_ratio_of_empty_histograms_is_one() {
    let empty: BTreeMap<u32, u64> = BTreeMap::new();
    assert_eq!(dictionary_ratio(&empty, &empty), 1.0);
}

#[test]
fn dictionary_ratio_against_empty_is_zero() {
    let one = BTreeMap::from([("x", 1u64)]);
    let empty = BTreeMap::new();
    assert_eq!(dictionary_ratio(&one, &empty), 0.0);
    assert_eq!(dictionary_ratio(&empty, &one), 0.0);
}

#[test]
fn dictionary_ratio_weights_by_combined_counts() {
    let a = histogram(&[1u32, 2, 3, 1]);
    let b = histogram(&[1u32, 2, 3, 1, 1]);
    // key 1: 5 * 2/3, keys 2 and 3: 2 each.
    let expected = (5.0 * 2.0 / 3.0 + 2.0 + 2.0) / 9.0;
    assert!(close(dictionary_ratio(&a, &b), expected));
}

#[test]
fn dictionary_ratio_is_symmetric() {
    let samples = [
        histogram(&[1u32, 1, 2, 9, 9, 9]),
        histogram(&[1u32, 2, 2, 2, 4]),
        histogram(&[3u32]),
        histogram(&[9u32, 9, 1, 4, 4, 4, 4]),
    ];
    for a in &samples {
        for b in &samples {
            assert_eq!(dictionary_ratio(a, b), dictionary_ratio(b, a));
        }
    }
}

#[test]
fn identical_blocks_score_one() {
    let itypes = [4u32, 5, 6];
    let a = Block {
        itypes: &itypes,
        strings: vec!["hello"],
        calls: vec!["printf"],
        immediates: vec![42],
    };
    assert_eq!(block_ratio(&a, &a.clone(), &BlockWeights::TOP_LEVEL), 1.0);
    assert_eq!(block_ratio(&a, &a.clone(), &BlockWeights::GRAPH_PRIMITIVE), 1.0);
}

#[test]
fn block_ratio_uses_the_given_weight_set() {
    let q = [1u32, 2, 3, 1];
    let c = [1u32, 2, 3, 1, 1];
    let top = block_ratio(&block(&q), &block(&c), &BlockWeights::TOP_LEVEL);
    let inner = block_ratio(&block(&q), &block(&c), &BlockWeights::GRAPH_PRIMITIVE);
    assert!(close(top, 0.7 * 8.0 / 9.0 + 0.3));
    assert!(close(inner, 0.8 * 8.0 / 9.0 + 0.2));
}

#[test]
fn block_channels_score_each_reference_list() {
    let itypes = [1u32, 2];
    let a = Block {
        itypes: &itypes,
        strings: vec!["a", "b"],
        calls: vec![],
        immediates: vec![1, 2, 3, 4],
    };
    let b = Block {
        itypes: &itypes,
        strings: vec!["a"],
        calls: vec!["exit"],
        immediates: vec![1, 2, 9, 9],
    };
    let channels = BlockChannels::compute(&a, &b);
    assert_eq!(channels.itypes, 1.0);
    assert!(close(channels.strings, 2.0 / 3.0));
    assert_eq!(channels.calls, 0.0);
    assert!(close(channels.immediates, 0.5));
}

#[test]
fn weight_sets_sum_to_one() {
    assert!(close(BlockWeights::TOP_LEVEL.sum(), 1.0));
    assert!(close(BlockWeights::GRAPH_PRIMITIVE.sum(), 1.0));
}
