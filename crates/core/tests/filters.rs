use redb_core::config::{CoarseTolerances, DictionaryConfig};
use redb_core::filters::{
    coarse_deviations, coarse_filter, dictionary_filter, passes_coarse, relative_deviation,
    tolerance_range,
};
use redb_core::model::{CoarseCounters, Fingerprint, FingerprintRecord};
use serde_json::json;

fn single_block(signature: &str, itypes: &[u32]) -> Fingerprint {
    let record: FingerprintRecord = serde_json::from_value(json!({
        "func_signature": signature,
        "func_name": signature,
        "frame_attributes": {"vars_size": 4, "args_size": 0, "regs_size": 8, "frame_size": 12},
        "itypes": itypes,
        "strings": {},
        "immediates": {},
        "calls": {},
        "exe_signature": "None",
        "exe_name": "a.out",
        "graph": {"edges": [], "blocks_bounds": [[0, itypes.len()]]},
    }))
    .expect("record");
    Fingerprint::from_record(record).expect("valid fingerprint")
}

fn counters(num_insns: u64) -> CoarseCounters {
    CoarseCounters { num_insns, num_blocks: 1, ..CoarseCounters::default() }
}

#[test]
fn relative_deviation_uses_the_larger_side() {
    assert_eq!(relative_deviation(0, 0), 0.0);
    assert_eq!(relative_deviation(5, 4), 0.2);
    assert_eq!(relative_deviation(4, 5), 0.2);
    assert_eq!(relative_deviation(0, 3), 1.0);
}

#[test]
fn coarse_boundary_is_inclusive() {
    let tolerances = CoarseTolerances::default();
    assert!(passes_coarse(&counters(1000), &counters(800), &tolerances));
    assert!(!passes_coarse(&counters(1000), &counters(799), &tolerances));
    assert!(passes_coarse(&counters(800), &counters(1000), &tolerances));
}

#[test]
fn zero_counters_pass() {
    let zero = CoarseCounters::default();
    assert!(passes_coarse(&zero, &zero, &CoarseTolerances::default()));
}

#[test]
fn frame_sizes_use_their_own_tolerance() {
    let tolerances = CoarseTolerances::default();
    let q = CoarseCounters { vars_size: 10, ..CoarseCounters::default() };
    let near = CoarseCounters { vars_size: 7, ..CoarseCounters::default() };
    let far = CoarseCounters { vars_size: 6, ..CoarseCounters::default() };
    assert!(passes_coarse(&q, &near, &tolerances));
    assert!(!passes_coarse(&q, &far, &tolerances));
}

#[test]
fn deviations_report_every_counter() {
    let deviations =
        coarse_deviations(&counters(10), &counters(7), &CoarseTolerances::default());
    assert_eq!(deviations.len(), 9);
    let insns = &deviations[0];
    assert_eq!(insns.counter, "num_insns");
    assert!((insns.deviation - 0.3).abs() < 1e-9);
    assert!(!insns.passes());
    assert!(deviations[1..].iter().all(|d| d.passes()));
}

#[test]
fn coarse_filter_keeps_corpus_order() {
    let query = single_block("q", &[1, 2, 3, 1, 1]);
    let corpus = vec![
        single_block("a", &[1, 2, 3, 1]),
        single_block("far", &[1; 20]),
        single_block("b", &[9, 9, 9, 9, 9, 9]),
        single_block("c", &[1, 2, 3, 1, 1]),
    ];
    let survivors = coarse_filter(&query, &corpus, &CoarseTolerances::default());
    let names: Vec<&str> = survivors.iter().map(|f| f.signature()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn dictionary_filter_drops_unrelated_opcode_mixes() {
    let query = single_block("q", &[1, 2, 3, 1]);
    let corpus = vec![single_block("near", &[1, 2, 3, 1, 1]), single_block("disjoint", &[7, 8, 9, 7])];
    let refs: Vec<&Fingerprint> = corpus.iter().collect();

    let survivors = dictionary_filter(&query, &refs, &DictionaryConfig::default());
    assert_eq!(survivors.len(), 1);
    assert_eq!(survivors[0].0.signature(), "near");
    assert!(survivors[0].1 > 0.8);
}

#[test]
fn tolerance_range_brackets_passing_values() {
    assert_eq!(tolerance_range(10, 0.2), (8, Some(13)));
    assert_eq!(tolerance_range(0, 0.2), (0, Some(1)));
    assert_eq!(tolerance_range(10, 1.0), (0, None));

    let tolerances = CoarseTolerances::default();
    let (low, high) = tolerance_range(57, tolerances.num_insns);
    let high = high.expect("bounded");
    for candidate in 0..200u64 {
        if passes_coarse(&counters(57), &counters(candidate), &tolerances) {
            assert!(candidate >= low && candidate <= high, "{candidate} outside {low}..={high}");
        }
    }
}
