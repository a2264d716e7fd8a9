use redb_core::config::GradeConfig;
use redb_core::heuristics::grade::{frame_ratio, grade, is_accepted, rank};
use redb_core::model::{FrameAttributes, MatchResult};

fn result(signature: &str, grade: f64) -> MatchResult {
    MatchResult {
        signature: signature.to_string(),
        name: format!("sub_{signature}"),
        exe_name: "game.exe".to_string(),
        grade,
        graph_ratio: grade,
        frame_ratio: 1.0,
        correspondence: Vec::new(),
        exact: true,
    }
}

#[test]
fn grade_blends_graph_and_frame() {
    let config = GradeConfig::default();
    assert!((grade(1.0, 1.0, &config) - 1.0).abs() < 1e-12);
    assert!((grade(0.5, 1.0, &config) - (0.95 * 0.5 + 0.05)).abs() < 1e-12);
}

#[test]
fn grade_is_monotonic_in_both_inputs() {
    let config = GradeConfig::default();
    let steps: Vec<f64> = (0..=10).map(|i| i as f64 / 10.0).collect();
    for &fixed in &steps {
        for pair in steps.windows(2) {
            assert!(grade(pair[0], fixed, &config) <= grade(pair[1], fixed, &config));
            assert!(grade(fixed, pair[0], &config) <= grade(fixed, pair[1], &config));
        }
    }
}

#[test]
fn acceptance_threshold_is_inclusive() {
    let config = GradeConfig::default();
    assert!(is_accepted(0.9, &config));
    assert!(!is_accepted(0.8999, &config));
}

#[test]
fn frame_ratio_compares_three_sizes() {
    let a = FrameAttributes { vars_size: 4, args_size: 0, regs_size: 8, frame_size: 12 };
    let b = FrameAttributes { frame_size: 99, ..a };
    assert_eq!(frame_ratio(&a, &b), 1.0);

    let c = FrameAttributes { vars_size: 8, ..a };
    // vars: 12 * 4/8, regs: 16 * 1.
    assert!((frame_ratio(&a, &c) - (6.0 + 16.0) / 28.0).abs() < 1e-12);

    let empty = FrameAttributes::default();
    assert_eq!(frame_ratio(&empty, &empty), 1.0);
}

#[test]
fn rank_sorts_by_grade_then_signature() {
    let ranked = rank(vec![result("b", 0.92), result("c", 0.97), result("a", 0.92)]);
    let order: Vec<&str> = ranked.iter().map(|m| m.signature.as_str()).collect();
    assert_eq!(order, vec!["c", "a", "b"]);
}
