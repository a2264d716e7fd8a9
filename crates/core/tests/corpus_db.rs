use redb_core::config::MatchingConfig;
use redb_core::db::{CorpusDb, DbError, QueryRunRecord, QueryRunStatus, CURRENT_SCHEMA_VERSION};
use redb_core::model::{Fingerprint, FingerprintRecord};
use redb_core::services::{AnnotationStore, Matcher};
use serde_json::json;
use tempfile::tempdir;

fn fingerprint(signature: &str, itypes: &[u32], exe_signature: &str, exe_name: &str) -> Fingerprint {
    let record: FingerprintRecord = serde_json::from_value(json!({
        "func_signature": signature,
        "func_name": format!("sub_{signature}"),
        "frame_attributes": {"vars_size": 4, "args_size": 0, "regs_size": 8, "frame_size": 12},
        "itypes": itypes,
        "strings": {"0": "hello"},
        "immediates": {},
        "calls": {},
        "exe_signature": exe_signature,
        "exe_name": exe_name,
        "graph": {"edges": [], "blocks_bounds": [[0, itypes.len()]]},
    }))
    .expect("record");
    Fingerprint::from_record(record).expect("valid fingerprint")
}

fn run(signature: &str, status: QueryRunStatus) -> QueryRunRecord {
    QueryRunRecord {
        query_signature: signature.to_string(),
        config_digest: MatchingConfig::default().digest(),
        status,
        corpus_size: 3,
        survivors: 1,
        matches: 1,
        best_match: Some("best".to_string()),
        started_at: "2024-01-01T00:00:00+00:00".to_string(),
        finished_at: "2024-01-01T00:00:01+00:00".to_string(),
    }
}

#[test]
fn open_creates_schema_and_reopens() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("corpus.db");

    {
        let db = CorpusDb::open(&path).expect("open");
        assert_eq!(db.schema_version().expect("version"), CURRENT_SCHEMA_VERSION);
        db.insert_fingerprint(&fingerprint("f1", &[1, 2, 3], "exe-1", "a.exe")).expect("insert");
    }

    let db = CorpusDb::open(&path).expect("reopen");
    assert_eq!(db.schema_version().expect("version"), CURRENT_SCHEMA_VERSION);
    assert_eq!(db.list_functions().expect("list").len(), 1);
}

#[test]
fn newer_schema_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("corpus.db");
    {
        let conn = rusqlite::Connection::open(&path).expect("raw open");
        conn.pragma_update(None, "user_version", 99).expect("set version");
    }

    let err = CorpusDb::open(&path).unwrap_err();
    assert!(matches!(err, DbError::UnsupportedSchemaVersion { found: 99, .. }));
    assert!(err.to_string().contains("Unsupported schema version 99"));
}

#[test]
fn insert_is_get_or_create_by_signature() {
    let db = CorpusDb::open_in_memory().expect("db");
    let first = db.insert_fingerprint(&fingerprint("f1", &[1, 2, 3], "exe-1", "a.exe")).expect("insert");
    let again = db.insert_fingerprint(&fingerprint("f1", &[9, 9], "exe-2", "b.exe")).expect("insert");
    assert_eq!(first, again);

    let functions = db.list_functions().expect("list");
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0].signature, "f1");
    assert_eq!(functions[0].counters.num_insns, 3);
    assert_eq!(functions[0].counters.num_strings, 1);
    // The duplicate submission records nothing about its executable.
    assert_eq!(db.list_executables().expect("executables").len(), 1);
}

#[test]
fn executable_names_accumulate_without_duplicates() {
    let db = CorpusDb::open_in_memory().expect("db");
    db.insert_fingerprint(&fingerprint("f1", &[1], "exe-1", "a.exe")).expect("insert");
    db.insert_fingerprint(&fingerprint("f2", &[2], "exe-1", "b.exe")).expect("insert");
    db.insert_fingerprint(&fingerprint("f3", &[3], "exe-1", "a.exe")).expect("insert");
    db.insert_fingerprint(&fingerprint("f4", &[4], "None", "unknown")).expect("insert");

    let executables = db.list_executables().expect("executables");
    assert_eq!(executables.len(), 1);
    assert_eq!(executables[0].signature, "exe-1");
    assert_eq!(executables[0].names, "a.exe, b.exe, ");

    let functions = db.functions_of_executable("exe-1").expect("functions");
    assert_eq!(functions, vec!["f1", "f2", "f3"]);
    assert_eq!(db.list_functions().expect("list").len(), 4);
}

#[test]
fn stored_fingerprint_round_trips() {
    let db = CorpusDb::open_in_memory().expect("db");
    let original = fingerprint("f1", &[1, 2, 3], "exe-1", "a.exe");
    db.insert_fingerprint(&original).expect("insert");

    let loaded = db.get_fingerprint("f1").expect("load").expect("present");
    assert_eq!(loaded, original);
    assert!(db.get_fingerprint("missing").expect("load").is_none());
}

#[test]
fn storage_prefilter_narrows_by_counters() {
    let db = CorpusDb::open_in_memory().expect("db");
    db.insert_fingerprint(&fingerprint("ten", &[1; 10], "exe-1", "a.exe")).expect("insert");
    db.insert_fingerprint(&fingerprint("eleven", &[1; 11], "exe-1", "a.exe")).expect("insert");
    db.insert_fingerprint(&fingerprint("hundred", &[1; 100], "exe-1", "a.exe")).expect("insert");

    let query = fingerprint("q", &[1; 10], "exe-2", "b.exe");
    let config = MatchingConfig::default();
    let candidates = db.candidates_within(&query.counters(), &config.coarse).expect("candidates");
    let signatures: Vec<&str> = candidates.iter().map(|f| f.signature()).collect();
    assert_eq!(signatures, vec!["ten", "eleven"]);
}

#[test]
fn matcher_runs_against_the_database() {
    let db = CorpusDb::open_in_memory().expect("db");
    db.insert_fingerprint(&fingerprint("copy", &[1, 2, 3, 1], "exe-1", "a.exe")).expect("insert");
    db.insert_fingerprint(&fingerprint("other", &[7, 8, 9, 7], "exe-1", "a.exe")).expect("insert");

    let matcher = Matcher::new(MatchingConfig::default()).expect("matcher");
    let outcome = matcher
        .query(&fingerprint("q", &[1, 2, 3, 1], "exe-2", "b.exe"), &db)
        .expect("query");
    assert_eq!(outcome.stats.corpus, 2);
    assert_eq!(outcome.matches.len(), 1);
    assert_eq!(outcome.matches[0].signature, "copy");
    assert_eq!(outcome.matches[0].exe_name, "a.exe");
}

#[test]
fn descriptions_require_known_function_and_user() {
    let db = CorpusDb::open_in_memory().expect("db");
    db.insert_fingerprint(&fingerprint("f1", &[1], "exe-1", "a.exe")).expect("insert");

    let err = db.upsert_description("f1", "ghost", "text").unwrap_err();
    assert!(matches!(err, DbError::UnknownUser(_)));

    db.add_user("ana").expect("user");
    let err = db.upsert_description("nope", "ana", "text").unwrap_err();
    assert!(err.to_string().contains("Unknown function signature: nope"));
}

#[test]
fn descriptions_are_updated_in_place() {
    let db = CorpusDb::open_in_memory().expect("db");
    db.insert_fingerprint(&fingerprint("f1", &[1], "exe-1", "a.exe")).expect("insert");
    let ana = db.add_user("ana").expect("user");
    assert_eq!(db.add_user("ana").expect("user again"), ana);
    db.add_user("bo").expect("user");

    let first = db.upsert_description("f1", "ana", "memcpy").expect("describe");
    assert_eq!(first.user, "ana");

    // Identical text from anyone returns the stored description unchanged.
    let same = db.upsert_description("f1", "bo", "memcpy").expect("describe");
    assert_eq!(same, first);

    let updated = db.upsert_description("f1", "ana", "memcpy (inlined)").expect("describe");
    assert_eq!(updated.id, first.id);
    assert_eq!(updated.data, "memcpy (inlined)");

    let second = db.upsert_description("f1", "bo", "copy loop").expect("describe");
    assert_ne!(second.id, first.id);

    let all = db.descriptions_for("f1").expect("descriptions");
    assert_eq!(all.len(), 2);
    let annotations = db.annotations("f1").expect("annotations");
    assert_eq!(annotations.len(), 2);
    assert!(annotations.iter().any(|a| a.user == "ana" && a.data == "memcpy (inlined)"));
    assert!(annotations.iter().any(|a| a.user == "bo" && a.data == "copy loop"));
}

#[test]
fn query_runs_are_listed_in_insertion_order() {
    let db = CorpusDb::open_in_memory().expect("db");
    assert!(db.list_query_runs().expect("runs").is_empty());

    db.insert_query_run(&run("q1", QueryRunStatus::Succeeded)).expect("insert");
    let mut failed = run("q2", QueryRunStatus::Failed);
    failed.best_match = None;
    db.insert_query_run(&failed).expect("insert");

    let runs = db.list_query_runs().expect("runs");
    assert_eq!(runs, vec![run("q1", QueryRunStatus::Succeeded), failed]);
}

fn with_vars_size(signature: &str, vars_size: u64) -> Fingerprint {
    let mut record = fingerprint(signature, &[1, 2, 3], "exe-1", "a.exe").to_record();
    if let Some(frame) = record.frame_attributes.as_mut() {
        frame.vars_size = Some(vars_size);
    }
    Fingerprint::from_record(record).expect("valid fingerprint")
}

#[test]
fn counters_beyond_database_range_are_rejected() {
    let db = CorpusDb::open_in_memory().expect("db");
    let err = db.insert_fingerprint(&with_vars_size("huge", u64::MAX)).unwrap_err();
    assert!(matches!(err, DbError::ValueOutOfRange { field: "vars_size", value: u64::MAX, .. }));
    assert!(!db.contains_function("huge").expect("lookup"));
}

#[test]
fn large_counters_round_trip_and_stay_findable() {
    let db = CorpusDb::open_in_memory().expect("db");
    let large = 1u64 << 62;
    let query = with_vars_size("big", large);
    db.insert_fingerprint(&query).expect("insert");

    let functions = db.list_functions().expect("list");
    assert_eq!(functions[0].counters.vars_size, large);

    let config = MatchingConfig::default();
    let candidates = db.candidates_within(&query.counters(), &config.coarse).expect("candidates");
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].signature(), "big");
}

#[test]
fn contains_function_checks_presence_only() {
    let db = CorpusDb::open_in_memory().expect("db");
    assert!(!db.contains_function("f1").expect("lookup"));
    db.insert_fingerprint(&fingerprint("f1", &[1], "exe-1", "a.exe")).expect("insert");
    assert!(db.contains_function("f1").expect("lookup"));

    // A corrupt record body does not matter for a presence check.
    db.connection()
        .execute("UPDATE functions SET record = '{}' WHERE signature = 'f1'", [])
        .expect("corrupt record");
    assert!(db.contains_function("f1").expect("lookup"));
    assert!(matches!(db.get_fingerprint("f1").unwrap_err(), DbError::CorruptRecord { .. }));
}
