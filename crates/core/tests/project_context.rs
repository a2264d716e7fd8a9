use redb_core::db::{CorpusDb, ProjectConfig, ProjectContext, ProjectLayout};
use tempfile::tempdir;

fn write_project(layout: &ProjectLayout, config: &ProjectConfig) {
    std::fs::create_dir_all(&layout.meta_dir).expect("meta dir");
    let json = serde_json::to_string_pretty(config).expect("config json");
    std::fs::write(&layout.project_config_path, json).expect("write config");
}

#[test]
fn layout_places_files_under_meta_dir() {
    let layout = ProjectLayout::new("/work/corpus");
    assert!(layout.meta_dir.ends_with(".redb"));
    assert!(layout.project_config_path.ends_with(".redb/project.json"));
    assert_eq!(layout.db_path_relative_string(), ".redb/corpus.db");
}

#[test]
fn context_opens_an_initialized_project() {
    let dir = tempdir().expect("tempdir");
    let layout = ProjectLayout::new(dir.path());
    let config = ProjectConfig::new("demo", layout.db_path_relative_string());
    write_project(&layout, &config);
    CorpusDb::open(&layout.db_path).expect("create db");

    let ctx = ProjectContext::from_root(dir.path()).expect("context");
    assert_eq!(ctx.config.name, "demo");
    assert_eq!(ctx.db_path, layout.db_path);
    assert!(ctx.db.list_functions().expect("list").is_empty());
    assert_eq!(ctx.config.matching, redb_core::config::MatchingConfig::default());
}

#[test]
fn matching_section_may_be_omitted() {
    let dir = tempdir().expect("tempdir");
    let layout = ProjectLayout::new(dir.path());
    std::fs::create_dir_all(&layout.meta_dir).expect("meta dir");
    std::fs::write(
        &layout.project_config_path,
        r#"{"name": "bare", "description": null, "config_version": "0.1.0", "db": {"path": ".redb/corpus.db"}}"#,
    )
    .expect("write config");

    let ctx = ProjectContext::from_root(dir.path()).expect("context");
    assert_eq!(ctx.config.name, "bare");
    assert_eq!(ctx.config.matching.grade.matching_threshold, 0.9);
}

#[test]
fn missing_config_is_reported() {
    let dir = tempdir().expect("tempdir");
    let err = ProjectContext::from_root(dir.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to read project config"));
}

#[test]
fn invalid_matching_config_is_reported() {
    let dir = tempdir().expect("tempdir");
    let layout = ProjectLayout::new(dir.path());
    let mut config = ProjectConfig::new("demo", layout.db_path_relative_string());
    config.matching.grade.matching_threshold = 3.0;
    write_project(&layout, &config);

    let err = ProjectContext::from_root(dir.path()).unwrap_err();
    assert!(err.to_string().contains("invalid matching config"));
}

#[test]
fn library_reports_its_version() {
    assert_eq!(redb_core::version(), env!("CARGO_PKG_VERSION"));
}
