use std::fs;

use anyhow::{Context, Result};
use redb_core::db::{CorpusDb, ProjectConfig};
use serde::Serialize;

use crate::commands::{open_project, project_layout};
use crate::infer_project_name;

#[derive(Serialize)]
pub struct ProjectInfoSnapshot {
    pub name: String,
    pub root: String,
    pub config_file: String,
    pub config_version: String,
    pub db_path: String,
    pub schema_version: i32,
    pub functions: usize,
    pub executables: usize,
    pub query_runs: usize,
    pub matching_config_digest: String,
}

/// Initialize a new corpus project at `root`.
pub fn init_project_command(root: &str, name: Option<String>) -> Result<()> {
    let layout = project_layout(root)?;

    // Derive project name if not provided.
    let project_name = match name {
        Some(n) => n,
        None => infer_project_name(&layout.root),
    };

    fs::create_dir_all(&layout.meta_dir)
        .with_context(|| format!("Failed to create meta dir: {}", layout.meta_dir.display()))?;

    let config = ProjectConfig::new(&project_name, layout.db_path_relative_string());
    let json = serde_json::to_string_pretty(&config)?;
    fs::write(&layout.project_config_path, json).with_context(|| {
        format!("Failed to write project config: {}", layout.project_config_path.display())
    })?;

    // Create the corpus database immediately so follow-on commands can rely on it.
    CorpusDb::open(&layout.db_path).with_context(|| {
        format!("Failed to initialize corpus database at {}", layout.db_path.display())
    })?;

    println!("Initialized corpus project:");
    println!("  Name: {}", project_name);
    println!("  Root: {}", layout.root.display());
    println!("  Config: {}", layout.project_config_path.display());
    println!("  DB path (relative): {}", config.db.path);

    Ok(())
}

/// Show basic information about an existing project.
pub fn project_info_command(root: &str, json: bool) -> Result<()> {
    let ctx = open_project(root)?;
    let functions = ctx.db.list_functions().context("Failed to list functions")?;
    let executables = ctx.db.list_executables().context("Failed to list executables")?;
    let query_runs = ctx.db.list_query_runs().context("Failed to list query runs")?;
    let schema_version = ctx.db.schema_version().context("Failed to read schema version")?;

    let snapshot = ProjectInfoSnapshot {
        name: ctx.config.name.clone(),
        root: ctx.layout.root.display().to_string(),
        config_file: ctx.layout.project_config_path.display().to_string(),
        config_version: ctx.config.config_version.clone(),
        db_path: ctx.db_path.display().to_string(),
        schema_version,
        functions: functions.len(),
        executables: executables.len(),
        query_runs: query_runs.len(),
        matching_config_digest: ctx.config.matching.digest(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("Project: {}", snapshot.name);
    println!("  Root: {}", snapshot.root);
    println!("  Config: {} (version {})", snapshot.config_file, snapshot.config_version);
    println!("  DB: {} (schema v{})", snapshot.db_path, snapshot.schema_version);
    println!("  Functions: {}", snapshot.functions);
    println!("  Executables: {}", snapshot.executables);
    println!("  Query runs: {}", snapshot.query_runs);
    println!("  Matching config: {}", snapshot.matching_config_digest);
    Ok(())
}
