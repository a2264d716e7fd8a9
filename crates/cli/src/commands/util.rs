use std::path::Path;

use anyhow::{Context, Result};
use redb_core::config::MatchingConfig;
use redb_core::db::{ProjectContext, ProjectLayout};
use redb_core::model::{Fingerprint, FingerprintRecord};
use serde::Deserialize;

use crate::canonicalize_or_current;

/// Resolve `root` and open its project config and corpus database.
pub fn open_project(root: &str) -> Result<ProjectContext> {
    let root_path = canonicalize_or_current(root)?;
    ProjectContext::from_root(&root_path)
}

/// Layout for `root` without touching the filesystem.
pub fn project_layout(root: &str) -> Result<ProjectLayout> {
    Ok(ProjectLayout::new(canonicalize_or_current(root)?))
}

/// A fingerprint file holds either one record or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    Many(Vec<FingerprintRecord>),
    One(Box<FingerprintRecord>),
}

/// Read wire records from a JSON file without validating them.
pub fn read_records(path: &Path) -> Result<Vec<FingerprintRecord>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fingerprint file at {}", path.display()))?;
    let parsed: RecordFile = serde_json::from_str(&body)
        .with_context(|| format!("Failed to parse fingerprint JSON in {}", path.display()))?;
    Ok(match parsed {
        RecordFile::Many(records) => records,
        RecordFile::One(record) => vec![*record],
    })
}

/// Read and validate every fingerprint in a JSON file.
pub fn read_fingerprints(path: &Path) -> Result<Vec<Fingerprint>> {
    let records = read_records(path)?;
    let mut out = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        let fingerprint = Fingerprint::from_record(record).with_context(|| {
            format!("Fingerprint #{idx} in {} is invalid", path.display())
        })?;
        out.push(fingerprint);
    }
    Ok(out)
}

/// First fingerprint of a file; the file must hold at least one.
pub fn read_single_fingerprint(path: &Path) -> Result<Fingerprint> {
    read_fingerprints(path)?
        .into_iter()
        .next()
        .with_context(|| format!("No fingerprint found in {}", path.display()))
}

/// The override file when given, else `fallback`.
pub fn resolve_matching_config(
    override_path: Option<&str>,
    fallback: MatchingConfig,
) -> Result<MatchingConfig> {
    match override_path {
        Some(path) => MatchingConfig::load(Path::new(path))
            .with_context(|| format!("Failed to load matching config from {path}")),
        None => Ok(fallback),
    }
}
