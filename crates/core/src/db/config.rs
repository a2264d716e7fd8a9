use serde::{Deserialize, Serialize};

use crate::config::MatchingConfig;

/// Location of the corpus database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Path to the corpus database file (typically relative to project root).
    pub path: String,
}

impl DbConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Serializable configuration describing a corpus project.
///
/// This lives at `.redb/project.json` in the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Human-friendly project name.
    pub name: String,
    /// Optional description / notes.
    pub description: Option<String>,
    /// Schema/config version. This is about the config format, not the corpus contents.
    pub config_version: String,
    /// Database configuration (path is typically relative to project root).
    pub db: DbConfig,
    /// Matching configuration used when a query names none.
    #[serde(default)]
    pub matching: MatchingConfig,
}

impl ProjectConfig {
    /// Create a new project configuration using the given name and db path.
    pub fn new(name: impl Into<String>, db_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            config_version: "0.1.0".to_string(),
            db: DbConfig::new(db_path),
            matching: MatchingConfig::default(),
        }
    }
}
