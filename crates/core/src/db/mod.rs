//! Corpus project layout and the SQLite corpus store.
//!
//! - `ProjectLayout`: computed paths for project directories/files.
//! - `ProjectConfig`: serializable project metadata, including the default matching config.
//! - `CorpusDb`: SQLite wrapper holding fingerprints, executables, users, descriptions
//!   and query history, with versioned migrations.
//! - `ProjectContext`: layout, config and an open database in one value.

mod config;
mod context;
mod corpus_db;
mod layout;
mod models;
mod util;

pub use config::{DbConfig, ProjectConfig};
pub use context::ProjectContext;
pub use corpus_db::{CorpusDb, DbError, DbResult, CURRENT_SCHEMA_VERSION};
pub use layout::ProjectLayout;
pub use models::{
    DescriptionRecord, ExecutableRecord, FunctionSummary, QueryRunRecord, QueryRunStatus,
};
pub use util::{load_project_config, open_corpus_db};
