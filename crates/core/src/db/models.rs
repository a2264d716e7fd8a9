use serde::{Deserialize, Serialize};

use crate::model::{Annotation, CoarseCounters};

/// Listing row for a stored function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionSummary {
    pub id: i64,
    pub signature: String,
    pub name: String,
    pub exe_signature: String,
    pub counters: CoarseCounters,
}

/// Executable a function was submitted from.
///
/// `names` accumulates every name the executable was submitted under, as
/// `"a.exe, b.exe, "`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutableRecord {
    pub signature: String,
    pub names: String,
}

/// A user's description of a stored function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptionRecord {
    pub id: i64,
    pub signature: String,
    pub user: String,
    pub data: String,
    /// RFC 3339 timestamp of the last modification.
    pub modified: String,
}

impl From<DescriptionRecord> for Annotation {
    fn from(record: DescriptionRecord) -> Self {
        Annotation { user: record.user, data: record.data, modified: record.modified }
    }
}

/// Allowed status values for query runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryRunStatus {
    Succeeded,
    Failed,
    Canceled,
}

impl QueryRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryRunStatus::Succeeded => "succeeded",
            QueryRunStatus::Failed => "failed",
            QueryRunStatus::Canceled => "canceled",
        }
    }
}

impl std::str::FromStr for QueryRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "succeeded" => Ok(QueryRunStatus::Succeeded),
            "failed" => Ok(QueryRunStatus::Failed),
            "canceled" => Ok(QueryRunStatus::Canceled),
            other => Err(format!("unknown query run status '{other}'")),
        }
    }
}

/// Bookkeeping for one executed query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRunRecord {
    pub query_signature: String,
    /// SHA-256 of the matching configuration the query ran with.
    pub config_digest: String,
    pub status: QueryRunStatus,
    pub corpus_size: u64,
    pub survivors: u64,
    pub matches: u64,
    /// Signature of the best match, if any.
    pub best_match: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}
