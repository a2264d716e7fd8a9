use std::path::Path;

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use crate::config::CoarseTolerances;
use crate::db::{
    DescriptionRecord, ExecutableRecord, FunctionSummary, QueryRunRecord, QueryRunStatus,
};
use crate::filters::{counter_tolerances, tolerance_range};
use crate::model::{
    Annotation, CoarseCounters, Fingerprint, FingerprintRecord, InvalidFingerprint,
};
use crate::services::{AnnotationStore, CollaboratorError, CorpusSource};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Executable signature the front-end reports when it has none.
const NO_EXECUTABLE: &str = "None";

/// Error type for corpus database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Failed to encode or decode a stored record: {0}")]
    Json(#[from] serde_json::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },

    #[error("Stored fingerprint {signature} is corrupt: {source}")]
    CorruptRecord {
        signature: String,
        #[source]
        source: InvalidFingerprint,
    },

    #[error("Unknown function signature: {0}")]
    UnknownFunction(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// SQLite integers are signed; values above `i64::MAX` cannot be stored.
    #[error("Value {value} of {field} for {signature} does not fit in a database integer")]
    ValueOutOfRange { signature: String, field: &'static str, value: u64 },
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// SQLite-backed corpus of fingerprints and their annotations.
///
/// This is a thin wrapper around `rusqlite::Connection` that is responsible for:
/// - Opening/creating the DB file.
/// - Applying schema migrations.
/// - Get-or-create insertion of fingerprints, executables and users.
/// - Serving candidates and descriptions to the matching service.
#[derive(Debug)]
pub struct CorpusDb {
    conn: Connection,
}

impl CorpusDb {
    /// Open (or create) a corpus database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory database, mostly for tests and one-shot comparisons.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Expose a reference to the underlying connection for advanced callers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> DbResult<i32> {
        current_schema_version(&self.conn)
    }

    fn function_id(&self, signature: &str) -> DbResult<Option<i64>> {
        let id = self
            .conn
            .query_row("SELECT id FROM functions WHERE signature = ?1", params![signature], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(id)
    }

    fn user_id(&self, name: &str) -> DbResult<Option<i64>> {
        let id = self
            .conn
            .query_row("SELECT id FROM users WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    /// Whether a function with this signature is stored, without decoding its record.
    pub fn contains_function(&self, signature: &str) -> DbResult<bool> {
        Ok(self.function_id(signature)?.is_some())
    }

    /// Store a fingerprint and return its row id.
    ///
    /// Get-or-create by signature: an already stored signature returns the existing
    /// id and nothing else is recorded.
    pub fn insert_fingerprint(&self, fingerprint: &Fingerprint) -> DbResult<i64> {
        if let Some(id) = self.function_id(fingerprint.signature())? {
            debug!(signature = fingerprint.signature(), id, "fingerprint already stored");
            return Ok(id);
        }

        let record = serde_json::to_string(&fingerprint.to_record())?;
        let c = fingerprint.counters();
        let int = |field: &'static str, value: u64| sql_int(fingerprint.signature(), field, value);
        let counters = [
            int("num_insns", c.num_insns)?,
            int("num_blocks", c.num_blocks)?,
            int("num_edges", c.num_edges)?,
            int("num_strings", c.num_strings)?,
            int("num_calls", c.num_calls)?,
            int("num_imms", c.num_imms)?,
            int("vars_size", c.vars_size)?,
            int("args_size", c.args_size)?,
            int("regs_size", c.regs_size)?,
        ];
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO functions (
                signature, name, exe_signature,
                num_insns, num_blocks, num_edges, num_strings, num_calls, num_imms,
                vars_size, args_size, regs_size, record
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                fingerprint.signature(),
                fingerprint.name(),
                fingerprint.exe_signature(),
                counters[0],
                counters[1],
                counters[2],
                counters[3],
                counters[4],
                counters[5],
                counters[6],
                counters[7],
                counters[8],
                record,
            ],
        )?;
        let function_id = tx.last_insert_rowid();

        if fingerprint.exe_signature() != NO_EXECUTABLE {
            let existing: Option<(i64, String)> = tx
                .query_row(
                    "SELECT id, names FROM executables WHERE signature = ?1",
                    params![fingerprint.exe_signature()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let entry = format!("{}, ", fingerprint.exe_name());
            let executable_id = match existing {
                Some((id, names)) => {
                    if !names.split(", ").any(|n| n == fingerprint.exe_name()) {
                        tx.execute(
                            "UPDATE executables SET names = ?1 WHERE id = ?2",
                            params![format!("{names}{entry}"), id],
                        )?;
                    }
                    id
                }
                None => {
                    tx.execute(
                        "INSERT INTO executables (signature, names) VALUES (?1, ?2)",
                        params![fingerprint.exe_signature(), entry],
                    )?;
                    tx.last_insert_rowid()
                }
            };
            tx.execute(
                r#"
                INSERT OR IGNORE INTO executable_functions (executable_id, function_id)
                VALUES (?1, ?2)
                "#,
                params![executable_id, function_id],
            )?;
        }

        tx.commit()?;
        Ok(function_id)
    }

    /// Load and re-validate a stored fingerprint.
    pub fn get_fingerprint(&self, signature: &str) -> DbResult<Option<Fingerprint>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT record FROM functions WHERE signature = ?1",
                params![signature],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|body| decode_fingerprint(signature, &body)).transpose()
    }

    /// List all stored functions (ordered by id).
    pub fn list_functions(&self) -> DbResult<Vec<FunctionSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, signature, name, exe_signature,
                   num_insns, num_blocks, num_edges, num_strings, num_calls, num_imms,
                   vars_size, args_size, regs_size
            FROM functions
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FunctionSummary {
                id: row.get(0)?,
                signature: row.get(1)?,
                name: row.get(2)?,
                exe_signature: row.get(3)?,
                counters: CoarseCounters {
                    num_insns: column_u64(row, 4)?,
                    num_blocks: column_u64(row, 5)?,
                    num_edges: column_u64(row, 6)?,
                    num_strings: column_u64(row, 7)?,
                    num_calls: column_u64(row, 8)?,
                    num_imms: column_u64(row, 9)?,
                    vars_size: column_u64(row, 10)?,
                    args_size: column_u64(row, 11)?,
                    regs_size: column_u64(row, 12)?,
                },
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// List all executables (ordered by id).
    pub fn list_executables(&self) -> DbResult<Vec<ExecutableRecord>> {
        let mut stmt =
            self.conn.prepare("SELECT signature, names FROM executables ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(ExecutableRecord { signature: row.get(0)?, names: row.get(1)? })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Signatures of the functions submitted from an executable.
    pub fn functions_of_executable(&self, exe_signature: &str) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT f.signature
            FROM executable_functions ef
            JOIN executables e ON e.id = ef.executable_id
            JOIN functions f ON f.id = ef.function_id
            WHERE e.signature = ?1
            ORDER BY f.id
            "#,
        )?;
        let rows = stmt.query_map(params![exe_signature], |row| row.get(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Candidates whose stored counters fall inside the tolerance ranges of `query`.
    ///
    /// The ranges are a superset of what the coarse filter accepts.
    pub fn candidates_within(
        &self,
        query: &CoarseCounters,
        tolerances: &CoarseTolerances,
    ) -> DbResult<Vec<Fingerprint>> {
        let mut clauses = Vec::new();
        let mut bounds: Vec<i64> = Vec::new();
        for (column, value, tolerance) in counter_tolerances(query, tolerances) {
            let (low, high) = tolerance_range(value, tolerance);
            // Stored values never exceed i64::MAX, so clamping keeps the range a superset.
            clauses.push(format!("{column} >= ?"));
            bounds.push(i64::try_from(low).unwrap_or(i64::MAX));
            if let Some(high) = high {
                clauses.push(format!("{column} <= ?"));
                bounds.push(i64::try_from(high).unwrap_or(i64::MAX));
            }
        }
        let sql = format!(
            "SELECT signature, record FROM functions WHERE {} ORDER BY id",
            clauses.join(" AND ")
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bounds), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (signature, body) = row?;
            out.push(decode_fingerprint(&signature, &body)?);
        }
        debug!(candidates = out.len(), "storage prefilter applied");
        Ok(out)
    }

    /// Register a user and return its row id; existing users are returned as-is.
    pub fn add_user(&self, name: &str) -> DbResult<i64> {
        if let Some(id) = self.user_id(name)? {
            return Ok(id);
        }
        self.conn.execute("INSERT INTO users (name) VALUES (?1)", params![name])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Attach `data` as `user`'s description of a function.
    ///
    /// An identical existing description is returned untouched. Otherwise the user's
    /// previous description of the function is replaced, or a new one is created.
    pub fn upsert_description(
        &self,
        signature: &str,
        user: &str,
        data: &str,
    ) -> DbResult<DescriptionRecord> {
        let function_id = self
            .function_id(signature)?
            .ok_or_else(|| DbError::UnknownFunction(signature.to_string()))?;
        let user_id = self.user_id(user)?.ok_or_else(|| DbError::UnknownUser(user.to_string()))?;

        let identical: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM descriptions WHERE function_id = ?1 AND data = ?2",
                params![function_id, data],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = identical {
            return self.description_by_id(id);
        }

        let modified = Utc::now().to_rfc3339();
        let previous: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM descriptions WHERE function_id = ?1 AND user_id = ?2",
                params![function_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        let id = match previous {
            Some(id) => {
                self.conn.execute(
                    "UPDATE descriptions SET data = ?1, modified = ?2 WHERE id = ?3",
                    params![data, modified, id],
                )?;
                id
            }
            None => {
                self.conn.execute(
                    r#"
                    INSERT INTO descriptions (function_id, user_id, data, modified)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                    params![function_id, user_id, data, modified],
                )?;
                self.conn.last_insert_rowid()
            }
        };
        self.description_by_id(id)
    }

    fn description_by_id(&self, id: i64) -> DbResult<DescriptionRecord> {
        let record = self.conn.query_row(
            r#"
            SELECT d.id, f.signature, u.name, d.data, d.modified
            FROM descriptions d
            JOIN functions f ON f.id = d.function_id
            JOIN users u ON u.id = d.user_id
            WHERE d.id = ?1
            "#,
            params![id],
            description_from_row,
        )?;
        Ok(record)
    }

    /// Descriptions of a function, most recently modified first.
    pub fn descriptions_for(&self, signature: &str) -> DbResult<Vec<DescriptionRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT d.id, f.signature, u.name, d.data, d.modified
            FROM descriptions d
            JOIN functions f ON f.id = d.function_id
            JOIN users u ON u.id = d.user_id
            WHERE f.signature = ?1
            ORDER BY d.modified DESC, d.id
            "#,
        )?;
        let rows = stmt.query_map(params![signature], description_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Insert a query run record and return its row id.
    pub fn insert_query_run(&self, record: &QueryRunRecord) -> DbResult<i64> {
        let int = |field: &'static str, value: u64| sql_int(&record.query_signature, field, value);
        let (corpus_size, survivors, matches) = (
            int("corpus_size", record.corpus_size)?,
            int("survivors", record.survivors)?,
            int("matches", record.matches)?,
        );
        self.conn.execute(
            r#"
            INSERT INTO query_runs (query_signature, config_digest, status, corpus_size, survivors, matches, best_match, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.query_signature,
                record.config_digest,
                record.status.as_str(),
                corpus_size,
                survivors,
                matches,
                record.best_match,
                record.started_at,
                record.finished_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// List query runs (ordered by id).
    pub fn list_query_runs(&self) -> DbResult<Vec<QueryRunRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT query_signature, config_digest, status, corpus_size, survivors, matches, best_match, started_at, finished_at
            FROM query_runs
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(2)?;
            let status = status.parse::<QueryRunStatus>().map_err(|_| {
                rusqlite::Error::InvalidColumnType(2, "status".into(), rusqlite::types::Type::Text)
            })?;
            Ok(QueryRunRecord {
                query_signature: row.get(0)?,
                config_digest: row.get(1)?,
                status,
                corpus_size: column_u64(row, 3)?,
                survivors: column_u64(row, 4)?,
                matches: column_u64(row, 5)?,
                best_match: row.get(6)?,
                started_at: row.get(7)?,
                finished_at: row.get(8)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl CorpusSource for CorpusDb {
    fn candidates(
        &self,
        query: &CoarseCounters,
        tolerances: &CoarseTolerances,
    ) -> Result<Vec<Fingerprint>, CollaboratorError> {
        self.candidates_within(query, tolerances).map_err(|e| CollaboratorError(e.to_string()))
    }
}

impl AnnotationStore for CorpusDb {
    fn annotations(&self, signature: &str) -> Result<Vec<Annotation>, CollaboratorError> {
        let records =
            self.descriptions_for(signature).map_err(|e| CollaboratorError(e.to_string()))?;
        Ok(records.into_iter().map(Annotation::from).collect())
    }
}

fn sql_int(signature: &str, field: &'static str, value: u64) -> DbResult<i64> {
    i64::try_from(value).map_err(|_| DbError::ValueOutOfRange {
        signature: signature.to_string(),
        field,
        value,
    })
}

fn column_u64(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn description_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DescriptionRecord> {
    Ok(DescriptionRecord {
        id: row.get(0)?,
        signature: row.get(1)?,
        user: row.get(2)?,
        data: row.get(3)?,
        modified: row.get(4)?,
    })
}

fn decode_fingerprint(signature: &str, body: &str) -> DbResult<Fingerprint> {
    let record: FingerprintRecord = serde_json::from_str(body)?;
    Fingerprint::from_record(record)
        .map_err(|source| DbError::CorruptRecord { signature: signature.to_string(), source })
}

/// Apply schema migrations using SQLite's `user_version` pragma.
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS functions (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                signature     TEXT NOT NULL UNIQUE,
                name          TEXT NOT NULL,
                exe_signature TEXT NOT NULL,
                num_insns     INTEGER NOT NULL,
                num_blocks    INTEGER NOT NULL,
                num_edges     INTEGER NOT NULL,
                num_strings   INTEGER NOT NULL,
                num_calls     INTEGER NOT NULL,
                num_imms      INTEGER NOT NULL,
                vars_size     INTEGER NOT NULL,
                args_size     INTEGER NOT NULL,
                regs_size     INTEGER NOT NULL,
                record        TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS functions_num_insns ON functions (num_insns);

            CREATE TABLE IF NOT EXISTS executables (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                signature TEXT NOT NULL UNIQUE,
                names     TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS executable_functions (
                executable_id INTEGER NOT NULL REFERENCES executables(id),
                function_id   INTEGER NOT NULL REFERENCES functions(id),
                PRIMARY KEY (executable_id, function_id)
            );

            CREATE TABLE IF NOT EXISTS users (
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS descriptions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                function_id INTEGER NOT NULL REFERENCES functions(id),
                user_id     INTEGER NOT NULL REFERENCES users(id),
                data        TEXT NOT NULL,
                modified    TEXT NOT NULL,
                UNIQUE (function_id, user_id)
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS query_runs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                query_signature TEXT NOT NULL,
                config_digest   TEXT NOT NULL,
                status          TEXT NOT NULL,
                corpus_size     INTEGER NOT NULL,
                survivors       INTEGER NOT NULL,
                matches         INTEGER NOT NULL,
                best_match      TEXT,
                started_at      TEXT NOT NULL,
                finished_at     TEXT NOT NULL
            );

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
