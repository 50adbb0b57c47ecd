//! SQLite construct store
//!
//! One row per construct. The full record is kept as JSON next to an indexed
//! `state` column and the `revision` used for compare-and-swap updates, so
//! optimistic concurrency also holds across processes sharing the file.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use retryflow_core::ConstructStore;
use retryflow_domain::{
    ConstructId, ConstructState, Result as DomainResult, RetryConstruct, RetryFlowError,
};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;
use tracing::{debug, error, info, instrument};

use super::error::{StoreError, StoreResult};
use crate::errors::InfraError;

const DEFAULT_POOL_SIZE: u32 = 4;
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
const BUSY_TIMEOUT_MS: u32 = 5_000;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS retry_constructs (
    id          TEXT PRIMARY KEY,
    state       TEXT NOT NULL,
    revision    INTEGER NOT NULL,
    record      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_retry_constructs_state ON retry_constructs(state);
";

/// SQLite-backed implementation of `ConstructStore`
#[derive(Debug, Clone)]
pub struct SqliteConstructStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteConstructStore {
    /// Open (and create if needed) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> DomainResult<Self> {
        Self::open_with_pool_size(path, DEFAULT_POOL_SIZE)
    }

    #[instrument(skip(path), fields(db_path = %path.as_ref().display()))]
    pub fn open_with_pool_size(path: impl AsRef<Path>, pool_size: u32) -> DomainResult<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref()).with_init(|conn| {
            conn.execute_batch(&format!(
                "PRAGMA journal_mode=WAL;\nPRAGMA synchronous=NORMAL;\nPRAGMA busy_timeout={BUSY_TIMEOUT_MS};"
            ))
        });

        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(manager)
            .map_err(StoreError::from)?;

        let conn = pool.get().map_err(StoreError::from)?;
        conn.execute_batch(SCHEMA).map_err(StoreError::from)?;
        info!(pool_size, "Opened SQLite construct store");

        Ok(Self { pool })
    }

    /// Run `f` on a pooled connection off the async runtime
    async fn with_connection<T, F>(&self, f: F) -> DomainResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let result = task::spawn_blocking(move || -> StoreResult<T> {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|err| RetryFlowError::from(InfraError::from(err)))?;
        Ok(result?)
    }
}

#[async_trait]
impl ConstructStore for SqliteConstructStore {
    async fn insert(&self, construct: &RetryConstruct) -> DomainResult<()> {
        let row = ConstructRow::from_construct(construct)?;
        self.with_connection(move |conn| insert_row(conn, &row)).await
    }

    async fn save(&self, construct: &RetryConstruct, expected_revision: u64) -> DomainResult<()> {
        let row = ConstructRow::from_construct(construct)?;
        let expected = to_sql_revision(expected_revision)?;
        self.with_connection(move |conn| update_row(conn, &row, expected)).await
    }

    async fn load(&self, id: ConstructId) -> DomainResult<Option<RetryConstruct>> {
        let record = self.with_connection(move |conn| select_record(conn, id)).await?;
        record.map(|record| parse_record(&record)).transpose()
    }

    async fn list_unfinished(&self) -> DomainResult<Vec<RetryConstruct>> {
        let rows = self.with_connection(select_unfinished_records).await?;
        let mut constructs = Vec::with_capacity(rows.len());
        for (id, record) in rows {
            match parse_record(&record) {
                Ok(construct) => constructs.push(construct),
                Err(err) => {
                    error!(
                        construct_id = %id,
                        error = %err,
                        "Skipping unreadable construct record"
                    );
                }
            }
        }
        debug!(count = constructs.len(), "Loaded unfinished constructs");
        Ok(constructs)
    }

    async fn delete(&self, id: ConstructId) -> DomainResult<bool> {
        self.with_connection(move |conn| {
            let removed =
                conn.execute("DELETE FROM retry_constructs WHERE id = ?1", params![id.to_string()])?;
            Ok(removed > 0)
        })
        .await
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Column values for one construct
struct ConstructRow {
    id: ConstructId,
    state: String,
    revision: i64,
    record: String,
    created_at: String,
    updated_at: String,
}

impl ConstructRow {
    fn from_construct(construct: &RetryConstruct) -> DomainResult<Self> {
        Ok(Self {
            id: construct.id(),
            state: construct.state().to_string(),
            revision: to_sql_revision(construct.revision())?,
            record: serde_json::to_string(construct)?,
            created_at: construct.created_at().to_rfc3339_opts(SecondsFormat::Micros, true),
            updated_at: construct.updated_at().to_rfc3339_opts(SecondsFormat::Micros, true),
        })
    }
}

fn insert_row(conn: &Connection, row: &ConstructRow) -> StoreResult<()> {
    let result = conn.execute(
        "INSERT INTO retry_constructs (id, state, revision, record, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.id.to_string(),
            row.state,
            row.revision,
            row.record,
            row.created_at,
            row.updated_at
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(StoreError::AlreadyExists(row.id))
        }
        Err(err) => Err(err.into()),
    }
}

/// Compare-and-swap on the revision column
fn update_row(conn: &Connection, row: &ConstructRow, expected_revision: i64) -> StoreResult<()> {
    let updated = conn.execute(
        "UPDATE retry_constructs
         SET state = ?1, revision = ?2, record = ?3, updated_at = ?4
         WHERE id = ?5 AND revision = ?6",
        params![
            row.state,
            row.revision,
            row.record,
            row.updated_at,
            row.id.to_string(),
            expected_revision
        ],
    )?;
    if updated == 1 {
        return Ok(());
    }

    let found: Option<i64> = conn
        .query_row(
            "SELECT revision FROM retry_constructs WHERE id = ?1",
            params![row.id.to_string()],
            |r| r.get(0),
        )
        .optional()?;
    match found {
        Some(found) => Err(StoreError::RevisionConflict {
            id: row.id,
            expected: expected_revision.unsigned_abs(),
            found: found.unsigned_abs(),
        }),
        None => Err(StoreError::Missing(row.id)),
    }
}

fn select_record(conn: &Connection, id: ConstructId) -> StoreResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT record FROM retry_constructs WHERE id = ?1",
            params![id.to_string()],
            |r| r.get(0),
        )
        .optional()?)
}

/// `(id, record)` pairs of every unfinished construct, oldest first
fn select_unfinished_records(conn: &Connection) -> StoreResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT id, record FROM retry_constructs
         WHERE state IN (?1, ?2)
         ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(
        params![ConstructState::Starting.to_string(), ConstructState::Running.to_string()],
        |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn parse_record(record: &str) -> DomainResult<RetryConstruct> {
    let construct: RetryConstruct = serde_json::from_str(record)?;
    construct.validate()?;
    Ok(construct)
}

fn to_sql_revision(revision: u64) -> DomainResult<i64> {
    i64::try_from(revision)
        .map_err(|_| RetryFlowError::Storage(format!("revision {revision} exceeds SQLite range")))
}

#[cfg(test)]
mod tests {
    use retryflow_domain::{AttemptCompletion, BodySpec};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn open(dir: &TempDir) -> SqliteConstructStore {
        SqliteConstructStore::open(dir.path().join("constructs.db")).unwrap()
    }

    fn construct() -> RetryConstruct {
        RetryConstruct::new(BodySpec::new("sh", json!({ "script": "./deploy" })), 2).unwrap()
    }

    #[tokio::test]
    async fn insert_save_load() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let mut c = construct();
        store.insert(&c).await.unwrap();
        c.begin_attempt().unwrap();
        let expected = c.bump_revision();
        store.save(&c, expected).await.unwrap();

        assert_eq!(store.load(c.id()).await.unwrap(), Some(c));
    }

    #[tokio::test]
    async fn duplicate_insert_and_stale_save_conflict() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let mut c = construct();
        store.insert(&c).await.unwrap();
        assert!(matches!(store.insert(&c).await, Err(RetryFlowError::Conflict(_))));

        c.begin_attempt().unwrap();
        let expected = c.bump_revision();
        store.save(&c, expected).await.unwrap();
        let err = store.save(&c, expected).await.unwrap_err();
        assert!(matches!(err, RetryFlowError::Conflict(_)));
    }

    #[tokio::test]
    async fn save_of_unknown_construct_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let c = construct();
        assert!(matches!(store.save(&c, 0).await, Err(RetryFlowError::NotFound(_))));
    }

    #[tokio::test]
    async fn only_unfinished_are_listed() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let waiting = construct();
        store.insert(&waiting).await.unwrap();

        let mut done = construct();
        store.insert(&done).await.unwrap();
        done.begin_attempt().unwrap();
        done.complete_attempt(AttemptCompletion::Succeeded { output: json!(1) }).unwrap();
        let expected = done.bump_revision();
        store.save(&done, expected).await.unwrap();

        let unfinished = store.list_unfinished().await.unwrap();
        assert_eq!(unfinished.iter().map(RetryConstruct::id).collect::<Vec<_>>(), vec![waiting.id()]);

        assert!(store.delete(waiting.id()).await.unwrap());
        assert!(store.list_unfinished().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_row_is_skipped_when_listing() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let healthy = construct();
        let damaged = construct();
        store.insert(&healthy).await.unwrap();
        store.insert(&damaged).await.unwrap();

        let conn = store.pool.get().unwrap();
        conn.execute(
            "UPDATE retry_constructs SET record = '{not json' WHERE id = ?1",
            params![damaged.id().to_string()],
        )
        .unwrap();

        let unfinished = store.list_unfinished().await.unwrap();
        assert_eq!(unfinished, vec![healthy]);
        assert!(store.load(damaged.id()).await.is_err(), "direct loads still report the damage");
    }

    #[tokio::test]
    async fn records_survive_reopening_the_database() {
        let dir = TempDir::new().unwrap();
        let c = construct();
        {
            let store = open(&dir);
            store.insert(&c).await.unwrap();
        }
        let reopened = open(&dir);
        assert_eq!(reopened.load(c.id()).await.unwrap(), Some(c));
    }
}
