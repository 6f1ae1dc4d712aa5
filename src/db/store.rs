//! SQLite database store implementation.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Result as SqlResult, Row};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::models::*;
use super::repository::{Repository, StoreError};
use crate::time::TimeDetail;

const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
                return StoreError::Corrupt(err.to_string())
            }
            _ => {}
        }

        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => StoreError::ConstraintViolation(err.to_string()),
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::NotADatabase,
            ) => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Backend(err),
        }
    }
}

impl ToSql for TimeDetail {
    fn to_sql(&self) -> SqlResult<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_canonical_string()))
    }
}

impl FromSql for TimeDetail {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        TimeDetail::parse(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Connection settings for [`Store::open`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Thread-safe database store.
///
/// Every [`Repository`] call on a `Store` takes the connection lock and
/// commits on its own. Use [`Store::transaction`] to run several calls as one
/// atomic unit.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(config.busy_timeout)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    /// Run `f` inside a single transaction, holding the connection lock until
    /// it commits. Any error rolls the whole unit back.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Timestamps are stored as text, so ordering comparisons are lexical. That
/// only matches chronological order for four-digit years.
const DB_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;
const DB_TIME_MIN: &str = "0000-01-01 00:00:00.000000000";
const DB_TIME_MAX: &str = "9999-12-31 23:59:59.999999999";

fn db_time(t: &DateTime<Utc>) -> String {
    t.format(DB_TIME_FORMAT).to_string()
}

/// Format a timestamp that is about to be stored. Years outside 0000-9999
/// are refused.
fn stored_time(t: &DateTime<Utc>) -> Result<String, StoreError> {
    if !DB_YEARS.contains(&t.year()) {
        return Err(StoreError::ConstraintViolation(format!(
            "timestamp {t} is outside years 0000-9999"
        )));
    }
    Ok(db_time(t))
}

/// Format a cutoff for a `timestamp < ?` comparison, clamped to the stored
/// range.
fn cutoff_time(t: &DateTime<Utc>) -> String {
    if t.year() < *DB_YEARS.start() {
        DB_TIME_MIN.to_string()
    } else if t.year() > *DB_YEARS.end() {
        DB_TIME_MAX.to_string()
    } else {
        db_time(t)
    }
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

fn time_at(row: &Row<'_>, idx: usize) -> SqlResult<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_db_time(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("invalid timestamp {raw:?}").into())
    })
}

fn system_from_row(row: &Row<'_>) -> SqlResult<System> {
    Ok(System {
        id: row.get(0)?,
        name: row.get(1)?,
        reference: row.get(2)?,
    })
}

fn component_from_row(row: &Row<'_>) -> SqlResult<Component> {
    Ok(Component {
        id: row.get(0)?,
        name: row.get(1)?,
        base_url: row.get(2)?,
        system_id: row.get(3)?,
        reference: row.get(4)?,
        auth_token: row.get(5)?,
        metrics: Vec::new(),
    })
}

fn metric_from_row(row: &Row<'_>) -> SqlResult<Metric> {
    Ok(Metric {
        id: row.get(0)?,
        endpoint: row.get(1)?,
        frequency: row.get(2)?,
        expected_time: row.get(3)?,
        timeout: row.get(4)?,
        delete_after: row.get(5)?,
        auth_token: row.get(6)?,
        base_url: row.get(7)?,
    })
}

fn result_from_row(row: &Row<'_>) -> SqlResult<MetricResult> {
    Ok(MetricResult {
        metric_id: row.get(0)?,
        component_id: row.get(1)?,
        value: row.get(2)?,
        timeout: row.get(3)?,
        timestamp: time_at(row, 4)?,
        response_time: row.get(5)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> SqlResult<Comment> {
    Ok(Comment {
        metric_id: row.get(0)?,
        component_id: row.get(1)?,
        comment: row.get(2)?,
        timestamp: time_at(row, 3)?,
        start_timestamp: time_at(row, 4)?,
        end_timestamp: time_at(row, 5)?,
    })
}

const COMPONENT_COLUMNS: &str = "id, name, base_url, system_id, ref, auth_token";
const METRIC_COLUMNS: &str =
    "id, endpoint, frequency, expected_time, timeout, delete_after, auth_token, base_url";
const RESULT_COLUMNS: &str = "metric_id, component_id, value, timeout, timestamp, response_time";
const COMMENT_COLUMNS: &str =
    "metric_id, component_id, comment, timestamp, start_timestamp, end_timestamp";

fn insert_comment_row(conn: &Connection, comment: &Comment) -> Result<(), StoreError> {
    let timestamp = stored_time(&comment.timestamp)?;
    let start_timestamp = stored_time(&comment.start_timestamp)?;
    let end_timestamp = stored_time(&comment.end_timestamp)?;
    let res = conn.execute(
        "INSERT INTO comment (metric_id, component_id, comment, timestamp, start_timestamp, end_timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            comment.metric_id,
            comment.component_id,
            comment.comment,
            timestamp,
            start_timestamp,
            end_timestamp,
        ],
    );

    match res {
        Ok(_) => Ok(()),
        Err(err) => {
            let duplicate = matches!(
                &err,
                rusqlite::Error::SqliteFailure(e, _) if e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            );
            if duplicate {
                Err(StoreError::DuplicateKey(format!(
                    "comment ({}, {}, {})",
                    comment.component_id,
                    comment.metric_id,
                    db_time(&comment.timestamp)
                )))
            } else {
                Err(err.into())
            }
        }
    }
}

fn delete_comment_row(conn: &Connection, key: &CommentKey) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM comment WHERE component_id = ?1 AND metric_id = ?2 AND timestamp = ?3",
        params![key.component_id, key.metric_id, db_time(&key.timestamp)],
    )?;
    Ok(())
}

/// Run `f` under a savepoint so it nests inside an open transaction too.
fn with_savepoint<T, F>(conn: &Connection, name: &str, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&Connection) -> Result<T, StoreError>,
{
    conn.execute_batch(&format!("SAVEPOINT {name}"))?;
    match f(conn) {
        Ok(out) => {
            conn.execute_batch(&format!("RELEASE {name}"))?;
            Ok(out)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}")) {
                tracing::error!("Failed to roll back savepoint {}: {}", name, rollback);
            }
            Err(e)
        }
    }
}

impl Repository for Connection {
    // --- Systems ---

    fn get_system(&self, id: &str) -> Result<Option<System>, StoreError> {
        Ok(self
            .query_row(
                "SELECT id, name, ref FROM system WHERE id = ?1",
                params![id],
                system_from_row,
            )
            .optional()?)
    }

    fn list_systems(&self) -> Result<Vec<System>, StoreError> {
        let mut stmt = self.prepare("SELECT id, name, ref FROM system ORDER BY id")?;
        let systems = stmt
            .query_map([], system_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(systems)
    }

    fn insert_system(&self, system: &System) -> Result<(), StoreError> {
        self.execute(
            "INSERT INTO system (id, name, ref) VALUES (?1, ?2, ?3)",
            params![system.id, system.name, system.reference],
        )?;
        Ok(())
    }

    fn delete_system(&self, id: &str) -> Result<(), StoreError> {
        self.execute("DELETE FROM system WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- Components ---

    fn get_component(&self, id: &str) -> Result<Option<Component>, StoreError> {
        Ok(self
            .query_row(
                &format!("SELECT {COMPONENT_COLUMNS} FROM component WHERE id = ?1"),
                params![id],
                component_from_row,
            )
            .optional()?)
    }

    fn list_components(&self) -> Result<Vec<Component>, StoreError> {
        let mut stmt = self.prepare(&format!("SELECT {COMPONENT_COLUMNS} FROM component ORDER BY id"))?;
        let components = stmt
            .query_map([], component_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(components)
    }

    fn list_components_by_system(&self, system_id: &str) -> Result<Vec<Component>, StoreError> {
        let mut stmt = self.prepare(&format!(
            "SELECT {COMPONENT_COLUMNS} FROM component WHERE system_id = ?1 ORDER BY id"
        ))?;
        let components = stmt
            .query_map(params![system_id], component_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(components)
    }

    fn insert_component(&self, component: &Component) -> Result<(), StoreError> {
        self.execute(
            "INSERT INTO component (id, name, base_url, system_id, ref, auth_token) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                component.id,
                component.name,
                component.base_url,
                component.system_id,
                component.reference,
                component.auth_token,
            ],
        )?;
        Ok(())
    }

    fn delete_component(&self, id: &str) -> Result<(), StoreError> {
        self.execute("DELETE FROM component WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- Metrics ---

    fn get_metric(&self, component_id: &str, metric_id: &str) -> Result<Option<Metric>, StoreError> {
        Ok(self
            .query_row(
                &format!("SELECT {METRIC_COLUMNS} FROM metric WHERE component_id = ?1 AND id = ?2"),
                params![component_id, metric_id],
                metric_from_row,
            )
            .optional()?)
    }

    fn list_metrics_by_component(&self, component_id: &str) -> Result<Vec<Metric>, StoreError> {
        let mut stmt = self.prepare(&format!(
            "SELECT {METRIC_COLUMNS} FROM metric WHERE component_id = ?1 ORDER BY id"
        ))?;
        let metrics = stmt
            .query_map(params![component_id], metric_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(metrics)
    }

    fn insert_metric(&self, component_id: &str, metric: &Metric) -> Result<(), StoreError> {
        self.execute(
            "INSERT INTO metric (id, component_id, endpoint, frequency, expected_time, timeout, delete_after, auth_token, base_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                metric.id,
                component_id,
                metric.endpoint,
                metric.frequency,
                metric.expected_time,
                metric.timeout,
                metric.delete_after,
                metric.auth_token,
                metric.base_url,
            ],
        )?;
        Ok(())
    }

    fn delete_metrics_by_component(&self, component_id: &str) -> Result<(), StoreError> {
        self.execute("DELETE FROM metric WHERE component_id = ?1", params![component_id])?;
        Ok(())
    }

    // --- Results ---

    fn insert_result(&self, result: &MetricResult) -> Result<(), StoreError> {
        let timestamp = stored_time(&result.timestamp)?;
        self.execute(
            "INSERT INTO result (metric_id, component_id, value, timeout, timestamp, response_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                result.metric_id,
                result.component_id,
                result.value,
                result.timeout,
                timestamp,
                result.response_time,
            ],
        )?;
        Ok(())
    }

    fn list_results_by_component(&self, component_id: &str) -> Result<Vec<MetricResult>, StoreError> {
        let mut stmt = self.prepare(&format!(
            "SELECT {RESULT_COLUMNS} FROM result WHERE component_id = ?1 ORDER BY timestamp ASC"
        ))?;
        let results = stmt
            .query_map(params![component_id], result_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(results)
    }

    fn delete_results_by_component(&self, component_id: &str) -> Result<(), StoreError> {
        self.execute("DELETE FROM result WHERE component_id = ?1", params![component_id])?;
        Ok(())
    }

    fn delete_results_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let deleted = self.execute(
            "DELETE FROM result WHERE timestamp < ?1",
            params![cutoff_time(&cutoff)],
        )?;
        Ok(deleted)
    }

    fn delete_metric_results_older_than(
        &self,
        component_id: &str,
        metric_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let deleted = self.execute(
            "DELETE FROM result WHERE component_id = ?1 AND metric_id = ?2 AND timestamp < ?3",
            params![component_id, metric_id, cutoff_time(&cutoff)],
        )?;
        Ok(deleted)
    }

    // --- Comments ---

    fn get_comment(&self, key: &CommentKey) -> Result<Option<Comment>, StoreError> {
        Ok(self
            .query_row(
                &format!(
                    "SELECT {COMMENT_COLUMNS} FROM comment WHERE component_id = ?1 AND metric_id = ?2 AND timestamp = ?3"
                ),
                params![key.component_id, key.metric_id, db_time(&key.timestamp)],
                comment_from_row,
            )
            .optional()?)
    }

    fn list_comments_by_component(&self, component_id: &str) -> Result<Vec<Comment>, StoreError> {
        let mut stmt = self.prepare(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comment WHERE component_id = ?1 ORDER BY timestamp ASC"
        ))?;
        let comments = stmt
            .query_map(params![component_id], comment_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(comments)
    }

    fn insert_comment(&self, comment: &Comment) -> Result<(), StoreError> {
        insert_comment_row(self, comment)
    }

    fn replace_comment(&self, old: &CommentKey, new: &Comment) -> Result<(), StoreError> {
        with_savepoint(self, "replace_comment", |conn| {
            delete_comment_row(conn, old)?;
            insert_comment_row(conn, new)
        })
    }

    fn delete_comment(&self, key: &CommentKey) -> Result<(), StoreError> {
        delete_comment_row(self, key)
    }

    fn delete_comments_by_component(&self, component_id: &str) -> Result<(), StoreError> {
        self.execute("DELETE FROM comment WHERE component_id = ?1", params![component_id])?;
        Ok(())
    }
}

impl Repository for Store {
    fn get_system(&self, id: &str) -> Result<Option<System>, StoreError> {
        self.conn()?.get_system(id)
    }

    fn list_systems(&self) -> Result<Vec<System>, StoreError> {
        self.conn()?.list_systems()
    }

    fn insert_system(&self, system: &System) -> Result<(), StoreError> {
        self.conn()?.insert_system(system)
    }

    fn delete_system(&self, id: &str) -> Result<(), StoreError> {
        self.conn()?.delete_system(id)
    }

    fn get_component(&self, id: &str) -> Result<Option<Component>, StoreError> {
        self.conn()?.get_component(id)
    }

    fn list_components(&self) -> Result<Vec<Component>, StoreError> {
        self.conn()?.list_components()
    }

    fn list_components_by_system(&self, system_id: &str) -> Result<Vec<Component>, StoreError> {
        self.conn()?.list_components_by_system(system_id)
    }

    fn insert_component(&self, component: &Component) -> Result<(), StoreError> {
        self.conn()?.insert_component(component)
    }

    fn delete_component(&self, id: &str) -> Result<(), StoreError> {
        self.conn()?.delete_component(id)
    }

    fn get_metric(&self, component_id: &str, metric_id: &str) -> Result<Option<Metric>, StoreError> {
        self.conn()?.get_metric(component_id, metric_id)
    }

    fn list_metrics_by_component(&self, component_id: &str) -> Result<Vec<Metric>, StoreError> {
        self.conn()?.list_metrics_by_component(component_id)
    }

    fn insert_metric(&self, component_id: &str, metric: &Metric) -> Result<(), StoreError> {
        self.conn()?.insert_metric(component_id, metric)
    }

    fn delete_metrics_by_component(&self, component_id: &str) -> Result<(), StoreError> {
        self.conn()?.delete_metrics_by_component(component_id)
    }

    fn insert_result(&self, result: &MetricResult) -> Result<(), StoreError> {
        self.conn()?.insert_result(result)
    }

    fn list_results_by_component(&self, component_id: &str) -> Result<Vec<MetricResult>, StoreError> {
        self.conn()?.list_results_by_component(component_id)
    }

    fn delete_results_by_component(&self, component_id: &str) -> Result<(), StoreError> {
        self.conn()?.delete_results_by_component(component_id)
    }

    fn delete_results_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.conn()?.delete_results_older_than(cutoff)
    }

    fn delete_metric_results_older_than(
        &self,
        component_id: &str,
        metric_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.conn()?
            .delete_metric_results_older_than(component_id, metric_id, cutoff)
    }

    fn get_comment(&self, key: &CommentKey) -> Result<Option<Comment>, StoreError> {
        self.conn()?.get_comment(key)
    }

    fn list_comments_by_component(&self, component_id: &str) -> Result<Vec<Comment>, StoreError> {
        self.conn()?.list_comments_by_component(component_id)
    }

    fn insert_comment(&self, comment: &Comment) -> Result<(), StoreError> {
        self.conn()?.insert_comment(comment)
    }

    fn replace_comment(&self, old: &CommentKey, new: &Comment) -> Result<(), StoreError> {
        self.conn()?.replace_comment(old, new)
    }

    fn delete_comment(&self, key: &CommentKey) -> Result<(), StoreError> {
        self.conn()?.delete_comment(key)
    }

    fn delete_comments_by_component(&self, component_id: &str) -> Result<(), StoreError> {
        self.conn()?.delete_comments_by_component(component_id)
    }
}
