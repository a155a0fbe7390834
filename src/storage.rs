//! Embedded analytical store: table lifecycle, metadata bookkeeping, and
//! SQL access, backed by an embedded `duckdb::Connection`.
//!
//! The single-writer invariant is realized with a `parking_lot::Mutex`
//! guarding the one connection used for all mutations; reads against a
//! file-backed store open a fresh short-lived connection (DuckDB permits
//! concurrent readers against a file), while an in-memory store has no
//! file to reopen and so reads are serialized through the same mutex as
//! writes.

use crate::errors::{AnalyticsError, Result};
use crate::models::units::{PropertyMap, TableKind};
use crate::models::{ColumnInfo, ColumnStats, EventRecord, ProfileRecord, TableMetadata};
use chrono::{NaiveDate, Utc};
use duckdb::{params, Connection};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

const METADATA_TABLE: &str = "_metadata";

/// Where the local store persists its data.
#[derive(Debug, Clone)]
pub enum StoreLocation {
    /// Ephemeral, process-local store.
    Memory,
    /// Persisted to a single file on disk.
    File(PathBuf),
}

struct Inner {
    location: StoreLocation,
    conn: Mutex<Connection>,
}

/// The embedded analytical store. Cheaply `Clone` (an `Arc` around the
/// shared connection and location).
#[derive(Clone)]
pub struct StorageEngine {
    inner: Arc<Inner>,
}

impl StorageEngine {
    /// Opens (creating if necessary) the store at `location`.
    pub fn open(location: StoreLocation) -> Result<Self> {
        let conn = match &location {
            StoreLocation::Memory => Connection::open_in_memory()?,
            StoreLocation::File(path) => Connection::open(path)?,
        };
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {METADATA_TABLE} (
                name TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                row_count BIGINT NOT NULL,
                byte_size BIGINT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                date_from DATE,
                date_to DATE
            )"
        ))?;

        Ok(Self {
            inner: Arc::new(Inner {
                location,
                conn: Mutex::new(conn),
            }),
        })
    }

    /// Creates a table named `name` of the given `kind`.
    ///
    /// Fails with [`AnalyticsError::TableExists`] unless `replace` is true,
    /// in which case any existing table and its metadata row are dropped
    /// first.
    pub fn create_table(&self, name: &str, kind: TableKind, replace: bool) -> Result<()> {
        let conn = self.inner.conn.lock();

        let exists = table_exists(&conn, name)?;
        if exists && !replace {
            return Err(AnalyticsError::TableExists(name.to_string()));
        }
        if exists {
            drop_table_locked(&conn, name)?;
        }

        match kind {
            TableKind::Events => conn.execute_batch(&format!(
                "CREATE TABLE \"{name}\" (
                    distinct_id TEXT,
                    event_name TEXT,
                    event_time TIMESTAMP,
                    insert_id TEXT,
                    properties JSON
                )"
            ))?,
            TableKind::Profiles => conn.execute_batch(&format!(
                "CREATE TABLE \"{name}\" (
                    distinct_id TEXT PRIMARY KEY,
                    properties JSON,
                    last_seen TIMESTAMP
                )"
            ))?,
        }

        conn.execute(
            &format!(
                "INSERT INTO {METADATA_TABLE}
                 (name, kind, row_count, byte_size, created_at, date_from, date_to)
                 VALUES (?, ?, 0, 0, ?, NULL, NULL)"
            ),
            params![name, kind.as_str(), Utc::now().naive_utc()],
        )?;

        Ok(())
    }

    /// Appends a batch of normalized event rows, atomically, updating
    /// metadata (row count, byte size, covered date range) at commit.
    pub fn append_event_batch(&self, table: &str, rows: &[EventRecord]) -> Result<()> {
        let mut conn = self.inner.conn.lock();
        require_table(&conn, table)?;

        let tx = conn.transaction()?;
        {
            let mut appender = tx.appender(table)?;
            for row in rows {
                let properties = Value::Object(row.properties.clone()).to_string();
                appender.append_row(params![
                    row.distinct_id,
                    row.event_name,
                    row.event_time.naive_utc(),
                    row.insert_id,
                    properties,
                ])?;
            }
            appender.flush()?;
        }

        let (min_date, max_date) = date_bounds(rows.iter().map(|r| r.event_time.date_naive()));
        update_metadata_after_append(&tx, table, min_date, max_date)?;
        tx.commit()?;
        Ok(())
    }

    /// Appends a batch of normalized profile rows. Existing `distinct_id`s
    /// are replaced (last write wins), matching the Provider's own
    /// upsert-by-distinct-id semantics for profile exports.
    pub fn append_profile_batch(&self, table: &str, rows: &[ProfileRecord]) -> Result<()> {
        let mut conn = self.inner.conn.lock();
        require_table(&conn, table)?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO \"{table}\" (distinct_id, properties, last_seen)
                 VALUES (?, ?, ?)
                 ON CONFLICT (distinct_id) DO UPDATE SET
                    properties = excluded.properties,
                    last_seen = excluded.last_seen"
            ))?;
            for row in rows {
                let properties = Value::Object(row.properties.clone()).to_string();
                let last_seen = row.last_seen.map(|t| t.naive_utc());
                stmt.execute(params![row.distinct_id, properties, last_seen])?;
            }
        }

        update_metadata_after_append(&tx, table, None, None)?;
        tx.commit()?;
        Ok(())
    }

    /// Drops a single table and its metadata row.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let conn = self.inner.conn.lock();
        require_table(&conn, name)?;
        drop_table_locked(&conn, name)
    }

    /// Drops every table, optionally restricted to one [`TableKind`].
    pub fn drop_all(&self, kind_filter: Option<TableKind>) -> Result<()> {
        let conn = self.inner.conn.lock();
        let names = list_table_names(&conn, kind_filter)?;
        for name in names {
            drop_table_locked(&conn, &name)?;
        }
        Ok(())
    }

    /// Returns the column schema of `name`.
    pub fn schema(&self, name: &str) -> Result<Vec<ColumnInfo>> {
        let conn = self.read_connection()?;
        require_table(&conn, name)?;

        let mut stmt = conn.prepare(&format!("DESCRIBE \"{name}\""))?;
        let rows = stmt.query_map([], |row| {
            let col_name: String = row.get(0)?;
            let sql_type: String = row.get(1)?;
            let nullable_str: String = row.get(2)?;
            Ok(ColumnInfo {
                name: col_name,
                sql_type,
                nullable: nullable_str.eq_ignore_ascii_case("yes"),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    /// Returns up to `n` sample rows from `name` as JSON objects.
    pub fn sample(&self, name: &str, n: u32) -> Result<Vec<Value>> {
        let conn = self.read_connection()?;
        require_table(&conn, name)?;
        self.query_rows_as_json(&conn, &format!("SELECT * FROM \"{name}\" LIMIT {n}"))
    }

    /// Returns per-column summary statistics for `name`.
    pub fn summarize(&self, name: &str) -> Result<Vec<ColumnStats>> {
        self.schema(name)?
            .into_iter()
            .map(|col| self.column_stats(name, &col.name))
            .collect()
    }

    /// Issues an arbitrary read-only SQL query, returning rows as JSON
    /// objects (one object per row, column name → value).
    pub fn sql(&self, query: &str) -> Result<Vec<Value>> {
        let conn = self.read_connection()?;
        self.query_rows_as_json(&conn, query)
    }

    /// Issues a query expected to return exactly one row and one column.
    pub fn sql_scalar(&self, query: &str) -> Result<Value> {
        let conn = self.read_connection()?;
        let mut stmt = conn.prepare(query)?;
        let value: String = stmt
            .query_row([], |row| row.get::<_, String>(0))
            .map_err(AnalyticsError::from)?;
        serde_json::from_str(&value).or(Ok(Value::String(value)))
    }

    /// Returns the distinct top-level keys observed in a `JSON`-typed
    /// column across every row of `table`.
    pub fn json_keys(&self, table: &str, column: &str) -> Result<Vec<String>> {
        let conn = self.read_connection()?;
        require_table(&conn, table)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT UNNEST(json_keys(\"{column}\")) AS k FROM \"{table}\""
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys: Vec<String> = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)?;
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Returns summary statistics for a single column.
    pub fn column_stats(&self, table: &str, column: &str) -> Result<ColumnStats> {
        let conn = self.read_connection()?;
        require_table(&conn, table)?;

        let row = conn.query_row(
            &format!(
                "SELECT
                    COUNT(\"{column}\"),
                    COUNT(*) - COUNT(\"{column}\"),
                    COUNT(DISTINCT \"{column}\"),
                    MIN(\"{column}\")::VARCHAR,
                    MAX(\"{column}\")::VARCHAR
                 FROM \"{table}\""
            ),
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )?;

        Ok(ColumnStats {
            column: column.to_string(),
            non_null_count: row.0 as u64,
            null_count: row.1 as u64,
            distinct_count: Some(row.2 as u64),
            min: row.3,
            max: row.4,
        })
    }

    /// Returns the metadata row for `name`, if it exists.
    pub fn metadata(&self, name: &str) -> Result<Option<TableMetadata>> {
        let conn = self.read_connection()?;
        read_metadata(&conn, name)
    }

    /// Closes the store. A no-op beyond dropping the connection: DuckDB
    /// flushes and closes on `Drop`.
    pub fn close(&self) -> Result<()> {
        Ok(())
    }

    fn read_connection(&self) -> Result<ConnectionHandle<'_>> {
        match &self.inner.location {
            StoreLocation::File(path) => {
                Ok(ConnectionHandle::Owned(Connection::open(path)?))
            }
            StoreLocation::Memory => Ok(ConnectionHandle::Shared(self.inner.conn.lock())),
        }
    }

    fn query_rows_as_json(&self, conn: &ConnectionHandle<'_>, query: &str) -> Result<Vec<Value>> {
        let mut stmt = conn.prepare(query)?;
        let column_count = stmt.column_count();
        let column_names: Vec<String> = (0..column_count)
            .map(|i| stmt.column_name(i).unwrap_or_default().to_string())
            .collect();

        let rows = stmt.query_map([], move |row| {
            let mut obj = serde_json::Map::new();
            for (i, name) in column_names.iter().enumerate() {
                let text: Option<String> = row.get(i)?;
                let value = match text {
                    Some(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
                    None => Value::Null,
                };
                obj.insert(name.clone(), value);
            }
            Ok(Value::Object(obj))
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }
}

/// A read-handle abstraction: an owned fresh connection for file-backed
/// stores, or a guard on the shared connection for in-memory stores.
enum ConnectionHandle<'a> {
    Owned(Connection),
    Shared(parking_lot::MutexGuard<'a, Connection>),
}

impl<'a> std::ops::Deref for ConnectionHandle<'a> {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        match self {
            ConnectionHandle::Owned(c) => c,
            ConnectionHandle::Shared(guard) => guard,
        }
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
        params![name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn require_table(conn: &Connection, name: &str) -> Result<()> {
    if table_exists(conn, name)? {
        Ok(())
    } else {
        Err(AnalyticsError::TableNotFound(name.to_string()))
    }
}

fn drop_table_locked(conn: &Connection, name: &str) -> Result<()> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{name}\""))?;
    conn.execute(
        &format!("DELETE FROM {METADATA_TABLE} WHERE name = ?"),
        params![name],
    )?;
    Ok(())
}

fn list_table_names(conn: &Connection, kind_filter: Option<TableKind>) -> Result<Vec<String>> {
    let mut stmt = match kind_filter {
        Some(kind) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT name FROM {METADATA_TABLE} WHERE kind = ?"
            ))?;
            let rows = stmt.query_map(params![kind.as_str()], |row| row.get::<_, String>(0))?;
            return rows
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(AnalyticsError::from);
        }
        None => conn.prepare(&format!("SELECT name FROM {METADATA_TABLE}"))?,
    };
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(AnalyticsError::from)
}

fn date_bounds(dates: impl Iterator<Item = NaiveDate>) -> (Option<NaiveDate>, Option<NaiveDate>) {
    dates.fold((None, None), |(min, max), d| {
        (
            Some(min.map_or(d, |m: NaiveDate| m.min(d))),
            Some(max.map_or(d, |m: NaiveDate| m.max(d))),
        )
    })
}

fn update_metadata_after_append(
    tx: &duckdb::Transaction<'_>,
    table: &str,
    min_date: Option<NaiveDate>,
    max_date: Option<NaiveDate>,
) -> Result<()> {
    let row_count: i64 = tx.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
        row.get(0)
    })?;
    let byte_size: i64 = tx
        .query_row(
            "SELECT estimated_size FROM duckdb_tables() WHERE table_name = ?",
            params![table],
            |row| row.get(0),
        )
        .unwrap_or(0);

    tx.execute(
        &format!(
            "UPDATE {METADATA_TABLE} SET
                row_count = ?,
                byte_size = ?,
                date_from = COALESCE(LEAST(date_from, ?), date_from, ?),
                date_to = COALESCE(GREATEST(date_to, ?), date_to, ?)
             WHERE name = ?"
        ),
        params![row_count, byte_size, min_date, min_date, max_date, max_date, table],
    )?;

    Ok(())
}

fn read_metadata(conn: &Connection, name: &str) -> Result<Option<TableMetadata>> {
    let result = conn.query_row(
        &format!(
            "SELECT name, kind, row_count, byte_size, created_at, date_from, date_to
             FROM {METADATA_TABLE} WHERE name = ?"
        ),
        params![name],
        |row| {
            let kind_str: String = row.get(1)?;
            let kind = if kind_str == "events" {
                TableKind::Events
            } else {
                TableKind::Profiles
            };
            let created_at: chrono::NaiveDateTime = row.get(4)?;
            let date_from: Option<NaiveDate> = row.get(5)?;
            let date_to: Option<NaiveDate> = row.get(6)?;

            Ok(TableMetadata {
                name: row.get(0)?,
                kind,
                row_count: row.get::<_, i64>(2)? as u64,
                byte_size: row.get::<_, i64>(3)? as u64,
                created_at: created_at.and_utc(),
                date_range: match (date_from, date_to) {
                    (Some(f), Some(t)) => Some((f, t)),
                    _ => None,
                },
            })
        },
    );

    match result {
        Ok(metadata) => Ok(Some(metadata)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AnalyticsError::from(e)),
    }
}
