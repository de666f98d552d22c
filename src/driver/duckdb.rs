//! DuckDB adapter: a streaming cursor and a connection for the loader.
//!
//! The cursor runs its query on a background thread that owns the statement
//! and feeds rows through a bounded channel; metadata arrives as the first
//! message. Batch execution is emulated statement-at-a-time so failures
//! report per-row update counts.

use std::path::Path;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::JoinHandle;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use duckdb::types::Value;
use duckdb::Connection;
use log::debug;

use crate::config::Platform;
use crate::value::{SqlKind, SqlType, SqlValue};

use super::{
    Accessor, BatchError, BatchFailure, CursorColumn, DbColumn, DbConnection, DriverError,
    RowCursor, UpdateCount,
};

fn sql_err(e: duckdb::Error) -> DriverError {
    DriverError::Sql(e.to_string())
}

/// Owned DuckDB connection implementing the loader-side seam.
pub struct DuckDbConnection {
    conn: Connection,
    auto_commit: bool,
    insert_sql: Option<String>,
    pending_row: Vec<Value>,
    batch: Vec<Vec<Value>>,
}

impl DuckDbConnection {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        Connection::open(path.as_ref())
            .map(Self::from_connection)
            .map_err(sql_err)
    }

    pub fn open_in_memory() -> Result<Self, DriverError> {
        Connection::open_in_memory()
            .map(Self::from_connection)
            .map_err(sql_err)
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            auto_commit: true,
            insert_sql: None,
            pending_row: Vec::new(),
            batch: Vec::new(),
        }
    }

    /// Open a streaming cursor for a query. The cursor owns a cloned
    /// connection handle and a fetch thread.
    pub fn query(&self, sql: &str) -> Result<DuckDbCursor, DriverError> {
        let conn = self.conn.try_clone().map_err(sql_err)?;
        Ok(DuckDbCursor::spawn(conn, sql.to_string()))
    }
}

impl DbConnection for DuckDbConnection {
    fn platform(&self) -> Option<Platform> {
        Some(Platform::Generic)
    }

    fn table_columns(
        &mut self,
        table: &str,
        override_sql: Option<&str>,
    ) -> Result<Vec<DbColumn>, DriverError> {
        let sql = override_sql.map(str::to_string).unwrap_or_else(|| {
            format!(
                "SELECT column_name AS COLUMN_NAME, \
                        data_type AS DATA_TYPE, \
                        data_type AS TYPE_NAME, \
                        coalesce(character_maximum_length, numeric_precision, 0) AS COLUMN_SIZE \
                 FROM information_schema.columns \
                 WHERE lower(table_name) = lower('{}') \
                 ORDER BY ordinal_position",
                table.replace('\'', "''")
            )
        });
        let mut stmt = self.conn.prepare(&sql).map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let type_name: String = row.get(2)?;
                let size: Option<i64> = row.get(3)?;
                Ok(DbColumn {
                    name,
                    sql_type: SqlType::from_type_name(&type_name),
                    type_name,
                    size: size.unwrap_or(0).max(0) as u32,
                })
            })
            .map_err(sql_err)?;
        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.map_err(sql_err)?);
        }
        Ok(columns)
    }

    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.conn.execute_batch(sql).map_err(sql_err)
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<bool, DriverError> {
        let previous = self.auto_commit;
        if previous == enabled {
            return Ok(previous);
        }
        if enabled {
            // Close the open transaction before returning to auto-commit.
            self.conn.execute_batch("COMMIT").map_err(sql_err)?;
        } else {
            self.conn.execute_batch("BEGIN TRANSACTION").map_err(sql_err)?;
        }
        self.auto_commit = enabled;
        Ok(previous)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        if self.auto_commit {
            return Ok(());
        }
        self.conn
            .execute_batch("COMMIT; BEGIN TRANSACTION")
            .map_err(sql_err)
    }

    fn prepare_insert(&mut self, sql: &str) -> Result<(), DriverError> {
        // Validate eagerly so a bad statement fails here, not mid-batch.
        self.conn.prepare(sql).map_err(sql_err)?;
        self.insert_sql = Some(sql.to_string());
        self.pending_row.clear();
        self.batch.clear();
        Ok(())
    }

    fn bind(&mut self, index: usize, value: SqlValue) -> Result<(), DriverError> {
        if self.pending_row.len() <= index {
            self.pending_row.resize(index + 1, Value::Null);
        }
        self.pending_row[index] = to_duckdb_value(value);
        Ok(())
    }

    fn add_batch(&mut self) -> Result<(), DriverError> {
        self.batch.push(std::mem::take(&mut self.pending_row));
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, BatchError> {
        let sql = self
            .insert_sql
            .as_ref()
            .ok_or_else(|| DriverError::Sql("no insert prepared".to_string()))?
            .clone();
        let mut stmt = self.conn.prepare_cached(&sql).map_err(sql_err)?;

        let mut counts = Vec::with_capacity(self.batch.len());
        let mut first_error: Option<String> = None;
        let mut any_failed = false;
        for row in &self.batch {
            match stmt.execute(duckdb::params_from_iter(row.iter())) {
                Ok(n) => counts.push(UpdateCount::Rows(n as u64)),
                Err(e) => {
                    debug!("batch row failed: {}", e);
                    any_failed = true;
                    if first_error.is_none() {
                        first_error = Some(e.to_string());
                    }
                    counts.push(UpdateCount::Failed);
                }
            }
        }

        if any_failed {
            return Err(BatchError::Failure(BatchFailure {
                message: first_error.unwrap_or_else(|| "batch execute failed".to_string()),
                update_counts: counts,
            }));
        }
        Ok(counts
            .into_iter()
            .map(|c| match c {
                UpdateCount::Rows(n) => n,
                UpdateCount::Failed => 0,
            })
            .collect())
    }

    fn clear_batch(&mut self) {
        self.batch.clear();
        self.pending_row.clear();
    }
}

fn to_duckdb_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Boolean(b) => Value::Boolean(b),
        SqlValue::Int(i) => Value::Int(i),
        SqlValue::Long(l) => Value::BigInt(l),
        SqlValue::Float(f) => Value::Float(f),
        SqlValue::Double(d) => Value::Double(d),
        // Exact numerics travel as text; the engine casts to the column type.
        SqlValue::Decimal(d) => Value::Text(d.normalized().to_string()),
        SqlValue::BigInt(b) => Value::Text(b.to_string()),
        SqlValue::Text(s) => Value::Text(s),
        SqlValue::Bytes(b) => Value::Blob(b),
        SqlValue::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
        SqlValue::Time(t) => Value::Text(t.format("%H:%M:%S%.f").to_string()),
        SqlValue::TimeTz(t, off) => Value::Text(format!("{}{}", t.format("%H:%M:%S%.f"), off)),
        SqlValue::Timestamp(ts) => Value::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        SqlValue::TimestampTz(dt) => Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string()),
        SqlValue::Array(_) | SqlValue::Struct { .. } | SqlValue::Vector(_) => {
            Value::Text(format!("{:?}", value))
        }
    }
}

fn from_duckdb_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Boolean(b),
        Value::TinyInt(v) => SqlValue::Int(v as i32),
        Value::SmallInt(v) => SqlValue::Int(v as i32),
        Value::Int(v) => SqlValue::Int(v),
        Value::BigInt(v) => SqlValue::Long(v),
        Value::HugeInt(v) => SqlValue::BigInt(v.into()),
        Value::UTinyInt(v) => SqlValue::Int(v as i32),
        Value::USmallInt(v) => SqlValue::Int(v as i32),
        Value::UInt(v) => SqlValue::Long(v as i64),
        Value::UBigInt(v) => SqlValue::BigInt(v.into()),
        Value::Float(v) => SqlValue::Float(v),
        Value::Double(v) => SqlValue::Double(v),
        Value::Decimal(d) => std::str::FromStr::from_str(&d.to_string())
            .map(SqlValue::Decimal)
            .unwrap_or(SqlValue::Null),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Bytes(b),
        Value::Date32(days) => {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
            SqlValue::Date(epoch + Duration::days(days as i64))
        }
        Value::Time64(unit, amount) => {
            let micros = to_micros(unit, amount);
            let midnight = NaiveTime::MIN;
            SqlValue::Time(midnight + Duration::microseconds(micros))
        }
        Value::Timestamp(unit, amount) => {
            let micros = to_micros(unit, amount);
            match DateTime::from_timestamp_micros(micros) {
                Some(dt) => SqlValue::Timestamp(dt.naive_utc()),
                None => SqlValue::Null,
            }
        }
        other => SqlValue::Text(format!("{:?}", other)),
    }
}

fn to_micros(unit: duckdb::types::TimeUnit, amount: i64) -> i64 {
    use duckdb::types::TimeUnit;
    match unit {
        TimeUnit::Second => amount.saturating_mul(1_000_000),
        TimeUnit::Millisecond => amount.saturating_mul(1_000),
        TimeUnit::Microsecond => amount,
        TimeUnit::Nanosecond => amount / 1_000,
    }
}

fn kind_for_value(value: &SqlValue) -> Option<SqlKind> {
    match value {
        SqlValue::Null => None,
        SqlValue::Boolean(_) => Some(SqlKind::Boolean),
        SqlValue::Int(_) => Some(SqlKind::Int),
        SqlValue::Long(_) => Some(SqlKind::Long),
        SqlValue::Float(_) | SqlValue::Double(_) | SqlValue::Decimal(_) => Some(SqlKind::Double),
        SqlValue::BigInt(_) => Some(SqlKind::Long),
        SqlValue::Text(_) => Some(SqlKind::String),
        SqlValue::Bytes(_) => Some(SqlKind::Raw),
        SqlValue::Date(_) => Some(SqlKind::Date),
        SqlValue::Time(_) | SqlValue::TimeTz(..) => Some(SqlKind::Time),
        SqlValue::Timestamp(_) => Some(SqlKind::Timestamp),
        SqlValue::TimestampTz(_) => Some(SqlKind::TimestampTz),
        SqlValue::Array(_) => Some(SqlKind::Array),
        SqlValue::Struct { .. } => Some(SqlKind::Struct),
        SqlValue::Vector(_) => Some(SqlKind::Vector),
    }
}

enum CursorMsg {
    Meta(Vec<CursorColumn>),
    Row(Vec<SqlValue>),
    Done,
    Error(String),
}

/// Streaming cursor over a DuckDB query. A fetch thread owns the statement;
/// rows arrive over a bounded channel in execution order.
pub struct DuckDbCursor {
    receiver: Option<Receiver<CursorMsg>>,
    handle: Option<JoinHandle<()>>,
    current: Option<Vec<SqlValue>>,
    finished: bool,
}

impl DuckDbCursor {
    fn spawn(conn: Connection, sql: String) -> Self {
        let (tx, rx) = mpsc::sync_channel(1024);
        let handle = std::thread::spawn(move || fetch_thread(conn, sql, tx));
        Self {
            receiver: Some(rx),
            handle: Some(handle),
            current: None,
            finished: false,
        }
    }

    fn recv(&mut self) -> Option<CursorMsg> {
        self.receiver.as_ref().and_then(|rx| rx.recv().ok())
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn fetch_thread(conn: Connection, sql: String, tx: SyncSender<CursorMsg>) {
    let mut stmt = match conn.prepare(&sql) {
        Ok(stmt) => stmt,
        Err(e) => {
            let _ = tx.send(CursorMsg::Error(e.to_string()));
            return;
        }
    };

    let mut rows = match stmt.query([]) {
        Ok(rows) => rows,
        Err(e) => {
            let _ = tx.send(CursorMsg::Error(e.to_string()));
            return;
        }
    };

    let mut meta_sent = false;
    loop {
        match rows.next() {
            Ok(Some(row)) => {
                let stmt = row.as_ref();
                let column_count = stmt.column_count();
                let names: Vec<String> = stmt.column_names();
                let mut cells = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    let value = row
                        .get::<usize, Value>(i)
                        .map(from_duckdb_value)
                        .unwrap_or(SqlValue::Null);
                    cells.push(value);
                }
                if !meta_sent {
                    let columns = names
                        .iter()
                        .enumerate()
                        .map(|(i, name)| CursorColumn {
                            name: name.clone(),
                            kind: cells
                                .get(i)
                                .and_then(kind_for_value)
                                .unwrap_or(SqlKind::String),
                            vendor_code: 0,
                            size: 0,
                        })
                        .collect();
                    if tx.send(CursorMsg::Meta(columns)).is_err() {
                        return;
                    }
                    meta_sent = true;
                }
                if tx.send(CursorMsg::Row(cells)).is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(CursorMsg::Error(e.to_string()));
                return;
            }
        }
    }

    if !meta_sent {
        // Empty result: names only, string kinds.
        let columns = rows
            .as_ref()
            .map(|stmt| {
                stmt.column_names()
                    .into_iter()
                    .map(|name| CursorColumn {
                        name,
                        kind: SqlKind::String,
                        vendor_code: 0,
                        size: 0,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let _ = tx.send(CursorMsg::Meta(columns));
    }
    let _ = tx.send(CursorMsg::Done);
}

impl RowCursor for DuckDbCursor {
    fn metadata(&mut self) -> Result<Vec<CursorColumn>, DriverError> {
        match self.recv() {
            Some(CursorMsg::Meta(columns)) => Ok(columns),
            Some(CursorMsg::Error(e)) => {
                self.finished = true;
                Err(DriverError::Sql(e))
            }
            Some(CursorMsg::Done) | None => {
                self.finished = true;
                Err(DriverError::Sql("cursor produced no metadata".to_string()))
            }
            Some(CursorMsg::Row(_)) => Err(DriverError::Sql(
                "row arrived before metadata".to_string(),
            )),
        }
    }

    fn advance(&mut self) -> Result<bool, DriverError> {
        if self.finished {
            return Ok(false);
        }
        match self.recv() {
            Some(CursorMsg::Row(cells)) => {
                self.current = Some(cells);
                Ok(true)
            }
            Some(CursorMsg::Done) | None => {
                self.finished = true;
                self.current = None;
                self.join();
                Ok(false)
            }
            Some(CursorMsg::Error(e)) => {
                self.finished = true;
                self.current = None;
                self.join();
                Err(DriverError::Sql(e))
            }
            Some(CursorMsg::Meta(_)) => Err(DriverError::Sql("unexpected metadata".to_string())),
        }
    }

    fn read(&mut self, index: usize, _accessor: Accessor) -> Result<Option<SqlValue>, DriverError> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| DriverError::Sql("no current row".to_string()))?;
        let cell = row
            .get(index)
            .ok_or_else(|| DriverError::Sql(format!("column index {} out of range", index)))?;
        Ok(match cell {
            SqlValue::Null => None,
            other => Some(other.clone()),
        })
    }

    fn close(&mut self) {
        self.finished = true;
        self.current = None;
        // Disconnect the channel so a fetch thread blocked on send exits.
        self.receiver = None;
        self.join();
    }
}

impl Drop for DuckDbCursor {
    fn drop(&mut self) {
        self.close();
    }
}
