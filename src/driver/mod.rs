//! Vendor seams: a typed forward-only cursor and a connection capable of
//! metadata lookup and batched parameterised inserts.
//!
//! The core never talks to a database directly; it drives these traits. One
//! concrete adapter ships for DuckDB.

pub mod duckdb;

use thiserror::Error;

use crate::config::Platform;
use crate::value::{SqlKind, SqlType, SqlValue};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver error: {0}")]
    Sql(String),

    #[error("accessor not supported: {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-row outcome of a batch execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCount {
    Rows(u64),
    Failed,
}

/// A batch execute failed for some rows; carries whatever per-row counts the
/// driver produced. Rows past the end of `update_counts` were never
/// attempted and count as failed too.
#[derive(Debug)]
pub struct BatchFailure {
    pub message: String,
    pub update_counts: Vec<UpdateCount>,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch execute failed: {}", .0.message)]
    Failure(BatchFailure),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Which vendor accessor to use for a cell. The row stream picks one per
/// column tag and falls back along the documented chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    /// Zone-aware timestamp with a region zone.
    ZonedDateTime,
    /// Zone-aware timestamp with a plain offset.
    OffsetDateTime,
    Timestamp,
    Date,
    Time,
    /// String form of the cell.
    Text,
    /// Full blob byte range; the driver frees any handle before returning.
    BlobBytes,
    /// Full clob character range.
    ClobText,
    /// Serialized XML text.
    XmlText,
    /// Whatever typed object the driver natively produces.
    Object,
}

/// Column metadata as reported by a cursor at open.
#[derive(Debug, Clone)]
pub struct CursorColumn {
    pub name: String,
    pub kind: SqlKind,
    /// Vendor type code, for diagnostics; 0 when the driver has none.
    pub vendor_code: i32,
    pub size: u32,
}

/// A forward-only typed cursor over query results.
pub trait RowCursor: Send {
    /// Read result metadata. Called once, immediately after open.
    fn metadata(&mut self) -> Result<Vec<CursorColumn>, DriverError>;

    /// Preferred fetch batch size; advisory.
    fn set_fetch_size(&mut self, _hint: usize) {}

    /// Best-effort forward-only hint; failures are swallowed by the caller.
    fn set_forward_only(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Cap the number of rows the cursor will produce; advisory.
    fn set_max_rows(&mut self, _limit: u64) {}

    /// Advance to the next row. False at end of data.
    fn advance(&mut self) -> Result<bool, DriverError>;

    /// Read one cell of the current row. `None` is a SQL NULL. A driver that
    /// cannot serve the requested accessor returns
    /// [`DriverError::Unsupported`] so the caller can fall back.
    fn read(&mut self, index: usize, accessor: Accessor) -> Result<Option<SqlValue>, DriverError>;

    /// Release the cursor. Safe to call more than once.
    fn close(&mut self);
}

/// One column of a target table, from connection metadata or the configured
/// metadata query.
#[derive(Debug, Clone)]
pub struct DbColumn {
    pub name: String,
    pub sql_type: SqlType,
    pub type_name: String,
    pub size: u32,
}

/// A database connection with the small surface the loader needs: metadata,
/// plain statements, and one prepared insert accumulating a batch.
pub trait DbConnection {
    /// Dialect reported by the connection, if it knows one.
    fn platform(&self) -> Option<Platform>;

    /// Columns of `table`, or the result of `override_sql` when configured.
    /// The override must project COLUMN_NAME, DATA_TYPE, TYPE_NAME,
    /// COLUMN_SIZE.
    fn table_columns(
        &mut self,
        table: &str,
        override_sql: Option<&str>,
    ) -> Result<Vec<DbColumn>, DriverError>;

    /// Execute a standalone statement (DDL, TRUNCATE).
    fn execute(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Switch auto-commit; returns the previous setting so callers can
    /// restore it on every exit path.
    fn set_auto_commit(&mut self, enabled: bool) -> Result<bool, DriverError>;

    fn commit(&mut self) -> Result<(), DriverError>;

    /// Install the prepared insert used by `bind`/`add_batch`.
    fn prepare_insert(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Bind one parameter of the pending row; 0-based position.
    fn bind(&mut self, index: usize, value: SqlValue) -> Result<(), DriverError>;

    /// Append the pending row to the batch.
    fn add_batch(&mut self) -> Result<(), DriverError>;

    /// Execute the accumulated batch; returns per-row update counts on full
    /// success. The batch is left intact for inspection on failure; callers
    /// clear it either way.
    fn execute_batch(&mut self) -> Result<Vec<u64>, BatchError>;

    fn clear_batch(&mut self);
}

#[cfg(test)]
pub(crate) mod fake;
