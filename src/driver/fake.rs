//! Scripted in-memory driver used by unit tests: a cursor serving canned
//! rows and a connection that records everything and fails on demand.

use std::collections::HashSet;

use crate::config::Platform;
use crate::value::{SqlKind, SqlValue};

use super::{
    Accessor, BatchError, BatchFailure, CursorColumn, DbColumn, DbConnection, DriverError,
    RowCursor, UpdateCount,
};

pub(crate) struct FakeCursor {
    columns: Vec<CursorColumn>,
    rows: std::vec::IntoIter<Vec<SqlValue>>,
    current: Option<Vec<SqlValue>>,
    /// Fail with this message when advancing past the given row ordinal.
    fail_after: Option<(usize, String)>,
    produced: usize,
    pub closed: bool,
}

impl FakeCursor {
    pub fn new(columns: Vec<(&str, SqlKind)>, rows: Vec<Vec<SqlValue>>) -> Self {
        let columns = columns
            .into_iter()
            .map(|(name, kind)| CursorColumn {
                name: name.to_string(),
                kind,
                vendor_code: 0,
                size: 0,
            })
            .collect();
        Self {
            columns,
            rows: rows.into_iter(),
            current: None,
            fail_after: None,
            produced: 0,
            closed: false,
        }
    }

    pub fn failing_after(mut self, rows: usize, message: &str) -> Self {
        self.fail_after = Some((rows, message.to_string()));
        self
    }
}

impl RowCursor for FakeCursor {
    fn metadata(&mut self) -> Result<Vec<CursorColumn>, DriverError> {
        Ok(self.columns.clone())
    }

    fn advance(&mut self) -> Result<bool, DriverError> {
        if self.closed {
            return Ok(false);
        }
        if let Some((limit, message)) = &self.fail_after {
            if self.produced >= *limit {
                return Err(DriverError::Sql(message.clone()));
            }
        }
        match self.rows.next() {
            Some(row) => {
                self.current = Some(row);
                self.produced += 1;
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    fn read(&mut self, index: usize, _accessor: Accessor) -> Result<Option<SqlValue>, DriverError> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| DriverError::Sql("no current row".to_string()))?;
        Ok(match row.get(index) {
            Some(SqlValue::Null) | None => None,
            Some(value) => Some(value.clone()),
        })
    }

    fn close(&mut self) {
        self.closed = true;
        self.current = None;
    }
}

#[derive(Default)]
pub(crate) struct FakeConnection {
    pub columns: Vec<DbColumn>,
    pub platform: Option<Platform>,
    pub executed: Vec<String>,
    pub auto_commit_log: Vec<bool>,
    pub auto_commit: bool,
    pub commits: usize,
    pub insert_sql: Option<String>,
    pub inserted: Vec<Vec<SqlValue>>,
    pub batch_sizes: Vec<usize>,
    /// Row ordinals (0-based, across the whole load) that fail at execute.
    pub fail_rows: HashSet<usize>,
    /// When set, the driver stops at the first failure and reports only the
    /// preceding successes, without a sentinel for the failed row.
    pub stop_at_failure: bool,
    pending: Vec<SqlValue>,
    batch: Vec<(usize, Vec<SqlValue>)>,
    next_ordinal: usize,
}

impl FakeConnection {
    pub fn new(columns: Vec<DbColumn>) -> Self {
        Self {
            columns,
            auto_commit: true,
            ..Default::default()
        }
    }
}

impl DbConnection for FakeConnection {
    fn platform(&self) -> Option<Platform> {
        self.platform
    }

    fn table_columns(
        &mut self,
        _table: &str,
        _override_sql: Option<&str>,
    ) -> Result<Vec<DbColumn>, DriverError> {
        Ok(self.columns.clone())
    }

    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.executed.push(sql.to_string());
        Ok(())
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<bool, DriverError> {
        let previous = self.auto_commit;
        self.auto_commit = enabled;
        self.auto_commit_log.push(enabled);
        Ok(previous)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.commits += 1;
        Ok(())
    }

    fn prepare_insert(&mut self, sql: &str) -> Result<(), DriverError> {
        self.insert_sql = Some(sql.to_string());
        Ok(())
    }

    fn bind(&mut self, index: usize, value: SqlValue) -> Result<(), DriverError> {
        if self.pending.len() <= index {
            self.pending.resize(index + 1, SqlValue::Null);
        }
        self.pending[index] = value;
        Ok(())
    }

    fn add_batch(&mut self) -> Result<(), DriverError> {
        let row = std::mem::take(&mut self.pending);
        self.batch.push((self.next_ordinal, row));
        self.next_ordinal += 1;
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, BatchError> {
        self.batch_sizes.push(self.batch.len());
        let mut counts = Vec::new();
        let mut message = None;
        for (ordinal, row) in &self.batch {
            if self.fail_rows.contains(ordinal) {
                message
                    .get_or_insert_with(|| format!("constraint violated at row {}\ndetail", ordinal));
                if self.stop_at_failure {
                    break;
                }
                counts.push(UpdateCount::Failed);
            } else {
                self.inserted.push(row.clone());
                counts.push(UpdateCount::Rows(1));
            }
        }
        match message {
            Some(message) => Err(BatchError::Failure(BatchFailure {
                message,
                update_counts: counts,
            })),
            None => Ok(counts
                .into_iter()
                .map(|c| match c {
                    UpdateCount::Rows(n) => n,
                    UpdateCount::Failed => 0,
                })
                .collect()),
        }
    }

    fn clear_batch(&mut self) {
        self.batch.clear();
        self.pending.clear();
    }
}
