//! CSV → table loader: schema resolution, batched binds, per-row error
//! isolation with a `.bad` sidecar, and byte-based progress reporting.
//!
//! One load walks `READY → OPEN → SCHEMA_RESOLVED → LOAD_BATCH* → DONE`,
//! aborting early only on fatal errors or the configured error cap. The
//! connection's auto-commit setting is restored on every exit path.

pub mod infer;
pub mod schema;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::warn;
use thiserror::Error;

use crate::codec::ValueCodec;
use crate::config::{CodecConfig, LoadOptions, OptionError, Platform};
use crate::csvio::{CsvError, CsvFileReader};
use crate::driver::{BatchError, BatchFailure, DbConnection, DriverError, UpdateCount};

pub use schema::{build_insert_plan, ColumnPlan, InsertPlan};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("CSV file does not exist: {0}")]
    MissingFile(String),

    #[error("CSV file has no header row")]
    EmptyHeader,

    #[error("{0}")]
    SchemaMismatch(String),

    #[error("Error limit exceeded: {errors} errors (max allowed: {max})")]
    ErrorLimit { errors: u64, max: i64 },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Csv(#[from] CsvError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Options(#[from] OptionError),
}

/// Monotonic load counters plus the last-progress snapshots.
#[derive(Debug, Default)]
pub struct LoadStats {
    pub total_rows: u64,
    pub total_errors: u64,
    pub total_bytes: u64,
    last_rows: u64,
    last_errors: u64,
    last_bytes: u64,
}

impl LoadStats {
    pub fn successful(&self) -> u64 {
        self.total_rows - self.total_errors
    }
}

/// Drives one CSV file into one table over a [`DbConnection`].
pub struct Loader<'a> {
    conn: &'a mut dyn DbConnection,
    table: String,
    csv_path: PathBuf,
    opts: LoadOptions,
    platform: Platform,
    codec: ValueCodec,
    stats: LoadStats,
    progress: Box<dyn Write + 'a>,
    bad_file_path: PathBuf,
    started: Instant,
}

impl std::fmt::Debug for Loader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("table", &self.table)
            .field("csv_path", &self.csv_path)
            .field("opts", &self.opts)
            .field("platform", &self.platform)
            .field("stats", &self.stats)
            .field("bad_file_path", &self.bad_file_path)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl<'a> Loader<'a> {
    /// Validate the input file and set up the loader. A missing table name
    /// falls back to the file stem.
    pub fn new(
        conn: &'a mut dyn DbConnection,
        table: Option<&str>,
        csv_path: impl AsRef<Path>,
        opts: LoadOptions,
    ) -> Result<Self, LoadError> {
        let csv_path = csv_path.as_ref().to_path_buf();
        if !csv_path.is_file() {
            return Err(LoadError::MissingFile(csv_path.display().to_string()));
        }
        let table = match table {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => csv_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| LoadError::MissingFile(csv_path.display().to_string()))?,
        };
        let platform = opts
            .platform
            .or_else(|| conn.platform())
            .unwrap_or(Platform::Generic);
        let codec = ValueCodec::with_formats(
            CodecConfig {
                unescape_newline: opts.unescape_newline,
                ..CodecConfig::default()
            },
            opts.date_format.as_deref(),
            opts.timestamp_format.as_deref(),
            opts.timestamptz_format.as_deref(),
        );
        let bad_file_path = PathBuf::from(format!("{}.bad", csv_path.display()));
        Ok(Self {
            conn,
            table,
            csv_path,
            opts,
            platform,
            codec,
            stats: LoadStats::default(),
            progress: Box::new(io::stdout()),
            bad_file_path,
            started: Instant::now(),
        })
    }

    /// Redirect progress lines (default: stdout).
    pub fn with_progress_sink(mut self, sink: Box<dyn Write + 'a>) -> Self {
        self.progress = sink;
        self
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    pub fn bad_file_path(&self) -> &Path {
        &self.bad_file_path
    }

    fn log(&mut self, message: &str) -> Result<(), LoadError> {
        writeln!(self.progress, "{}", message)?;
        Ok(())
    }

    /// Full invocation: honour SHOW, run CREATE/TRUNCATE pre-steps, then
    /// load. Returns the number of rows processed.
    pub fn run(&mut self) -> Result<u64, LoadError> {
        let show = self.opts.show;
        if show.shows_ddl() {
            let ddl = infer::generate_create_table_ddl(
                &self.csv_path,
                &self.table,
                &self.opts,
                self.platform,
            )?;
            self.log(&ddl)?;
        }
        if show.shows_dml() {
            let plan = build_insert_plan(
                self.conn,
                &self.table,
                &self.csv_path,
                &self.opts,
                self.platform,
            )?;
            self.log(&plan.sql)?;
        }
        if show != crate::config::ShowMode::Off {
            return Ok(0);
        }

        if self.opts.create {
            let ddl = infer::generate_create_table_ddl(
                &self.csv_path,
                &self.table,
                &self.opts,
                self.platform,
            )?;
            self.log("Creating table with DDL:")?;
            self.log(&ddl)?;
            self.conn.execute(&ddl)?;
        }
        if self.opts.truncate {
            let sql = self.platform.truncate_sql(&self.table);
            self.log(&format!("Truncating table: {}", sql))?;
            self.conn.execute(&sql)?;
        }
        self.load()
    }

    /// The load itself: resolve schema, stream rows into batches, commit per
    /// batch, divert failures, report progress, and restore auto-commit.
    pub fn load(&mut self) -> Result<u64, LoadError> {
        self.started = Instant::now();
        self.stats = LoadStats::default();

        let plan = build_insert_plan(
            self.conn,
            &self.table,
            &self.csv_path,
            &self.opts,
            self.platform,
        )?;

        if self.bad_file_path.exists() {
            fs::remove_file(&self.bad_file_path)?;
        }
        let mut bad = self
            .opts
            .dialect
            .writer_builder()?
            .from_path(&self.bad_file_path)
            .map_err(CsvError::from)?;
        if let Some(headers) = &plan.csv_headers {
            if self.opts.has_header {
                bad.write_record(headers).map_err(CsvError::from)?;
            }
        }

        let previous_auto_commit = self.conn.set_auto_commit(false)?;
        self.conn.prepare_insert(&plan.sql)?;

        let result = self.load_rows(&plan, &mut bad);

        let _ = bad.flush();
        match self.conn.set_auto_commit(previous_auto_commit) {
            Ok(_) => result,
            Err(restore_err) => match result {
                // The original failure wins; the restore error is secondary.
                Err(e) => Err(e),
                Ok(_) => Err(restore_err.into()),
            },
        }
    }

    fn load_rows(
        &mut self,
        plan: &InsertPlan,
        bad: &mut csv::Writer<File>,
    ) -> Result<u64, LoadError> {
        let skip = self.opts.skip_rows + if self.opts.has_header { 1 } else { 0 };
        let mut reader = CsvFileReader::open(
            &self.csv_path,
            &self.opts.dialect,
            skip,
            self.opts.encoding.as_deref(),
        )?;

        let batch_size = self.opts.batch_rows.max(1);
        let mut batch_rows: Vec<Option<Vec<String>>> = vec![None; batch_size];
        let mut batch_count = 0usize;

        while let Some(row) = reader.read_next()? {
            if self.opts.row_limit > 0 && self.stats.total_rows >= self.opts.row_limit {
                break;
            }
            self.stats.total_bytes += self.row_size(&row);
            self.stats.total_rows += 1;

            let mut row_error: Option<String> = None;
            for (position, column) in plan.columns.iter().enumerate() {
                let field = row
                    .get(column.csv_index)
                    .map(String::as_str)
                    .unwrap_or("");
                match self.codec.decode(field, column.sql_type) {
                    Ok(value) => self.conn.bind(position, value)?,
                    Err(e) => {
                        row_error = Some(e.to_string());
                        break;
                    }
                }
            }
            if let Some(message) = row_error {
                self.handle_error()?;
                write_bad_row(bad, Some(row.as_slice()), Some(&message));
                self.log(&format!(
                    "Error processing row {}: {}",
                    self.stats.total_rows + self.opts.skip_rows,
                    message
                ))?;
                continue;
            }

            self.conn.add_batch()?;
            batch_rows[batch_count] = Some(row);
            batch_count += 1;

            // Swap in the runtime formatter caches once they have warmed up.
            if self.stats.total_rows >= 30 {
                self.codec.compact_caches();
            }

            if batch_count >= batch_size {
                self.execute_batch(bad, &mut batch_rows, batch_count)?;
                batch_count = 0;
            }
        }

        if batch_count > 0 {
            self.execute_batch(bad, &mut batch_rows, batch_count)?;
        } else {
            self.conn.commit()?;
        }

        self.progress_if_due()?;
        let elapsed = self.started.elapsed().as_secs_f64();
        let successful = self.stats.successful();
        let summary = format!(
            "[{}] Load completed in {:.2} seconds. Total rows processed: {}, \
             Total successful: {}, Total errors: {}, MB processed: {:.2}, successful/sec: {:.2}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            elapsed,
            self.stats.total_rows,
            successful,
            self.stats.total_errors,
            self.stats.total_bytes as f64 / (1024.0 * 1024.0),
            if elapsed > 0.0 {
                successful as f64 / elapsed
            } else {
                0.0
            },
        );
        self.log(&summary)?;
        Ok(self.stats.total_rows)
    }

    fn execute_batch(
        &mut self,
        bad: &mut csv::Writer<File>,
        batch_rows: &mut [Option<Vec<String>>],
        batch_count: usize,
    ) -> Result<(), LoadError> {
        match self.conn.execute_batch() {
            Ok(_) => {}
            Err(BatchError::Failure(failure)) => {
                self.handle_batch_failure(bad, &failure, batch_rows, batch_count)?;
            }
            Err(BatchError::Driver(e)) => return Err(e.into()),
        }
        self.conn.commit()?;
        self.conn.clear_batch();
        self.progress_if_due()?;
        for slot in batch_rows.iter_mut().take(batch_count) {
            *slot = None;
        }
        Ok(())
    }

    /// A failed batch keeps its successful rows; rows flagged failed, or
    /// past the driver's reported prefix, divert to the bad file.
    fn handle_batch_failure(
        &mut self,
        bad: &mut csv::Writer<File>,
        failure: &BatchFailure,
        batch_rows: &[Option<Vec<String>>],
        batch_count: usize,
    ) -> Result<(), LoadError> {
        write_bad_row(bad, None, Some(&failure.message));
        let reported = failure.update_counts.len();
        let mut failed_rows = 0usize;
        for i in 0..batch_count {
            let failed = i >= reported || failure.update_counts[i] == UpdateCount::Failed;
            if failed {
                self.handle_error()?;
                write_bad_row(bad, batch_rows[i].as_deref(), None);
                failed_rows += 1;
            }
        }
        let first_line = failure
            .message
            .trim()
            .split('\n')
            .next()
            .unwrap_or_default()
            .to_string();
        self.log(&format!(
            "Total failed rows: {}, failed with {}th row: {}",
            failed_rows,
            reported + 1,
            first_line
        ))?;
        Ok(())
    }

    /// Count an error against the cap; at the cap the load hard-stops.
    fn handle_error(&mut self) -> Result<(), LoadError> {
        self.stats.total_errors += 1;
        if self.opts.errors >= 0 && self.stats.total_errors >= self.opts.errors.max(0) as u64 {
            return Err(LoadError::ErrorLimit {
                errors: self.stats.total_errors,
                max: self.opts.errors,
            });
        }
        Ok(())
    }

    /// Approximate on-disk size of a row, for progress accounting.
    fn row_size(&self, row: &[String]) -> u64 {
        let mut size = (row.len() as u64).saturating_sub(1) + 2;
        for field in row {
            size += field.len() as u64 * 2;
            if field.contains(self.opts.dialect.separator)
                || field.contains(self.opts.dialect.quote)
                || field.contains('\n')
                || field.contains('\r')
            {
                size += 2;
                size += field
                    .chars()
                    .filter(|&c| c == self.opts.dialect.escape || c == self.opts.dialect.quote)
                    .count() as u64;
            }
        }
        size
    }

    fn progress_if_due(&mut self) -> Result<(), LoadError> {
        let Some(interval) = self.opts.progress_interval_bytes() else {
            return Ok(());
        };
        if self.stats.total_bytes - self.stats.last_bytes < interval {
            return Ok(());
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let interval_rows = (self.stats.total_rows - self.stats.last_rows)
            .saturating_sub(self.stats.total_errors - self.stats.last_errors);
        let message = format!(
            "[{}] Progress: {:.2} MB processed, {} rows, {} successful, {} errors, \
             {:.2} successful/sec",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.stats.total_bytes as f64 / (1024.0 * 1024.0),
            self.stats.total_rows,
            self.stats.successful(),
            self.stats.total_errors,
            if elapsed > 0.0 {
                interval_rows as f64 / elapsed
            } else {
                0.0
            },
        );
        self.log(&message)?;
        self.stats.last_rows = self.stats.total_rows;
        self.stats.last_errors = self.stats.total_errors;
        self.stats.last_bytes = self.stats.total_bytes;
        Ok(())
    }
}

/// Append a failure to the bad file: an `[ERROR] …` marker row (message cut
/// at its first line break), then the offending row verbatim. Best-effort.
fn write_bad_row(bad: &mut csv::Writer<File>, row: Option<&[String]>, message: Option<&str>) {
    if let Some(message) = message {
        let first_line = message.trim().split('\n').next().unwrap_or_default();
        if let Err(e) = bad.write_record([format!("[ERROR] {}", first_line)]) {
            warn!("error writing to bad file: {}", e);
        }
    }
    if let Some(row) = row {
        if let Err(e) = bad.write_record(row) {
            warn!("error writing to bad file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::TempDir;

    use super::*;
    use crate::driver::fake::FakeConnection;
    use crate::driver::DbColumn;
    use crate::value::{SqlType, SqlValue};

    fn columns() -> Vec<DbColumn> {
        vec![
            DbColumn {
                name: "id".to_string(),
                sql_type: SqlType::Integer,
                type_name: "INTEGER".to_string(),
                size: 0,
            },
            DbColumn {
                name: "amount".to_string(),
                sql_type: SqlType::Decimal,
                type_name: "DECIMAL(10,2)".to_string(),
                size: 10,
            },
        ]
    }

    fn write_csv(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn options(batch_rows: usize) -> LoadOptions {
        LoadOptions {
            batch_rows,
            ..LoadOptions::default()
        }
    }

    fn null_progress() -> Box<dyn Write> {
        Box::new(io::sink())
    }

    #[test]
    fn happy_path_batches_and_commits() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "data.csv", "id,amount\n1,10.50\n2,20.00\n3,30\n4,40.5\n");
        let mut conn = FakeConnection::new(columns());

        let total = {
            let mut loader = Loader::new(&mut conn, Some("t"), &path, options(3))
                .unwrap()
                .with_progress_sink(null_progress());
            let total = loader.run().unwrap();
            assert_eq!(loader.stats().total_rows, 4);
            assert_eq!(loader.stats().total_errors, 0);
            total
        };
        assert_eq!(total, 4);
        assert_eq!(conn.batch_sizes, vec![3, 1]);
        assert_eq!(conn.commits, 2);
        assert_eq!(conn.inserted.len(), 4);
        assert_eq!(conn.inserted[0][0], SqlValue::Int(1));
        // auto-commit off for the load, then restored
        assert_eq!(conn.auto_commit_log, vec![false, true]);
        assert!(conn.auto_commit);
    }

    #[test]
    fn bad_rows_divert_and_load_continues() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "data.csv",
            "id,amount\n1,10.50\n2,not_a_number\n3,30\n4,40.5\n",
        );
        let mut conn = FakeConnection::new(columns());
        let (total, errors) = {
            let mut loader = Loader::new(&mut conn, Some("t"), &path, options(3))
                .unwrap()
                .with_progress_sink(null_progress());
            let total = loader.run().unwrap();
            (total, loader.stats().total_errors)
        };
        assert_eq!(total, 4);
        assert_eq!(errors, 1);
        assert_eq!(conn.inserted.len(), 3);

        let bad = fs::read_to_string(format!("{}.bad", path.display())).unwrap();
        let lines: Vec<&str> = bad.lines().collect();
        assert_eq!(lines[0], "id,amount");
        assert_eq!(lines[1], "[ERROR] Invalid numeric value: not_a_number");
        assert_eq!(lines[2], "2,not_a_number");
    }

    #[test]
    fn batch_failure_diverts_flagged_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "data.csv", "id,amount\n1,1\n2,2\n3,3\n");
        let mut conn = FakeConnection::new(columns());
        conn.fail_rows.insert(2); // third bound row fails at execute

        let stats = {
            let mut loader = Loader::new(&mut conn, Some("t"), &path, options(3))
                .unwrap()
                .with_progress_sink(null_progress());
            loader.run().unwrap();
            (
                loader.stats().total_rows,
                loader.stats().total_errors,
            )
        };
        assert_eq!(stats, (3, 1));
        assert_eq!(conn.inserted.len(), 2);

        let bad = fs::read_to_string(format!("{}.bad", path.display())).unwrap();
        let lines: Vec<&str> = bad.lines().collect();
        assert_eq!(lines[0], "id,amount");
        assert!(lines[1].starts_with("[ERROR] constraint violated"));
        assert_eq!(lines[2], "3,3");
    }

    #[test]
    fn rows_past_driver_prefix_count_as_failed() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "data.csv", "id,amount\n1,1\n2,2\n3,3\n");
        let mut conn = FakeConnection::new(columns());
        conn.fail_rows.insert(1);
        conn.stop_at_failure = true; // driver reports only the prefix [1]

        let errors = {
            let mut loader = Loader::new(&mut conn, Some("t"), &path, options(3))
                .unwrap()
                .with_progress_sink(null_progress());
            loader.run().unwrap();
            loader.stats().total_errors
        };
        // Rows 2 and 3 are both past the reported prefix.
        assert_eq!(errors, 2);
    }

    #[test]
    fn error_cap_zero_hard_stops() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "data.csv", "id,amount\n1,bad\n2,2\n");
        let mut conn = FakeConnection::new(columns());
        let mut opts = options(8);
        opts.errors = 0;
        let err = {
            let mut loader = Loader::new(&mut conn, Some("t"), &path, opts)
                .unwrap()
                .with_progress_sink(null_progress());
            loader.run().unwrap_err()
        };
        assert!(matches!(err, LoadError::ErrorLimit { .. }));
        // auto-commit restored even on the error path
        assert!(conn.auto_commit);
    }

    #[test]
    fn row_limit_stops_early() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "data.csv", "id,amount\n1,1\n2,2\n3,3\n4,4\n");
        let mut conn = FakeConnection::new(columns());
        let mut opts = options(10);
        opts.row_limit = 2;
        let total = {
            let mut loader = Loader::new(&mut conn, Some("t"), &path, opts)
                .unwrap()
                .with_progress_sink(null_progress());
            loader.run().unwrap()
        };
        assert_eq!(total, 2);
        assert_eq!(conn.inserted.len(), 2);
    }

    #[test]
    fn show_mode_prints_and_skips_execution() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "data.csv", "id,amount\n1,1\n");
        let mut conn = FakeConnection::new(columns());
        let mut opts = options(10);
        opts.show = crate::config::ShowMode::All;

        let mut captured = Vec::new();
        let total = {
            let mut loader = Loader::new(&mut conn, Some("t"), &path, opts).unwrap();
            loader.progress = Box::new(io::Cursor::new(&mut captured));
            loader.run().unwrap()
        };
        assert_eq!(total, 0);
        assert!(conn.inserted.is_empty());
        let text = String::from_utf8(captured).unwrap();
        assert!(text.contains("CREATE TABLE t"));
        assert!(text.contains("INSERT INTO t"));
    }

    #[test]
    fn table_name_defaults_to_file_stem() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "events.csv", "id,amount\n1,1\n");
        let mut conn = FakeConnection::new(columns());
        let mut loader = Loader::new(&mut conn, None, &path, options(4))
            .unwrap()
            .with_progress_sink(null_progress());
        assert_eq!(loader.table, "events");
        loader.run().unwrap();
        drop(loader);
        assert!(conn.insert_sql.unwrap().contains("INSERT INTO events"));
    }

    #[test]
    fn loads_into_duckdb_end_to_end() {
        use crate::driver::duckdb::DuckDbConnection;
        use crate::driver::{Accessor, RowCursor};

        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "items.csv", "id,name,price\n1,a,1.5\n2,b,2.5\n3,c,\n");
        let mut conn = DuckDbConnection::open_in_memory().unwrap();
        DbConnection::execute(
            &mut conn,
            "CREATE TABLE items (id INTEGER, name VARCHAR, price DOUBLE)",
        )
        .unwrap();
        {
            let mut loader = Loader::new(&mut conn, Some("items"), &path, options(2))
                .unwrap()
                .with_progress_sink(null_progress());
            assert_eq!(loader.run().unwrap(), 3);
            assert_eq!(loader.stats().total_errors, 0);
        }
        let mut cursor = conn.query("SELECT count(*), sum(price) FROM items").unwrap();
        cursor.metadata().unwrap();
        assert!(cursor.advance().unwrap());
        assert_eq!(
            cursor.read(0, Accessor::Object).unwrap(),
            Some(SqlValue::Long(3))
        );
        assert_eq!(
            cursor.read(1, Accessor::Object).unwrap(),
            Some(SqlValue::Double(4.0))
        );
    }

    #[test]
    fn missing_file_is_fatal() {
        let mut conn = FakeConnection::new(columns());
        let err =
            Loader::new(&mut conn, Some("t"), "/nonexistent/file.csv", options(4)).unwrap_err();
        assert!(matches!(err, LoadError::MissingFile(_)));
    }

    #[test]
    fn accounting_invariant_holds() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "data.csv",
            "id,amount\n1,1\nx,2\n3,3\ny,4\n5,5\n",
        );
        let mut conn = FakeConnection::new(columns());
        let mut loader = Loader::new(&mut conn, Some("t"), &path, options(2))
            .unwrap()
            .with_progress_sink(null_progress());
        loader.run().unwrap();
        let stats = loader.stats();
        assert_eq!(stats.total_rows, 5);
        assert_eq!(stats.total_errors, 2);
        assert_eq!(stats.successful(), 3);
        drop(loader);
        assert_eq!(conn.inserted.len(), 3);

        // The bad file holds exactly the failed rows, each with its marker.
        let bad = fs::read_to_string(format!("{}.bad", path.display())).unwrap();
        let data_rows: Vec<&str> = bad
            .lines()
            .skip(1)
            .filter(|l| !l.starts_with("[ERROR]"))
            .collect();
        assert_eq!(data_rows, vec!["x,2", "y,4"]);
        let markers = bad
            .lines()
            .filter(|l| l.starts_with("[ERROR]"))
            .count();
        assert_eq!(markers, 2);
    }
}
