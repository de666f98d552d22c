//! Writers driving a row stream into a delimited or INSERT-script file.
//!
//! The delimited writer applies the column filter and remap policy, quotes
//! fields per the dialect, and couples its extraction log to the sink's
//! physical flushes: one progress line per flush, mirrored to the `.log`
//! sidecar next to the output.

pub mod control;
pub mod sql;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use log::info;
use thiserror::Error;

use crate::codec::ValueCodec;
use crate::csvio::CsvDialect;
use crate::fetch::{CancelToken, PrefetchOptions, Prefetcher, RowStream, SourceError};
use crate::sink::FileSink;
use crate::value::{EncodedCell, SqlKind};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Shared per-output state: dialect, quoting policy, column filter and
/// remaps, and the upper-cased titles they key on.
pub struct WriteContext {
    pub dialect: CsvDialect,
    pub apply_quotes_to_all: bool,
    excludes: HashSet<String>,
    remaps: HashMap<String, String>,
    titles: Vec<String>,
}

impl WriteContext {
    pub fn new(dialect: CsvDialect) -> Self {
        Self {
            dialect,
            apply_quotes_to_all: false,
            excludes: HashSet::new(),
            remaps: HashMap::new(),
            titles: Vec::new(),
        }
    }

    /// Drop a column from the output entirely.
    pub fn set_exclude(&mut self, column: &str) {
        self.excludes.insert(column.trim().to_uppercase());
    }

    /// Replace a column's value with a constant.
    pub fn set_remap(&mut self, column: &str, value: &str) {
        self.remaps
            .insert(column.trim().to_uppercase(), value.trim().to_string());
    }

    pub fn excludes(&self) -> &HashSet<String> {
        &self.excludes
    }

    fn init_titles(&mut self, names: &[String]) {
        self.titles = names.iter().map(|n| n.trim().to_uppercase()).collect();
    }

    fn is_excluded(&self, index: usize) -> bool {
        self.titles
            .get(index)
            .is_some_and(|t| self.excludes.contains(t))
    }

    fn remap_for(&self, index: usize) -> Option<&str> {
        self.titles
            .get(index)
            .and_then(|t| self.remaps.get(t))
            .map(String::as_str)
    }
}

/// Extraction log: one line per physical flush, written to the `.log`
/// sidecar and the diagnostic logger.
pub struct ExtractionLog {
    file: BufWriter<File>,
    started: Instant,
    last_rows: u64,
}

impl ExtractionLog {
    fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            file: BufWriter::new(File::create(path)?),
            started: Instant::now(),
            last_rows: 0,
        })
    }

    fn log(&mut self, rows: u64, bytes: u64) {
        let message = format!(
            "{}: {} rows extracted, total: {} rows, {:.2} MB, {:.3} secs",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            rows - self.last_rows,
            rows,
            bytes as f64 / 1024.0 / 1024.0,
            self.started.elapsed().as_secs_f64(),
        );
        let _ = writeln!(self.file, "{}", message);
        let _ = self.file.flush();
        info!("{}", message);
        self.last_rows = rows;
    }
}

/// Streams encoded rows into a delimited file.
pub struct DelimitedWriter {
    sink: FileSink,
    ctx: WriteContext,
    log: ExtractionLog,
    total_rows: u64,
    async_mode: bool,
    fetch_hint: usize,
    row_limit: u64,
    control_sidecar: bool,
}

impl DelimitedWriter {
    /// Create the output file (default extension `csv`; `.gz` / `.zip`
    /// select compression) and its `.log` sidecar.
    pub fn create(
        path: impl AsRef<Path>,
        dialect: CsvDialect,
        buffer_size: usize,
    ) -> Result<Self, WriteError> {
        let sink = FileSink::new(buffer_size, path, Some("csv"), None)?;
        let log = ExtractionLog::open(&sink.log_path())?;
        Ok(Self {
            sink,
            ctx: WriteContext::new(dialect),
            log,
            total_rows: 0,
            async_mode: false,
            fetch_hint: 30000,
            row_limit: 0,
            control_sidecar: true,
        })
    }

    pub fn context_mut(&mut self) -> &mut WriteContext {
        &mut self.ctx
    }

    pub fn set_async_mode(&mut self, enabled: bool) {
        self.async_mode = enabled;
    }

    pub fn set_fetch_hint(&mut self, hint: usize) {
        self.fetch_hint = hint;
    }

    pub fn set_row_limit(&mut self, limit: u64) {
        self.row_limit = limit;
    }

    pub fn set_control_sidecar(&mut self, enabled: bool) {
        self.control_sidecar = enabled;
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Drive a whole stream into the file: optional header row (plus the
    /// loader-control sidecar), then every row, pull or prefetch.
    pub fn write_query(
        &mut self,
        stream: RowStream,
        codec: &ValueCodec,
        include_header: bool,
        cancel: &CancelToken,
    ) -> Result<u64, WriteError> {
        let names: Vec<String> = stream.columns().iter().map(|c| c.name.clone()).collect();
        let kinds: Vec<Option<SqlKind>> =
            stream.columns().iter().map(|c| Some(c.kind)).collect();
        self.ctx.init_titles(&names);

        if include_header {
            let header: Vec<EncodedCell> = names
                .iter()
                .map(|n| EncodedCell::Text(n.clone()))
                .collect();
            self.write_next(&header)?;
            if self.control_sidecar {
                if let Some(dir) = self.sink.path().parent() {
                    control::write_control_file(
                        dir,
                        &self.sink.base_name().to_string(),
                        &names,
                        &kinds,
                        self.ctx.dialect.quote,
                        self.ctx.dialect.separator,
                        None,
                        self.ctx.excludes(),
                    )?;
                }
            }
        }

        if self.async_mode {
            let options = PrefetchOptions {
                fetch_hint: self.fetch_hint,
                row_limit: self.row_limit,
            };
            let mut prefetcher = Prefetcher::start(stream, options, cancel.clone());
            while let Some(raw) = prefetcher.next()? {
                let encoded = prefetcher.encode_row(codec, &raw);
                self.write_next(&encoded)?;
            }
        } else {
            let mut stream = stream;
            let mut written: u64 = 0;
            while let Some(raw) = stream.next_raw()? {
                let encoded = stream.encode_row(codec, &raw);
                self.write_next(&encoded)?;
                written += 1;
                if self.row_limit > 0 && written >= self.row_limit {
                    break;
                }
            }
            stream.close();
        }

        self.close()?;
        Ok(self.total_rows)
    }

    /// Write one row: remap wins over the cell value, excluded cells vanish,
    /// fields quote when the policy or content demands it.
    pub fn write_next(&mut self, row: &[EncodedCell]) -> Result<(), WriteError> {
        if self.total_rows == 0 {
            self.log.log(0, self.sink.position());
        }
        let dialect = self.ctx.dialect;
        let mut written = 0;
        for (i, cell) in row.iter().enumerate() {
            if self.ctx.is_excluded(i) {
                continue;
            }
            let text: String = match self.ctx.remap_for(i) {
                Some(replacement) => replacement.to_string(),
                None => cell.field_text().into_owned(),
            };
            written += 1;
            if written > 1 {
                self.sink.write_char(dialect.separator)?;
            }
            let special = dialect.needs_quotes(&text);
            let quoted = self.ctx.apply_quotes_to_all || special;
            if quoted {
                self.sink.write_char(dialect.quote)?;
            }
            if special {
                self.process_field(&text)?;
            } else {
                self.sink.write_str(&text)?;
            }
            if quoted {
                self.sink.write_char(dialect.quote)?;
            }
        }
        self.sink.write_str(dialect.line_end.as_str())?;
        self.total_rows += 1;
        self.flush(false)?;
        Ok(())
    }

    /// Escape embedded quote and escape characters by doubling.
    fn process_field(&mut self, field: &str) -> io::Result<()> {
        let CsvDialect { quote, escape, .. } = self.ctx.dialect;
        for c in field.chars() {
            if c == quote || c == escape {
                self.sink.write_char(escape)?;
            }
            self.sink.write_char(c)?;
        }
        Ok(())
    }

    fn flush(&mut self, force: bool) -> io::Result<()> {
        if self.sink.pending() == 0 {
            return Ok(());
        }
        if self.sink.flush(force)? {
            self.log.log(self.total_rows, self.sink.position());
        }
        Ok(())
    }

    /// Flush and close the sink; the final log line lands in the sidecar.
    pub fn close(&mut self) -> Result<(), WriteError> {
        self.flush(true)?;
        self.sink.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::*;
    use crate::config::CodecConfig;
    use crate::driver::fake::FakeCursor;
    use crate::value::SqlValue;

    fn write_rows(
        dir: &Path,
        columns: Vec<(&str, SqlKind)>,
        rows: Vec<Vec<SqlValue>>,
        include_header: bool,
        configure: impl FnOnce(&mut DelimitedWriter),
    ) -> (String, u64) {
        let path = dir.join("out.csv");
        let codec = ValueCodec::new(CodecConfig::default());
        let stream = RowStream::open(Box::new(FakeCursor::new(columns, rows)), 100).unwrap();
        let mut writer =
            DelimitedWriter::create(&path, CsvDialect::writer_default(), 4096).unwrap();
        writer.set_control_sidecar(false);
        configure(&mut writer);
        let total = writer
            .write_query(stream, &codec, include_header, &CancelToken::new())
            .unwrap();
        (fs::read_to_string(&path).unwrap(), total)
    }

    #[test]
    fn plain_csv_three_rows_exact_bytes() {
        let dir = tempdir().unwrap();
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let (text, _) = write_rows(
            dir.path(),
            vec![
                ("ID", SqlKind::Int),
                ("MSG", SqlKind::String),
                ("TS", SqlKind::Timestamp),
            ],
            vec![
                vec![
                    SqlValue::Int(1),
                    SqlValue::Text("a,b".to_string()),
                    SqlValue::Null,
                ],
                vec![
                    SqlValue::Int(2),
                    SqlValue::Text("say \"hi\"".to_string()),
                    SqlValue::Timestamp(ts),
                ],
                vec![
                    SqlValue::Int(3),
                    SqlValue::Text(String::new()),
                    SqlValue::Int(0),
                ],
            ],
            false,
            |_| {},
        );
        assert_eq!(
            text,
            "1,\"a,b\",\n2,\"say \"\"hi\"\"\",2024-01-02 03:04:05\n3,,0\n"
        );
    }

    #[test]
    fn header_and_row_count() {
        let dir = tempdir().unwrap();
        let (text, total) = write_rows(
            dir.path(),
            vec![("A", SqlKind::Int)],
            vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]],
            true,
            |_| {},
        );
        assert_eq!(text, "A\n1\n2\n");
        assert_eq!(total, 3); // header line counts as a written row
    }

    #[test]
    fn excludes_and_remaps() {
        let dir = tempdir().unwrap();
        let (text, _) = write_rows(
            dir.path(),
            vec![
                ("KEEP", SqlKind::Int),
                ("DROP_ME", SqlKind::String),
                ("MASK", SqlKind::String),
            ],
            vec![vec![
                SqlValue::Int(7),
                SqlValue::Text("secret".to_string()),
                SqlValue::Text("original".to_string()),
            ]],
            true,
            |w| {
                w.context_mut().set_exclude("drop_me");
                w.context_mut().set_remap("mask", "****");
            },
        );
        assert_eq!(text, "KEEP,MASK\n7,****\n");
    }

    #[test]
    fn quotes_all_when_requested() {
        let dir = tempdir().unwrap();
        let (text, _) = write_rows(
            dir.path(),
            vec![("A", SqlKind::String), ("B", SqlKind::Int)],
            vec![vec![SqlValue::Text("x".to_string()), SqlValue::Int(2)]],
            false,
            |w| w.context_mut().apply_quotes_to_all = true,
        );
        assert_eq!(text, "\"x\",\"2\"\n");
    }

    #[test]
    fn prefetch_and_pull_produce_identical_output() {
        let dir = tempdir().unwrap();
        let columns = vec![("N", SqlKind::Long)];
        let rows: Vec<Vec<SqlValue>> = (0..500).map(|i| vec![SqlValue::Long(i)]).collect();

        let (pull, _) = write_rows(dir.path(), columns.clone(), rows.clone(), false, |_| {});
        let dir2 = tempdir().unwrap();
        let (prefetched, _) = write_rows(dir2.path(), columns, rows, false, |w| {
            w.set_async_mode(true);
            w.set_fetch_hint(16);
        });
        assert_eq!(pull, prefetched);
    }

    #[test]
    fn log_sidecar_is_written() {
        let dir = tempdir().unwrap();
        let (_, _) = write_rows(
            dir.path(),
            vec![("A", SqlKind::Int)],
            vec![vec![SqlValue::Int(1)]],
            false,
            |_| {},
        );
        let log = fs::read_to_string(dir.path().join("out.log")).unwrap();
        assert!(log.contains("rows extracted"));
    }

    #[test]
    fn control_sidecar_follows_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.csv");
        let codec = ValueCodec::new(CodecConfig::default());
        let stream = RowStream::open(
            Box::new(FakeCursor::new(
                vec![
                    ("ID", SqlKind::Int),
                    ("EVT_TS", SqlKind::Timestamp),
                    ("NOTE", SqlKind::String),
                ],
                vec![],
            )),
            100,
        )
        .unwrap();
        let mut writer =
            DelimitedWriter::create(&path, CsvDialect::writer_default(), 4096).unwrap();
        writer
            .write_query(stream, &codec, true, &CancelToken::new())
            .unwrap();
        let ctl = fs::read_to_string(dir.path().join("events.ctl")).unwrap();
        assert!(ctl.contains("APPEND INTO TABLE events"));
        assert!(ctl.contains(
            "TIMESTAMP \"YYYY-MM-DD HH24:MI:SSXFF\" NULLIF \"EVT_TS\"=BLANKS"
        ));
    }
}
