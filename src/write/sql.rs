//! INSERT-script output: one `INSERT INTO … VALUES (…);` statement per row.
//!
//! String-typed cells use the SQL single-quote policy (embedded quotes
//! doubled); empty cells on numeric and boolean columns become `null`; long
//! statements break with a continuation indent once they pass the maximum
//! line width.

use std::io;
use std::path::Path;

use crate::codec::ValueCodec;
use crate::fetch::{CancelToken, PrefetchOptions, Prefetcher, RowStream};
use crate::sink::FileSink;
use crate::value::{EncodedCell, SqlKind};

use super::{ExtractionLog, WriteError};

const LINE_END: &str = "\n";

/// Writer producing an executable INSERT script from a row stream.
pub struct InsertScriptWriter {
    sink: FileSink,
    log: ExtractionLog,
    prefix: String,
    kinds: Vec<SqlKind>,
    max_line_width: usize,
    file_header: Option<String>,
    line_width: usize,
    total_rows: u64,
    async_mode: bool,
    fetch_hint: usize,
}

impl InsertScriptWriter {
    /// Create the output file (default extension `sql`).
    pub fn create(path: impl AsRef<Path>, buffer_size: usize) -> Result<Self, WriteError> {
        let sink = FileSink::new(buffer_size, path, Some("sql"), None)?;
        let log = ExtractionLog::open(&sink.log_path())?;
        Ok(Self {
            sink,
            log,
            prefix: String::new(),
            kinds: Vec::new(),
            max_line_width: 9999,
            file_header: None,
            line_width: 0,
            total_rows: 0,
            async_mode: false,
            fetch_hint: 30000,
        })
    }

    /// Prologue written before the first statement.
    pub fn set_file_header(&mut self, header: &str) {
        self.file_header = Some(header.to_string());
    }

    pub fn set_max_line_width(&mut self, width: usize) {
        self.max_line_width = width;
    }

    pub fn set_async_mode(&mut self, enabled: bool) {
        self.async_mode = enabled;
    }

    pub fn set_fetch_hint(&mut self, hint: usize) {
        self.fetch_hint = hint;
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Stream every row as an INSERT statement. The target table defaults to
    /// the output file's base name; `header_encloser` wraps column names in
    /// the statement prefix.
    pub fn write_query(
        &mut self,
        stream: RowStream,
        codec: &ValueCodec,
        table: Option<&str>,
        header_encloser: &str,
        cancel: &CancelToken,
    ) -> Result<u64, WriteError> {
        let names: Vec<String> = stream.columns().iter().map(|c| c.name.clone()).collect();
        self.kinds = stream.columns().iter().map(|c| c.kind).collect();
        let table = table.unwrap_or_else(|| self.sink.base_name()).to_string();
        self.init(&table, &names, header_encloser)?;

        if self.async_mode {
            let options = PrefetchOptions {
                fetch_hint: self.fetch_hint,
                row_limit: 0,
            };
            let mut prefetcher = Prefetcher::start(stream, options, cancel.clone());
            while let Some(raw) = prefetcher.next()? {
                let encoded = prefetcher.encode_row(codec, &raw);
                self.write_next_row(&encoded)?;
            }
        } else {
            let mut stream = stream;
            while let Some(raw) = stream.next_raw()? {
                let encoded = stream.encode_row(codec, &raw);
                self.write_next_row(&encoded)?;
            }
            stream.close();
        }

        self.close()?;
        Ok(self.total_rows)
    }

    fn init(&mut self, table: &str, names: &[String], encloser: &str) -> io::Result<()> {
        let joined = names
            .iter()
            .map(|n| format!("{}{}{}", encloser, n, encloser))
            .collect::<Vec<_>>()
            .join(",");
        self.prefix = format!("INSERT INTO {}({}){}  VALUES(", table, joined, LINE_END);
        self.line_width = 0;
        let header = self.file_header.clone().unwrap_or_default();
        self.put(&header)?;
        self.put(LINE_END)?;
        Ok(())
    }

    /// One statement per row, with continuation breaks past the line limit.
    pub fn write_next_row(&mut self, row: &[EncodedCell]) -> Result<(), WriteError> {
        if self.total_rows == 0 {
            self.log.log(0, self.sink.position());
        }
        let prefix = self.prefix.clone();
        self.put(&prefix)?;
        self.line_width = 2;
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                self.put(",")?;
            }
            if self.line_width > self.max_line_width {
                self.put(LINE_END)?;
                self.put("    ")?;
                self.line_width = 4;
            }
            let text = cell.field_text();
            let unquoted = self
                .kinds
                .get(i)
                .map(|k| k.is_unquoted())
                .unwrap_or(false);
            if unquoted {
                if text.is_empty() {
                    self.put("null")?;
                } else {
                    let owned = text.into_owned();
                    self.put(&owned)?;
                }
            } else {
                self.put("'")?;
                let escaped = text.replace('\'', "''");
                self.put(&escaped)?;
                self.put("'")?;
            }
        }
        self.put(");")?;
        self.put(LINE_END)?;
        self.total_rows += 1;
        self.flush(false)?;
        Ok(())
    }

    fn put(&mut self, s: &str) -> io::Result<()> {
        self.sink.write_str(s)?;
        self.line_width += s.len();
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

    pub fn close(&mut self) -> Result<(), WriteError> {
        self.flush(true)?;
        self.sink.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::config::CodecConfig;
    use crate::driver::fake::FakeCursor;
    use crate::value::SqlValue;

    fn script(
        columns: Vec<(&str, SqlKind)>,
        rows: Vec<Vec<SqlValue>>,
        configure: impl FnOnce(&mut InsertScriptWriter),
    ) -> String {
        let dir = tempdir().unwrap();
        let path = dir.path().join("items.sql");
        let codec = ValueCodec::new(CodecConfig::default());
        let stream = RowStream::open(Box::new(FakeCursor::new(columns, rows)), 100).unwrap();
        let mut writer = InsertScriptWriter::create(&path, 4096).unwrap();
        configure(&mut writer);
        writer
            .write_query(stream, &codec, None, "", &CancelToken::new())
            .unwrap();
        fs::read_to_string(&path).unwrap()
    }

    #[test]
    fn statements_quote_strings_and_null_empty_numerics() {
        let text = script(
            vec![
                ("ID", SqlKind::Int),
                ("NAME", SqlKind::String),
                ("QTY", SqlKind::Long),
            ],
            vec![
                vec![
                    SqlValue::Int(1),
                    SqlValue::Text("o'brien".to_string()),
                    SqlValue::Null,
                ],
                vec![
                    SqlValue::Int(2),
                    SqlValue::Text(String::new()),
                    SqlValue::Long(5),
                ],
            ],
            |_| {},
        );
        assert_eq!(
            text,
            "\nINSERT INTO items(ID,NAME,QTY)\n  VALUES(1,'o''brien',null);\n\
             INSERT INTO items(ID,NAME,QTY)\n  VALUES(2,'',5);\n"
        );
    }

    #[test]
    fn long_rows_break_with_continuation_indent() {
        let wide = "x".repeat(40);
        let text = script(
            vec![
                ("A", SqlKind::String),
                ("B", SqlKind::String),
                ("C", SqlKind::String),
            ],
            vec![vec![
                SqlValue::Text(wide.clone()),
                SqlValue::Text(wide.clone()),
                SqlValue::Text(wide),
            ]],
            |w| w.set_max_line_width(50),
        );
        assert!(text.contains(",\n    '"));
        assert!(text.ends_with(");\n"));
    }

    #[test]
    fn file_header_is_written_first() {
        let text = script(
            vec![("A", SqlKind::Int)],
            vec![vec![SqlValue::Int(1)]],
            |w| w.set_file_header("SET DEFINE OFF;"),
        );
        assert!(text.starts_with("SET DEFINE OFF;\n"));
    }

    #[test]
    fn header_encloser_wraps_column_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.sql");
        let codec = ValueCodec::new(CodecConfig::default());
        let stream = RowStream::open(
            Box::new(FakeCursor::new(
                vec![("A", SqlKind::Int)],
                vec![vec![SqlValue::Int(1)]],
            )),
            100,
        )
        .unwrap();
        let mut writer = InsertScriptWriter::create(&path, 4096).unwrap();
        writer
            .write_query(stream, &codec, Some("target"), "\"", &CancelToken::new())
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("INSERT INTO target(\"A\")"));
    }
}
