//! CSV wire format plumbing: dialect, decoded readers, and the quoting
//! predicate shared by the writers and the loader's size estimator.

pub mod detect;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use encoding_rs::{Decoder, Encoding, UTF_8};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("unknown charset: {0}")]
    UnknownCharset(String),

    #[error("CSV control characters must be ASCII, got {0:?}")]
    NonAsciiDialect(char),
}

/// Output line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// CSV character policy: single-character separator, quote, and escape, plus
/// the line terminator used on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvDialect {
    pub separator: char,
    pub quote: char,
    pub escape: char,
    pub line_end: LineEnding,
}

impl CsvDialect {
    /// Writer-side default: quotes are escaped by doubling.
    pub fn writer_default() -> Self {
        Self {
            separator: ',',
            quote: '"',
            escape: '"',
            line_end: LineEnding::Lf,
        }
    }

    /// Loader-side default: backslash escape.
    pub fn loader_default() -> Self {
        Self {
            separator: ',',
            quote: '"',
            escape: '\\',
            line_end: LineEnding::Lf,
        }
    }

    /// True when a field must be enclosed: it contains the separator, quote,
    /// escape, or a line break.
    pub fn needs_quotes(&self, field: &str) -> bool {
        field.contains(self.separator)
            || field.contains(self.quote)
            || field.contains(self.escape)
            || field.contains('\n')
            || field.contains('\r')
    }

    fn ascii(&self, c: char) -> Result<u8, CsvError> {
        u8::try_from(c).map_err(|_| CsvError::NonAsciiDialect(c))
    }

    /// Builder for a `csv` crate writer honouring this dialect (used for the
    /// `.bad` sidecar).
    pub fn writer_builder(&self) -> Result<csv::WriterBuilder, CsvError> {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(self.ascii(self.separator)?)
            .quote(self.ascii(self.quote)?)
            .terminator(match self.line_end {
                LineEnding::Lf => csv::Terminator::Any(b'\n'),
                LineEnding::CrLf => csv::Terminator::CRLF,
            });
        Ok(builder)
    }
}

/// Streaming reader over a CSV file: skips physical lines, decodes the
/// configured (or detected) charset to UTF-8, and joins quoted multi-line
/// fields.
pub struct CsvFileReader {
    reader: csv::Reader<Box<dyn Read>>,
    record: csv::ByteRecord,
    encoding: &'static Encoding,
}

impl CsvFileReader {
    /// Open a file. `encoding` of `None` triggers detection from the first
    /// few KiB; `skip_lines` physical lines are consumed before parsing.
    pub fn open(
        path: impl AsRef<Path>,
        dialect: &CsvDialect,
        skip_lines: u64,
        encoding: Option<&str>,
    ) -> Result<CsvFileReader, CsvError> {
        let path = path.as_ref();
        let encoding = match encoding {
            Some(name) => Encoding::for_label(name.as_bytes())
                .ok_or_else(|| CsvError::UnknownCharset(name.to_string()))?,
            None => {
                let mut sample = vec![0u8; detect::SAMPLE_BYTES];
                let mut file = File::open(path)?;
                let n = file.read(&mut sample)?;
                detect::detect_charset(&sample[..n])
            }
        };

        let mut file = File::open(path)?;
        let mut bom = [0u8; 3];
        let got = file.read(&mut bom)?;
        if !(got == 3 && bom == [0xEF, 0xBB, 0xBF]) {
            file.seek(SeekFrom::Start(0))?;
        }

        let mut buffered = BufReader::new(file);
        let mut scratch = Vec::new();
        for _ in 0..skip_lines {
            scratch.clear();
            if buffered.read_until(b'\n', &mut scratch)? == 0 {
                break;
            }
        }

        let source: Box<dyn Read> = if encoding == UTF_8 {
            Box::new(buffered)
        } else {
            Box::new(DecodeReader::new(buffered, encoding))
        };

        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(dialect.ascii(dialect.separator)?)
            .quote(dialect.ascii(dialect.quote)?);
        if dialect.escape != dialect.quote {
            builder.escape(Some(dialect.ascii(dialect.escape)?));
        }

        Ok(CsvFileReader {
            reader: builder.from_reader(source),
            record: csv::ByteRecord::new(),
            encoding,
        })
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Next logical record, or `None` at end of input.
    pub fn read_next(&mut self) -> Result<Option<Vec<String>>, CsvError> {
        if !self.reader.read_byte_record(&mut self.record)? {
            return Ok(None);
        }
        Ok(Some(
            self.record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect(),
        ))
    }
}

/// Adapter that re-encodes an arbitrary charset to UTF-8 on the fly.
struct DecodeReader<R: Read> {
    inner: R,
    decoder: Decoder,
    src: Vec<u8>,
    src_len: usize,
    eof: bool,
}

impl<R: Read> DecodeReader<R> {
    fn new(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            decoder: encoding.new_decoder_without_bom_handling(),
            src: vec![0u8; 8192],
            src_len: 0,
            eof: false,
        }
    }
}

impl<R: Read> Read for DecodeReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        // UTF-8 output needs room for at least one scalar value.
        if out.len() < 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "output buffer too small",
            ));
        }
        loop {
            let (_, consumed, written, _) =
                self.decoder
                    .decode_to_utf8(&self.src[..self.src_len], out, self.eof);
            if consumed > 0 {
                self.src.copy_within(consumed..self.src_len, 0);
                self.src_len -= consumed;
            }
            if written > 0 {
                return Ok(written);
            }
            if self.eof {
                return Ok(0);
            }
            let n = self.inner.read(&mut self.src[self.src_len..])?;
            if n == 0 {
                self.eof = true;
            } else {
                self.src_len += n;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_temp(content: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn reads_quoted_fields_and_embedded_newlines() {
        let f = write_temp(b"a,\"b,c\",\"line1\nline2\"\n1,2,3\n");
        let dialect = CsvDialect::loader_default();
        let mut reader = CsvFileReader::open(f.path(), &dialect, 0, None).unwrap();
        assert_eq!(
            reader.read_next().unwrap().unwrap(),
            vec!["a", "b,c", "line1\nline2"]
        );
        assert_eq!(reader.read_next().unwrap().unwrap(), vec!["1", "2", "3"]);
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn skips_physical_lines_before_parsing() {
        let f = write_temp(b"junk line\nanother\nid,name\n1,a\n");
        let dialect = CsvDialect::loader_default();
        let mut reader = CsvFileReader::open(f.path(), &dialect, 2, None).unwrap();
        assert_eq!(reader.read_next().unwrap().unwrap(), vec!["id", "name"]);
    }

    #[test]
    fn decodes_non_utf8_input() {
        let (encoded, _, _) = encoding_rs::GBK.encode("名称,值\n测试,1\n");
        let f = write_temp(&encoded);
        let dialect = CsvDialect::loader_default();
        let mut reader = CsvFileReader::open(f.path(), &dialect, 0, Some("GBK")).unwrap();
        assert_eq!(reader.read_next().unwrap().unwrap(), vec!["名称", "值"]);
        assert_eq!(reader.read_next().unwrap().unwrap(), vec!["测试", "1"]);
    }

    #[test]
    fn utf8_bom_is_transparent() {
        let mut content = vec![0xEF, 0xBB, 0xBF];
        content.extend_from_slice(b"id,name\n");
        let f = write_temp(&content);
        let dialect = CsvDialect::loader_default();
        let mut reader = CsvFileReader::open(f.path(), &dialect, 0, None).unwrap();
        assert_eq!(reader.read_next().unwrap().unwrap(), vec!["id", "name"]);
    }

    #[test]
    fn quoting_predicate() {
        let d = CsvDialect::writer_default();
        assert!(d.needs_quotes("a,b"));
        assert!(d.needs_quotes("say \"hi\""));
        assert!(d.needs_quotes("line\nbreak"));
        assert!(!d.needs_quotes("plain"));
    }
}
