//! Buffered file sink with transparent compression.
//!
//! Bytes are staged in a small side buffer, drained into a main buffer
//! (plain output) or a deflating container (`.gz` / single-entry `.zip`),
//! and pushed to disk when the main buffer crosses its threshold or a flush
//! is forced. The trailing extension of the output path selects the
//! container; the inner entry of a zip is named after the stripped base name
//! plus the default extension.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use flate2::write::GzEncoder;
use flate2::Compression;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Side-buffer capacity; the main buffer reserves this much headroom too.
pub const RESERVED_BYTES: usize = 1 << 20;

enum Container {
    Plain { file: File, main: Vec<u8> },
    Gzip(GzEncoder<BufWriter<File>>),
    Zip(ZipWriter<BufWriter<File>>),
}

/// Buffered writer over a file, optionally compressed. Owns its buffers for
/// the sink's lifetime; `close` flushes, finalises any deflater, and is
/// idempotent afterwards.
pub struct FileSink {
    path: PathBuf,
    base_name: String,
    ext: String,
    container: Option<Container>,
    side: Vec<u8>,
    buffer_size: usize,
    current: usize,
    position: u64,
    closed: bool,
    encoding: Option<&'static Encoding>,
}

impl FileSink {
    /// Open a sink. `buffer_size` is the soft threshold for physical writes;
    /// `default_ext` names the extension appended to bare paths and the
    /// inner entry of compressed containers; `charset` re-encodes string
    /// writes when set (UTF-8 otherwise).
    pub fn new(
        buffer_size: usize,
        path: impl AsRef<Path>,
        default_ext: Option<&str>,
        charset: Option<&str>,
    ) -> io::Result<FileSink> {
        let mut path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;

        let mut base_name = file_name.clone();
        let mut ext = String::new();
        let mut zip_type: Option<String> = None;

        if let Some(dot) = base_name.rfind('.') {
            ext = base_name[dot + 1..].to_string();
            base_name.truncate(dot);
            if ext.eq_ignore_ascii_case("zip") || ext.eq_ignore_ascii_case("gz") {
                zip_type = Some(ext.to_ascii_lowercase());
                if let (Some(inner_dot), Some(default)) = (base_name.rfind('.'), default_ext) {
                    if base_name[inner_dot + 1..].eq_ignore_ascii_case(default) {
                        ext = default.to_string();
                        base_name.truncate(inner_dot);
                    }
                }
            }
        } else if let Some(default) = default_ext {
            ext = default.to_string();
            path.set_file_name(format!("{}.{}", file_name, default));
        }

        let encoding = match charset {
            Some(name) => Some(Encoding::for_label(name.as_bytes()).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unknown charset: {}", name),
                )
            })?),
            None => None,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let container = match zip_type.as_deref() {
            Some("zip") => {
                let mut writer = ZipWriter::new(BufWriter::new(file));
                let entry = format!("{}.{}", base_name, ext);
                writer
                    .start_file(entry, SimpleFileOptions::default())
                    .map_err(io::Error::other)?;
                Container::Zip(writer)
            }
            Some(_) => Container::Gzip(GzEncoder::new(
                BufWriter::new(file),
                Compression::default(),
            )),
            None => Container::Plain {
                file,
                main: Vec::with_capacity(buffer_size + RESERVED_BYTES),
            },
        };

        Ok(FileSink {
            path,
            base_name,
            ext,
            container: Some(container),
            side: Vec::with_capacity(RESERVED_BYTES),
            buffer_size,
            current: 0,
            position: 0,
            closed: false,
            encoding,
        })
    }

    /// The file actually opened on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name with compression and default extensions stripped.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// Sibling `.log` path used by writers for their extraction log.
    pub fn log_path(&self) -> PathBuf {
        self.path.with_file_name(format!("{}.log", self.base_name))
    }

    /// Total bytes accepted and physically flushed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes staged since the last physical flush.
    pub fn pending(&self) -> usize {
        self.current + self.side.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn write_bytes(&mut self, mut bytes: &[u8]) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        while !bytes.is_empty() {
            let room = RESERVED_BYTES - self.side.len();
            let take = room.min(bytes.len());
            self.side.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if self.side.len() >= RESERVED_BYTES {
                self.drain_side(false)?;
            }
        }
        Ok(())
    }

    pub fn write_char(&mut self, c: char) -> io::Result<()> {
        let mut buf = [0u8; 4];
        self.write_bytes(c.encode_utf8(&mut buf).as_bytes())
    }

    pub fn write_str(&mut self, s: &str) -> io::Result<()> {
        match self.encoding {
            Some(enc) if enc != encoding_rs::UTF_8 => {
                let (encoded, _, _) = enc.encode(s);
                self.write_bytes(&encoded)
            }
            _ => self.write_bytes(s.as_bytes()),
        }
    }

    /// Move the side buffer into the main buffer or deflater.
    fn drain_side(&mut self, force: bool) -> io::Result<()> {
        if (!force && self.side.len() < RESERVED_BYTES) || self.side.is_empty() || self.closed {
            return Ok(());
        }
        let result = match self.container.as_mut() {
            None => return Ok(()),
            Some(Container::Plain { main, .. }) => {
                main.extend_from_slice(&self.side);
                Ok(())
            }
            Some(Container::Gzip(encoder)) => encoder.write_all(&self.side),
            Some(Container::Zip(writer)) => writer.write_all(&self.side),
        };
        match result {
            Ok(()) => {
                self.current += self.side.len();
                self.side.clear();
                Ok(())
            }
            Err(e) => {
                self.side.clear();
                self.current = 0;
                self.abort();
                Err(e)
            }
        }
    }

    /// Flush staged bytes. A physical write happens when forced or when the
    /// accumulated bytes reach the threshold; returns true iff one did.
    pub fn flush(&mut self, force: bool) -> io::Result<bool> {
        self.drain_side(force)?;
        if self.current == 0 || (!force && self.current < self.buffer_size.saturating_sub(1024)) {
            return Ok(false);
        }
        self.position += self.current as u64;
        let write_result = match self.container.as_mut() {
            Some(Container::Plain { file, main }) => {
                let result = file.write_all(main);
                main.clear();
                result
            }
            // Deflating containers sync-flush so the bytes reach the file.
            Some(Container::Gzip(encoder)) => encoder.flush(),
            Some(Container::Zip(writer)) => writer.flush(),
            None => Ok(()),
        };
        self.current = 0;
        if let Err(e) = write_result {
            self.abort();
            return Err(e);
        }
        Ok(true)
    }

    /// Flush everything, finalise the container, and close the file. Safe to
    /// call more than once.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush(true)?;
        self.closed = true;
        match self.container.take() {
            Some(Container::Gzip(encoder)) => {
                let mut inner = encoder.finish()?;
                inner.flush()?;
            }
            Some(Container::Zip(writer)) => {
                let mut inner = writer.finish().map_err(io::Error::other)?;
                inner.flush()?;
            }
            Some(Container::Plain { mut file, .. }) => {
                file.flush()?;
            }
            None => {}
        }
        Ok(())
    }

    /// Enter the closed state without finalising; used on write failures.
    fn abort(&mut self) {
        self.closed = true;
        self.container = None;
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        FileSink::flush(self, false).map(|_| ())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
