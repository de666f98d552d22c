//! Streaming row source with optional prefetch.
//!
//! [`RowStream`] presents a driver cursor as a finite pull sequence of raw
//! rows, picking the vendor accessor per column tag. [`Prefetcher`] moves
//! the pulling onto a background producer feeding a bounded queue, with an
//! abort token, a latched-error hand-off, and FIFO ordering — rows reach the
//! consumer in the cursor's native order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::debug;
use thiserror::Error;

use crate::codec::binary::to_upper_hex;
use crate::codec::ValueCodec;
use crate::driver::{Accessor, DriverError, RowCursor};
use crate::value::{ColumnDescriptor, EncodedCell, SqlKind, SqlValue};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("operation aborted")]
    Aborted,

    #[error("prefetch producer panicked")]
    ProducerPanicked,
}

/// Cooperative cancellation flag shared between a caller and the prefetch
/// producer. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A cursor wrapped as a finite sequence of raw rows.
pub struct RowStream {
    cursor: Box<dyn RowCursor>,
    columns: Vec<ColumnDescriptor>,
    fetch_hint: usize,
    done: bool,
}

impl RowStream {
    /// Read metadata and build the column descriptors. The fetch hint is
    /// applied to the cursor; the forward-only hint is best-effort.
    pub fn open(mut cursor: Box<dyn RowCursor>, fetch_hint: usize) -> Result<Self, SourceError> {
        cursor.set_fetch_size(fetch_hint);
        if let Err(e) = cursor.set_forward_only() {
            debug!("forward-only hint rejected: {}", e);
        }
        let columns = cursor
            .metadata()?
            .into_iter()
            .enumerate()
            .map(|(index, c)| ColumnDescriptor {
                index,
                name: c.name,
                kind: c.kind,
                vendor_code: c.vendor_code,
                vendor_class: None,
                size: c.size,
            })
            .collect();
        Ok(Self {
            cursor,
            columns,
            fetch_hint,
            done: false,
        })
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Advance the cursor and materialise one raw row; `None` once the
    /// cursor is exhausted (and from then on). A null cell is normalised to
    /// the null value no matter what the accessor returned.
    pub fn next_raw(&mut self) -> Result<Option<Vec<SqlValue>>, SourceError> {
        if self.done {
            return Ok(None);
        }
        if !self.cursor.advance()? {
            self.cursor.close();
            self.done = true;
            return Ok(None);
        }

        let mut row = Vec::with_capacity(self.columns.len());
        for i in 0..self.columns.len() {
            let kind = self.columns[i].kind;
            let value = self.read_cell(i, kind)?;
            if self.columns[i].vendor_class.is_none() && !value.is_null() {
                self.columns[i].vendor_class = Some(value.class_name().to_string());
            }
            row.push(value);
        }
        Ok(Some(row))
    }

    fn read_cell(&mut self, index: usize, kind: SqlKind) -> Result<SqlValue, SourceError> {
        let value = match kind {
            SqlKind::TimestampTz => self.read_chain(
                index,
                &[
                    Accessor::ZonedDateTime,
                    Accessor::OffsetDateTime,
                    Accessor::Timestamp,
                ],
            )?,
            SqlKind::Timestamp => self.cursor.read(index, Accessor::Timestamp)?,
            SqlKind::Date => self.cursor.read(index, Accessor::Date)?,
            SqlKind::Time => self.cursor.read(index, Accessor::Time)?,
            SqlKind::Blob => match self.cursor.read(index, Accessor::BlobBytes)? {
                Some(SqlValue::Bytes(bytes)) => Some(SqlValue::Text(to_upper_hex(&bytes))),
                other => other,
            },
            SqlKind::Clob => self.cursor.read(index, Accessor::ClobText)?,
            SqlKind::Xml => self.read_chain(index, &[Accessor::XmlText, Accessor::Object])?,
            SqlKind::Raw => self.cursor.read(index, Accessor::Text)?,
            _ => self.cursor.read(index, Accessor::Object)?,
        };
        Ok(value.unwrap_or(SqlValue::Null))
    }

    fn read_chain(
        &mut self,
        index: usize,
        accessors: &[Accessor],
    ) -> Result<Option<SqlValue>, SourceError> {
        let mut last = Ok(None);
        for accessor in accessors {
            match self.cursor.read(index, *accessor) {
                Err(DriverError::Unsupported(_)) => continue,
                other => {
                    last = other;
                    break;
                }
            }
        }
        Ok(last?)
    }

    /// Cap the rows the cursor will produce; shrinks the driver fetch too.
    pub fn set_row_limit(&mut self, limit: u64) {
        if limit > 0 {
            self.cursor.set_max_rows(limit);
            let shrunk = (limit as usize).min(self.fetch_hint).max(200);
            self.cursor.set_fetch_size(shrunk);
        }
    }

    /// Close the cursor. Safe to call more than once.
    pub fn close(&mut self) {
        self.cursor.close();
        self.done = true;
    }

    /// Pull and encode up to `limit` rows (0 = all). Rows are cloned out,
    /// so callers may retain them.
    pub fn fetch_rows(
        &mut self,
        codec: &ValueCodec,
        limit: u64,
    ) -> Result<Vec<Vec<EncodedCell>>, SourceError> {
        let mut rows = Vec::new();
        while limit == 0 || (rows.len() as u64) < limit {
            match self.next_raw()? {
                Some(raw) => rows.push(self.encode_row(codec, &raw)),
                None => break,
            }
        }
        Ok(rows)
    }

    /// Encode a raw row against this stream's descriptors.
    pub fn encode_row(&self, codec: &ValueCodec, raw: &[SqlValue]) -> Vec<EncodedCell> {
        raw.iter()
            .zip(&self.columns)
            .map(|(value, column)| codec.encode(value, column))
            .collect()
    }

    /// Like [`RowStream::fetch_rows`], but through the prefetch queue.
    pub fn fetch_rows_prefetched(
        self,
        codec: &ValueCodec,
        options: PrefetchOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<EncodedCell>>, SourceError> {
        let mut prefetcher = Prefetcher::start(self, options, cancel.clone());
        let mut rows = Vec::new();
        while let Some(raw) = prefetcher.next()? {
            rows.push(prefetcher.encode_row(codec, &raw));
        }
        Ok(rows)
    }
}

/// Prefetch tuning: the queue holds `min(limit*2 + 10, hint*2 + 10)` rows.
#[derive(Debug, Clone, Copy)]
pub struct PrefetchOptions {
    pub fetch_hint: usize,
    /// 0 = unlimited.
    pub row_limit: u64,
}

impl Default for PrefetchOptions {
    fn default() -> Self {
        Self {
            fetch_hint: 30000,
            row_limit: 0,
        }
    }
}

impl PrefetchOptions {
    fn queue_capacity(&self) -> usize {
        let from_hint = self.fetch_hint.saturating_mul(2) + 10;
        if self.row_limit > 0 {
            let from_limit = (self.row_limit as usize).saturating_mul(2) + 10;
            from_hint.min(from_limit)
        } else {
            from_hint
        }
    }
}

/// Background producer over a [`RowStream`]. The consumer drains rows in
/// FIFO order; any producer error is latched and rethrown once the queue is
/// empty, so rows fetched before the failure are still delivered.
pub struct Prefetcher {
    receiver: Option<Receiver<Vec<SqlValue>>>,
    handle: Option<JoinHandle<()>>,
    error: Arc<Mutex<Option<SourceError>>>,
    columns: Vec<ColumnDescriptor>,
}

impl Prefetcher {
    /// Spawn the producer. The stream moves to the background thread; its
    /// descriptors stay readable here for encoding.
    pub fn start(mut stream: RowStream, options: PrefetchOptions, cancel: CancelToken) -> Self {
        stream.set_row_limit(options.row_limit);
        let columns = stream.columns().to_vec();
        let error = Arc::new(Mutex::new(None));
        let latched = error.clone();
        let (tx, rx) = mpsc::sync_channel(options.queue_capacity());

        let handle = std::thread::spawn(move || {
            producer_loop(&mut stream, &tx, &cancel, options.row_limit, &latched);
            stream.close();
        });

        Self {
            receiver: Some(rx),
            handle: Some(handle),
            error,
            columns,
        }
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Next raw row in cursor order. At end of stream, joins the producer
    /// and rethrows its latched error, if any.
    pub fn next(&mut self) -> Result<Option<Vec<SqlValue>>, SourceError> {
        if let Some(rx) = self.receiver.as_ref() {
            if let Ok(row) = rx.recv() {
                return Ok(Some(row));
            }
        }
        self.receiver = None;
        self.join()?;
        match self.error.lock().map(|mut e| e.take()) {
            Ok(Some(e)) => Err(e),
            _ => Ok(None),
        }
    }

    /// Encode a raw row with the stream's descriptors.
    pub fn encode_row(&self, codec: &ValueCodec, raw: &[SqlValue]) -> Vec<EncodedCell> {
        raw.iter()
            .zip(&self.columns)
            .map(|(value, column)| codec.encode(value, column))
            .collect()
    }

    fn join(&mut self) -> Result<(), SourceError> {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return Err(SourceError::ProducerPanicked);
            }
        }
        Ok(())
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.receiver = None;
        let _ = self.join();
    }
}

fn producer_loop(
    stream: &mut RowStream,
    tx: &SyncSender<Vec<SqlValue>>,
    cancel: &CancelToken,
    row_limit: u64,
    latched: &Mutex<Option<SourceError>>,
) {
    let mut produced: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            if let Ok(mut slot) = latched.lock() {
                *slot = Some(SourceError::Aborted);
            }
            return;
        }
        match stream.next_raw() {
            Ok(Some(row)) => {
                produced += 1;
                if tx.send(row).is_err() {
                    // Consumer went away; nothing left to do.
                    return;
                }
                if row_limit > 0 && produced >= row_limit {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                if let Ok(mut slot) = latched.lock() {
                    *slot = Some(e);
                }
                return;
            }
        }
    }
}
