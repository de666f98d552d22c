//! Streaming row ETL between database cursors, delimited files, and tables.
//!
//! Three flows compose from the same primitives:
//!
//! - cursor → delimited file (plain, gzip, or zip), via [`fetch::RowStream`],
//!   [`codec::ValueCodec`], and [`write::DelimitedWriter`]
//! - cursor → INSERT-script file, via [`write::InsertScriptWriter`]
//! - delimited file → table, via [`load::Loader`] and a [`driver`] adapter
//!
//! The database is always behind the [`driver`] trait seam; nothing in the
//! core names a vendor. A DuckDB adapter ships for the CLI and tests.

pub mod codec;
pub mod config;
pub mod csvio;
pub mod driver;
pub mod fetch;
pub mod load;
pub mod sink;
pub mod value;
pub mod write;

pub use codec::ValueCodec;
pub use config::{CodecConfig, LoadOptions, Platform};
pub use fetch::{CancelToken, RowStream};
pub use load::Loader;
pub use sink::FileSink;
pub use value::{ColumnDescriptor, EncodedCell, SqlKind, SqlType, SqlValue};
