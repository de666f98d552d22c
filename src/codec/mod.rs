//! Bidirectional conversion between typed cell values and text.
//!
//! [`ValueCodec`] owns the codec configuration and the temporal format
//! caches. Encoding (typed → text) is driven by the column's [`SqlKind`];
//! decoding (text → typed parameter) by the target column's [`SqlType`].

pub mod binary;
pub mod decode;
pub mod encode;
pub mod numeric;
pub mod temporal;

use std::borrow::Cow;

use crate::config::CodecConfig;
use crate::value::SqlType;
use temporal::{DateTimeCache, TemporalParts, TimeCache};

pub use decode::DecodeError;
pub use numeric::parse_numeric;

/// Value codec: pure conversion rules plus the temporal caches that warm up
/// over a run. Create one per flow and keep it for the flow's lifetime.
pub struct ValueCodec {
    config: CodecConfig,
    datetime: DateTimeCache,
    time: TimeCache,
}

impl ValueCodec {
    /// Codec with the full auto-detection pattern library.
    pub fn new(config: CodecConfig) -> Self {
        Self {
            config,
            datetime: DateTimeCache::library(),
            time: TimeCache::library(),
        }
    }

    /// Codec with pinned input formats; any `None` slot falls back to the
    /// library.
    pub fn with_formats(
        config: CodecConfig,
        date: Option<&str>,
        timestamp: Option<&str>,
        timestamptz: Option<&str>,
    ) -> Self {
        Self {
            config,
            datetime: DateTimeCache::from_formats(date, timestamp, timestamptz),
            time: TimeCache::library(),
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Swap live temporal maps for their runtime caches when warmed up.
    /// Safe to call between rows; cheap when nothing is due.
    pub fn compact_caches(&mut self) {
        self.datetime.compact_if_due();
        self.time.compact_if_due();
    }

    /// Live date-time pattern count, visible for cache behaviour checks.
    pub fn datetime_pattern_count(&self) -> usize {
        self.datetime.len()
    }

    /// Classify a sample value for type inference: date, timestamp, or
    /// timestamp-with-zone, per the first matching library pattern.
    pub fn classify_temporal(&mut self, input: &str) -> Option<SqlType> {
        match self.datetime.parse(input)? {
            TemporalParts::Date(_) => Some(SqlType::Date),
            TemporalParts::Zoned(_) => Some(SqlType::TimestampTz),
            TemporalParts::DateTime(ndt) => {
                use chrono::Timelike;
                if ndt.nanosecond() != 0 {
                    Some(SqlType::Timestamp)
                } else {
                    Some(SqlType::Date)
                }
            }
        }
    }

    /// True when a sample value parses as a time-of-day.
    pub fn is_time_value(&mut self, input: &str) -> bool {
        self.time.parse(input).is_some()
    }
}

/// Convert literal `\n` / `\r` escape sequences into control characters.
pub fn unescape_newline(value: &str, enabled: bool) -> Cow<'_, str> {
    if enabled && (value.contains("\\n") || value.contains("\\r")) {
        Cow::Owned(value.replace("\\n", "\n").replace("\\r", "\r"))
    } else {
        Cow::Borrowed(value)
    }
}

/// Lenient boolean forms: TRUE/1/YES/Y and FALSE/0/NO/N, case-insensitive,
/// with a strict `true`/`false` parse as the fallback.
pub fn parse_boolean(value: &str) -> bool {
    match value.trim().to_ascii_uppercase().as_str() {
        "TRUE" | "1" | "YES" | "Y" => true,
        "FALSE" | "0" | "NO" | "N" => false,
        other => other.to_ascii_lowercase().parse().unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_only_when_enabled() {
        assert_eq!(unescape_newline("a\\nb", true), "a\nb");
        assert_eq!(unescape_newline("a\\nb", false), "a\\nb");
        assert_eq!(unescape_newline("plain", true), "plain");
    }

    #[test]
    fn boolean_forms() {
        assert!(parse_boolean("TRUE"));
        assert!(parse_boolean("y"));
        assert!(parse_boolean("1"));
        assert!(!parse_boolean("0"));
        assert!(!parse_boolean("no"));
        assert!(!parse_boolean("maybe"));
        assert!(parse_boolean(" True "));
    }

    #[test]
    fn temporal_classification() {
        let mut codec = ValueCodec::new(CodecConfig::default());
        assert_eq!(codec.classify_temporal("2024-01-02"), Some(SqlType::Date));
        assert_eq!(
            codec.classify_temporal("2024-01-02 03:04:05.123"),
            Some(SqlType::Timestamp)
        );
        assert_eq!(
            codec.classify_temporal("2024-01-02 03:04:05+01:00"),
            Some(SqlType::TimestampTz)
        );
        // Second-precision values resolve as dates, not timestamps.
        assert_eq!(
            codec.classify_temporal("2024-01-02 03:04:05"),
            Some(SqlType::Date)
        );
        assert_eq!(codec.classify_temporal("n/a"), None);
        assert!(codec.is_time_value("12:30:00"));
        assert!(!codec.is_time_value("2024-01-02"));
    }
}
