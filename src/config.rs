//! Configuration values threaded through construction.
//!
//! Nothing here is re-read mid-run: the codec, writers, and loader each take
//! their config once and keep it for their lifetime.

use std::collections::HashMap;

use thiserror::Error;

use crate::csvio::CsvDialect;

/// Value codec configuration: trimming and the output patterns used when
/// encoding temporal cells. Patterns are strftime strings.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Trim whitespace from textual encodings.
    pub trim: bool,
    /// Output pattern for `date` columns.
    pub date_format: String,
    /// Output pattern for `timestamp` columns; a trailing `.0` / `.000` is
    /// stripped after formatting.
    pub timestamp_format: String,
    /// Output pattern for `timestamptz` columns, zone specifier included.
    pub timestamptz_format: String,
    /// Convert literal `\n` / `\r` sequences in text cells to control
    /// characters when decoding.
    pub unescape_newline: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            trim: true,
            date_format: "%Y-%m-%d".to_string(),
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            timestamptz_format: "%Y-%m-%d %H:%M:%S%.3f %:z".to_string(),
            unescape_newline: true,
        }
    }
}

/// Database dialect: identifier quoting, placeholder style defaults, and the
/// type names used by DDL generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Oracle,
    MySql,
    Db2,
    SqlServer,
    Postgres,
    Generic,
}

impl Platform {
    /// Parse a platform name; accepts the common aliases, case-insensitive.
    /// `auto`, empty, or unknown names return `None`.
    pub fn parse(name: &str) -> Option<Platform> {
        match name.trim().to_ascii_uppercase().as_str() {
            "ORACLE" => Some(Platform::Oracle),
            "MYSQL" | "MARIADB" => Some(Platform::MySql),
            "DB2" => Some(Platform::Db2),
            "MSSQL" | "SQLSERVER" | "SQL SERVER" | "SYBASE" => Some(Platform::SqlServer),
            "PGSQL" | "POSTGRESQL" | "POSTGRES" => Some(Platform::Postgres),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Oracle => "Oracle",
            Platform::MySql => "MySQL",
            Platform::Db2 => "DB2",
            Platform::SqlServer => "Microsoft SQL Server",
            Platform::Postgres => "PostgreSQL",
            Platform::Generic => "Generic",
        }
    }

    /// Quote an identifier: backticks on MySQL, brackets on SQL Server and
    /// Sybase, double quotes elsewhere.
    pub fn quote_ident(self, name: &str) -> String {
        match self {
            Platform::MySql => format!("`{}`", name),
            Platform::SqlServer => format!("[{}]", name),
            _ => format!("\"{}\"", name),
        }
    }

    /// Truncate statement; Oracle releases storage too.
    pub fn truncate_sql(self, table: &str) -> String {
        match self {
            Platform::Oracle => format!("TRUNCATE TABLE {} DROP STORAGE", table),
            _ => format!("TRUNCATE TABLE {}", table),
        }
    }
}

/// Placeholder style for generated INSERT statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `?` positional placeholders.
    #[default]
    Question,
    /// `:1`, `:2`, … numbered placeholders.
    Numbered,
}

impl PlaceholderStyle {
    pub fn parse(value: &str) -> Option<PlaceholderStyle> {
        match value.trim().to_ascii_uppercase().as_str() {
            "?" | "JDBC" => Some(PlaceholderStyle::Question),
            ":" | "ORACLE" => Some(PlaceholderStyle::Numbered),
            _ => None,
        }
    }
}

/// Dry-run switch: emit generated DDL/DML to the progress logger instead of
/// executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShowMode {
    #[default]
    Off,
    Ddl,
    Dml,
    All,
}

impl ShowMode {
    pub fn parse(value: &str) -> ShowMode {
        match value.trim().to_ascii_uppercase().as_str() {
            "TRUE" | "1" | "YES" | "Y" | "ON" | "ALL" => ShowMode::All,
            "DDL" => ShowMode::Ddl,
            "DML" => ShowMode::Dml,
            _ => ShowMode::Off,
        }
    }

    pub fn shows_ddl(self) -> bool {
        matches!(self, ShowMode::Ddl | ShowMode::All)
    }

    pub fn shows_dml(self) -> bool {
        matches!(self, ShowMode::Dml | ShowMode::All)
    }
}

/// Column sizing mode for DDL generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnSizeMode {
    /// Size columns by the longest sampled value.
    Actual,
    /// Size columns at the dialect maximum.
    #[default]
    Maximum,
}

/// Which CSV columns to drop during load.
#[derive(Debug, Clone, Default)]
pub enum SkipColumns {
    /// Silently drop header columns that match no table column.
    #[default]
    Auto,
    /// Any unmatched column is an error.
    Off,
    /// Drop exactly these columns (stored upper-cased).
    List(Vec<String>),
}

impl SkipColumns {
    pub fn auto_enabled(&self) -> bool {
        matches!(self, SkipColumns::Auto)
    }

    pub fn contains(&self, upper_name: &str) -> bool {
        match self {
            SkipColumns::List(names) => names.iter().any(|n| n == upper_name),
            _ => false,
        }
    }

    fn parse(value: &str) -> Result<SkipColumns, OptionError> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(SkipColumns::Auto);
        }
        if trimmed.eq_ignore_ascii_case("off") {
            return Ok(SkipColumns::Off);
        }
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| OptionError::BadValue {
                option: "SKIP_COLUMNS".into(),
                value: value.into(),
            })?;
        Ok(SkipColumns::List(
            inner
                .split(',')
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .collect(),
        ))
    }
}

#[derive(Debug, Error)]
pub enum OptionError {
    #[error("unknown option: {0}")]
    Unknown(String),
    #[error("invalid value for {option}: {value}")]
    BadValue { option: String, value: String },
}

/// Loader options. Names and string values are case-insensitive when parsed
/// from an option map; see [`LoadOptions::from_pairs`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Rows per batch commit.
    pub batch_rows: usize,
    /// Maximum rows to process; 0 is unlimited.
    pub row_limit: u64,
    /// Per-row error cap; -1 is unlimited.
    pub errors: i64,
    /// Progress cadence in MiB; -1 disables progress reporting.
    pub report_mb: i64,
    /// CSV character policy for the input file and the `.bad` sidecar.
    pub dialect: CsvDialect,
    /// Physical lines skipped before the header.
    pub skip_rows: u64,
    /// Whether the first (post-skip) row is a header.
    pub has_header: bool,
    /// Input charset; `None` means detect.
    pub encoding: Option<String>,
    pub placeholder: PlaceholderStyle,
    pub show: ShowMode,
    /// Generate and execute DDL before loading.
    pub create: bool,
    /// Truncate the target table before loading.
    pub truncate: bool,
    /// Dialect override; `None` means ask the connection.
    pub platform: Option<Platform>,
    /// Rows sampled for DDL type inference.
    pub scan_rows: usize,
    pub column_size: ColumnSizeMode,
    /// Pinned input patterns (strftime); `None` means auto-detect from the
    /// pattern library.
    pub date_format: Option<String>,
    pub timestamp_format: Option<String>,
    pub timestamptz_format: Option<String>,
    /// CSV header name → table column name, matched case-insensitively.
    pub column_name_map: HashMap<String, String>,
    pub unescape_newline: bool,
    pub skip_columns: SkipColumns,
    /// Override for the metadata fetch; must project COLUMN_NAME, DATA_TYPE,
    /// TYPE_NAME, COLUMN_SIZE.
    pub column_info_sql: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_rows: 2048,
            row_limit: 0,
            errors: -1,
            report_mb: 10,
            dialect: CsvDialect::loader_default(),
            skip_rows: 0,
            has_header: true,
            encoding: None,
            placeholder: PlaceholderStyle::Question,
            show: ShowMode::Off,
            create: false,
            truncate: false,
            platform: None,
            scan_rows: 200,
            column_size: ColumnSizeMode::Maximum,
            date_format: None,
            timestamp_format: None,
            timestamptz_format: None,
            column_name_map: HashMap::new(),
            unescape_newline: true,
            skip_columns: SkipColumns::Auto,
            column_info_sql: None,
        }
    }
}

impl LoadOptions {
    /// Progress interval in bytes; `None` when reporting is disabled.
    pub fn progress_interval_bytes(&self) -> Option<u64> {
        if self.report_mb < 0 {
            None
        } else {
            Some(self.report_mb as u64 * 1024 * 1024)
        }
    }

    /// Parse `KEY=VALUE` style pairs. Option names and string values are
    /// case-insensitive; unknown names are rejected.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<LoadOptions, OptionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut opts = LoadOptions::default();
        for (key, value) in pairs {
            opts.apply(key.as_ref(), value.as_ref())?;
        }
        Ok(opts)
    }

    /// Apply a single option by name.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), OptionError> {
        let name = key.trim().to_ascii_uppercase();
        match name.as_str() {
            "BATCH_ROWS" => self.batch_rows = parse_int(&name, value)? as usize,
            "ROW_LIMIT" => self.row_limit = parse_int(&name, value)? as u64,
            "ERRORS" => self.errors = parse_int(&name, value)?,
            "REPORT_MB" => self.report_mb = parse_int(&name, value)?,
            "DELIMITER" => self.dialect.separator = parse_char(&name, value)?,
            "ENCLOSURE" => self.dialect.quote = parse_char(&name, value)?,
            "ESCAPE" => self.dialect.escape = parse_char(&name, value)?,
            "SKIP_ROWS" => self.skip_rows = parse_int(&name, value)? as u64,
            "HAS_HEADER" => self.has_header = parse_bool(value),
            "ENCODING" => {
                let v = value.trim();
                self.encoding = if v.is_empty() || v.eq_ignore_ascii_case("auto") {
                    None
                } else {
                    Some(v.to_string())
                };
            }
            "VARIABLE_FORMAT" => {
                self.placeholder =
                    PlaceholderStyle::parse(value).ok_or_else(|| OptionError::BadValue {
                        option: name.clone(),
                        value: value.into(),
                    })?
            }
            "SHOW" => self.show = ShowMode::parse(value),
            "CREATE" => self.create = parse_bool(value),
            "TRUNCATE" => self.truncate = parse_bool(value),
            "PLATFORM" => self.platform = Platform::parse(value),
            "SCAN_ROWS" => self.scan_rows = parse_int(&name, value)? as usize,
            "COLUMN_SIZE" => {
                self.column_size = if value.trim().eq_ignore_ascii_case("actual") {
                    ColumnSizeMode::Actual
                } else {
                    ColumnSizeMode::Maximum
                }
            }
            "DATE_FORMAT" => self.date_format = parse_auto(value),
            "TIMESTAMP_FORMAT" => self.timestamp_format = parse_auto(value),
            "TIMESTAMPTZ_FORMAT" => self.timestamptz_format = parse_auto(value),
            "MAP_COLUMN_NAMES" => {
                for entry in value.split(',') {
                    if let Some((csv, db)) = entry.split_once('=') {
                        self.column_name_map
                            .insert(csv.trim().to_string(), db.trim().to_string());
                    }
                }
            }
            "UNESCAPE_NEWLINE" => self.unescape_newline = parse_bool(value),
            "SKIP_COLUMNS" => self.skip_columns = SkipColumns::parse(value)?,
            "COLUMN_INFO_SQL" => {
                let v = value.trim();
                self.column_info_sql = (!v.is_empty()).then(|| v.to_string());
            }
            "LOGGER" => {} // progress sink is installed on the Loader itself
            _ => return Err(OptionError::Unknown(key.to_string())),
        }
        Ok(())
    }
}

/// Boolean-ish option values: TRUE/1/YES/Y/ON are true, everything else is
/// false.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_uppercase().as_str(),
        "TRUE" | "1" | "YES" | "Y" | "ON"
    )
}

fn parse_int(option: &str, value: &str) -> Result<i64, OptionError> {
    value.trim().parse().map_err(|_| OptionError::BadValue {
        option: option.to_string(),
        value: value.to_string(),
    })
}

fn parse_char(option: &str, value: &str) -> Result<char, OptionError> {
    value.chars().next().ok_or_else(|| OptionError::BadValue {
        option: option.to_string(),
        value: value.to_string(),
    })
}

fn parse_auto(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("auto") {
        None
    } else {
        Some(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = LoadOptions::default();
        assert_eq!(opts.batch_rows, 2048);
        assert_eq!(opts.errors, -1);
        assert_eq!(opts.report_mb, 10);
        assert!(opts.has_header);
        assert!(opts.unescape_newline);
        assert_eq!(opts.scan_rows, 200);
        assert_eq!(opts.progress_interval_bytes(), Some(10 * 1024 * 1024));
    }

    #[test]
    fn option_names_are_case_insensitive() {
        let opts = LoadOptions::from_pairs(vec![
            ("batch_rows", "16"),
            ("Show", "ddl"),
            ("PLATFORM", "pgsql"),
            ("skip_columns", "(a, b)"),
            ("variable_format", ":"),
        ])
        .unwrap();
        assert_eq!(opts.batch_rows, 16);
        assert_eq!(opts.show, ShowMode::Ddl);
        assert_eq!(opts.platform, Some(Platform::Postgres));
        assert!(opts.skip_columns.contains("A"));
        assert_eq!(opts.placeholder, PlaceholderStyle::Numbered);
    }

    #[test]
    fn report_mb_negative_disables_progress() {
        let opts = LoadOptions::from_pairs(vec![("REPORT_MB", "-1")]).unwrap();
        assert_eq!(opts.progress_interval_bytes(), None);
    }

    #[test]
    fn unknown_option_is_rejected() {
        assert!(LoadOptions::from_pairs(vec![("NOPE", "1")]).is_err());
    }

    #[test]
    fn identifier_quoting_per_platform() {
        assert_eq!(Platform::MySql.quote_ident("c"), "`c`");
        assert_eq!(Platform::SqlServer.quote_ident("c"), "[c]");
        assert_eq!(Platform::Oracle.quote_ident("c"), "\"c\"");
        assert_eq!(
            Platform::Oracle.truncate_sql("t"),
            "TRUNCATE TABLE t DROP STORAGE"
        );
    }
}
