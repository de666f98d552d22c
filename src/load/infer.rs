//! DDL generation: sample the file, vote on a type per column, and render a
//! dialect-appropriate CREATE TABLE.

use std::path::Path;

use crate::codec::{numeric::parse_numeric, unescape_newline, ValueCodec};
use crate::config::{CodecConfig, ColumnSizeMode, LoadOptions, Platform};
use crate::csvio::CsvFileReader;
use crate::value::{Numeric, SqlType};

use super::LoadError;

/// Threshold share of sampled values a candidate type must reach.
const VOTE_THRESHOLD: f64 = 0.8;

/// Generate a CREATE TABLE statement from the first `scan_rows` data rows.
pub fn generate_create_table_ddl(
    csv_path: &Path,
    table: &str,
    opts: &LoadOptions,
    platform: Platform,
) -> Result<String, LoadError> {
    if !opts.has_header {
        return Err(LoadError::EmptyHeader);
    }
    let mut reader = CsvFileReader::open(
        csv_path,
        &opts.dialect,
        opts.skip_rows,
        opts.encoding.as_deref(),
    )?;
    let headers = reader
        .read_next()?
        .filter(|r| !r.is_empty())
        .ok_or(LoadError::EmptyHeader)?;

    let mut samples: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    let mut rows_read = 0usize;
    while rows_read < opts.scan_rows {
        let Some(row) = reader.read_next()? else {
            break;
        };
        for (i, field) in row.iter().take(headers.len()).enumerate() {
            let trimmed = field.trim();
            if !trimmed.is_empty() {
                samples[i].push(trimmed.to_string());
            }
        }
        rows_read += 1;
    }

    let mut codec = ValueCodec::with_formats(
        CodecConfig::default(),
        opts.date_format.as_deref(),
        opts.timestamp_format.as_deref(),
        opts.timestamptz_format.as_deref(),
    );

    let mut ddl = format!("CREATE TABLE {} (\n", table);
    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            ddl.push_str(",\n");
        }
        let trimmed = header.trim();
        let mut name = if trimmed.is_empty() {
            format!("COLUMN_{}", i + 1)
        } else {
            trimmed.to_string()
        };
        if let Some(mapped) = opts.column_name_map.get(trimmed) {
            if !mapped.is_empty() {
                name = mapped.clone();
            }
        }

        let elected = detect_column_type(&samples[i], opts.unescape_newline, &mut codec);
        let type_name =
            database_type_name(elected, platform, &samples[i], opts.column_size);
        ddl.push_str(&format!("    {} {}", name, type_name));
    }
    ddl.push_str("\n)");
    Ok(ddl)
}

/// Vote over the candidate parsers; the winner must clear the threshold.
/// Any decimal sighting wins over the integer candidates.
pub fn detect_column_type(
    values: &[String],
    unescape: bool,
    codec: &mut ValueCodec,
) -> SqlType {
    if values.is_empty() {
        return SqlType::Varchar;
    }

    let mut booleans = 0usize;
    let mut integers = 0usize;
    let mut big_ints = 0usize;
    let mut decimals = 0usize;
    let mut dates = 0usize;
    let mut timestamps = 0usize;
    let mut timestamps_tz = 0usize;
    let mut times = 0usize;
    let mut binaries = 0usize;
    let mut total = 0usize;

    for value in values {
        if value.is_empty() {
            continue;
        }
        total += 1;
        if let Some(temporal) = codec.classify_temporal(value) {
            match temporal {
                SqlType::Date => dates += 1,
                SqlType::Timestamp => timestamps += 1,
                SqlType::TimestampTz => timestamps_tz += 1,
                _ => {}
            }
        } else if is_boolean_form(value)
            && (value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false"))
        {
            booleans += 1;
        } else if codec.is_time_value(value) {
            times += 1;
        } else if let Some(num) = parse_numeric(value) {
            match num {
                Numeric::Long(_) | Numeric::BigInt(_) => big_ints += 1,
                Numeric::Decimal(_) | Numeric::Double(_) => decimals += 1,
                _ => integers += 1,
            }
        } else if is_binary_form(&unescape_newline(value, unescape)) {
            binaries += 1;
        }
    }

    if total == 0 {
        return SqlType::Varchar;
    }
    let threshold = (total as f64 * VOTE_THRESHOLD).ceil() as usize;

    if binaries >= threshold {
        return SqlType::VarBinary;
    }
    if timestamps_tz >= threshold {
        return SqlType::TimestampTz;
    }
    if timestamps >= threshold {
        return SqlType::Timestamp;
    }
    if times >= threshold {
        return SqlType::Time;
    }
    if dates >= threshold {
        return SqlType::Date;
    }
    if booleans >= threshold {
        return SqlType::Boolean;
    }
    if decimals > 0 {
        return SqlType::Decimal;
    }
    if big_ints >= threshold {
        return SqlType::BigInt;
    }
    if integers >= threshold {
        return SqlType::Integer;
    }
    SqlType::Varchar
}

fn is_boolean_form(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_uppercase().as_str(),
        "TRUE" | "FALSE" | "1" | "0" | "YES" | "NO" | "Y" | "N"
    )
}

fn is_binary_form(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.contains(' ') || trimmed.len() % 2 != 0 {
        return false;
    }
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Dialect-specific type declaration for an elected type.
fn database_type_name(
    sql_type: SqlType,
    platform: Platform,
    values: &[String],
    mode: ColumnSizeMode,
) -> String {
    let actual = mode == ColumnSizeMode::Actual;
    match sql_type {
        SqlType::Boolean => match platform {
            Platform::Oracle => "NUMBER(1)".to_string(),
            _ => "BOOLEAN".to_string(),
        },
        SqlType::Integer => match platform {
            Platform::Oracle => "NUMBER(10)".to_string(),
            _ => "INTEGER".to_string(),
        },
        SqlType::BigInt => match platform {
            Platform::Oracle => "NUMBER(19)".to_string(),
            _ => "BIGINT".to_string(),
        },
        SqlType::Decimal => {
            let keyword = if platform == Platform::Postgres {
                "NUMERIC"
            } else {
                "DECIMAL"
            };
            if actual {
                let (precision, scale) = decimal_params(values);
                format!("{}({},{})", keyword, precision, scale)
            } else {
                format!("{}(38,10)", keyword)
            }
        }
        SqlType::Date => "DATE".to_string(),
        SqlType::Time => match platform {
            Platform::Oracle => "TIMESTAMP".to_string(),
            _ => "TIME".to_string(),
        },
        SqlType::Timestamp => match platform {
            Platform::MySql => "DATETIME".to_string(),
            _ => "TIMESTAMP".to_string(),
        },
        SqlType::TimestampTz => match platform {
            Platform::MySql => "DATETIME".to_string(),
            Platform::Oracle => "TIMESTAMP WITH TIME ZONE".to_string(),
            _ => "TIMESTAMPTZ".to_string(),
        },
        SqlType::VarBinary => {
            let size = if actual { max_length(values, 4000, 32767) } else { 4000 };
            match platform {
                Platform::Oracle => format!("RAW({})", size),
                _ => format!("VARBINARY({})", size),
            }
        }
        _ => {
            let size = if actual { max_length(values, 255, 4000) } else { 255 };
            match platform {
                Platform::Oracle => format!("VARCHAR2({})", size),
                Platform::SqlServer => format!("NVARCHAR({})", size),
                _ => format!("VARCHAR({})", size),
            }
        }
    }
}

/// Precision and scale from the widest sampled value, floored at the
/// defaults and capped at 38.
fn decimal_params(values: &[String]) -> (usize, usize) {
    let mut precision = 38;
    let mut scale = 10;
    for value in values {
        if value.is_empty() || parse_numeric(value).is_none() {
            continue;
        }
        if let Some((_, frac)) = value.split_once('.') {
            scale = scale.max(frac.len().min(38));
        }
        let digits = value.replace(['.', '-'], "").len();
        precision = precision.max(digits.min(38));
    }
    (precision, scale)
}

fn max_length(values: &[String], default: usize, cap: usize) -> usize {
    let mut max = default;
    for value in values {
        if value.len() > max {
            max = value.len().min(cap);
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::NamedTempFile;

    use super::*;

    fn codec() -> ValueCodec {
        ValueCodec::new(CodecConfig::default())
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn elects_types_over_threshold() {
        let mut c = codec();
        assert_eq!(
            detect_column_type(&strings(&["1", "2", "3"]), true, &mut c),
            SqlType::Integer
        );
        assert_eq!(
            detect_column_type(&strings(&["3000000000", "4000000000"]), true, &mut c),
            SqlType::BigInt
        );
        assert_eq!(
            detect_column_type(&strings(&["1.5", "2", "3"]), true, &mut c),
            SqlType::Decimal
        );
        assert_eq!(
            detect_column_type(
                &strings(&["2024-01-01", "2024-02-02", "2024-03-03"]),
                true,
                &mut c
            ),
            SqlType::Date
        );
        assert_eq!(
            detect_column_type(
                &strings(&[
                    "2024-01-01 10:00:00.5",
                    "2024-02-02 11:00:00.25",
                    "2024-03-03 12:00:00.125"
                ]),
                true,
                &mut c
            ),
            SqlType::Timestamp
        );
        assert_eq!(
            detect_column_type(&strings(&["true", "false", "true"]), true, &mut c),
            SqlType::Boolean
        );
        assert_eq!(
            detect_column_type(&strings(&["DEADBEEF", "0xCAFE", "ABCD"]), true, &mut c),
            SqlType::VarBinary
        );
        assert_eq!(
            detect_column_type(&strings(&["hello", "world", "1"]), true, &mut c),
            SqlType::Varchar
        );
        assert_eq!(detect_column_type(&[], true, &mut c), SqlType::Varchar);
    }

    #[test]
    fn single_decimal_poisons_integer_column() {
        let mut c = codec();
        assert_eq!(
            detect_column_type(&strings(&["1", "2", "3", "4", "5.5"]), true, &mut c),
            SqlType::Decimal
        );
    }

    #[test]
    fn dialect_type_names() {
        let v: Vec<String> = Vec::new();
        assert_eq!(
            database_type_name(SqlType::Integer, Platform::Oracle, &v, ColumnSizeMode::Maximum),
            "NUMBER(10)"
        );
        assert_eq!(
            database_type_name(
                SqlType::Decimal,
                Platform::Postgres,
                &v,
                ColumnSizeMode::Maximum
            ),
            "NUMERIC(38,10)"
        );
        assert_eq!(
            database_type_name(
                SqlType::Timestamp,
                Platform::MySql,
                &v,
                ColumnSizeMode::Maximum
            ),
            "DATETIME"
        );
        assert_eq!(
            database_type_name(
                SqlType::Varchar,
                Platform::SqlServer,
                &v,
                ColumnSizeMode::Maximum
            ),
            "NVARCHAR(255)"
        );
        assert_eq!(
            database_type_name(
                SqlType::VarBinary,
                Platform::Oracle,
                &v,
                ColumnSizeMode::Maximum
            ),
            "RAW(4000)"
        );
    }

    #[test]
    fn actual_sizing_follows_samples() {
        let long = "y".repeat(300);
        let values = strings(&["short", &long]);
        assert_eq!(
            database_type_name(
                SqlType::Varchar,
                Platform::Generic,
                &values,
                ColumnSizeMode::Actual
            ),
            "VARCHAR(300)"
        );
    }

    #[test]
    fn generates_full_ddl() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"id,amount,when,note\n1,10.5,2024-01-02,hello\n2,20.25,2024-02-03,world\n")
            .unwrap();
        f.flush().unwrap();

        let opts = LoadOptions::default();
        let ddl =
            generate_create_table_ddl(f.path(), "t1", &opts, Platform::Postgres).unwrap();
        assert!(ddl.starts_with("CREATE TABLE t1 (\n"));
        assert!(ddl.contains("id INTEGER"));
        assert!(ddl.contains("amount NUMERIC(38,10)"));
        assert!(ddl.contains("when DATE"));
        assert!(ddl.contains("note VARCHAR(255)"));
        assert!(ddl.ends_with("\n)"));
    }
}
