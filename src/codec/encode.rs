//! Encoding of raw typed cells into text or pass-through primitives.

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::offset::LocalResult;
use chrono::{FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};

use crate::codec::binary::to_upper_hex;
use crate::codec::numeric::double_round_trips;
use crate::value::{ColumnDescriptor, EncodedCell, SqlKind, SqlValue};

use super::ValueCodec;

impl ValueCodec {
    /// Encode one cell for the column it came from. A null cell encodes as
    /// the null sentinel regardless of kind.
    pub fn encode(&self, value: &SqlValue, column: &ColumnDescriptor) -> EncodedCell {
        if value.is_null() {
            return EncodedCell::Null;
        }

        let cell = match column.kind {
            SqlKind::Boolean => match value {
                SqlValue::Boolean(b) => EncodedCell::Bool(*b),
                other => EncodedCell::Text(display_value(other)),
            },
            SqlKind::Int => match to_i32(value) {
                Some(i) => EncodedCell::Int(i),
                None => EncodedCell::Text(display_value(value)),
            },
            SqlKind::Long | SqlKind::Double => self.encode_numeric(value),
            SqlKind::Date => match value {
                SqlValue::Date(d) => {
                    EncodedCell::Text(d.format(&self.config.date_format).to_string())
                }
                SqlValue::Timestamp(ts) => {
                    EncodedCell::Text(ts.format(&self.config.date_format).to_string())
                }
                other => EncodedCell::Text(display_value(other)),
            },
            SqlKind::Time => match value {
                SqlValue::Time(t) => EncodedCell::Text(t.format("%H:%M:%S").to_string()),
                other => EncodedCell::Text(display_value(other)),
            },
            SqlKind::Timestamp => {
                let text = match value {
                    SqlValue::Timestamp(ts) => self.format_timestamp(ts),
                    SqlValue::Date(d) => {
                        self.format_timestamp(&d.and_time(chrono::NaiveTime::MIN))
                    }
                    other => display_value(other),
                };
                EncodedCell::Text(apply_driver_date_quirk(text, column))
            }
            SqlKind::TimestampTz => {
                let text = match value {
                    SqlValue::TimestampTz(dt) => {
                        dt.format(&self.config.timestamptz_format).to_string()
                    }
                    SqlValue::Timestamp(ts) => local_zoned(ts)
                        .format(&self.config.timestamptz_format)
                        .to_string(),
                    other => display_value(other),
                };
                EncodedCell::Text(text)
            }
            SqlKind::Raw | SqlKind::Blob => match value {
                SqlValue::Bytes(b) => EncodedCell::Text(to_upper_hex(b)),
                SqlValue::Text(s) => EncodedCell::Text(s.clone()),
                other => EncodedCell::Text(display_value(other)),
            },
            SqlKind::Array | SqlKind::Struct => {
                EncodedCell::Text(self.render_composite(value, 0))
            }
            SqlKind::Vector => match value {
                SqlValue::Vector(v) => EncodedCell::Text(render_vector(v)),
                other => EncodedCell::Text(display_value(other)),
            },
            SqlKind::Object
            | SqlKind::Clob
            | SqlKind::Xml
            | SqlKind::Json
            | SqlKind::String => EncodedCell::Text(display_value(value)),
        };

        if self.config.trim {
            match cell {
                EncodedCell::Text(s) => EncodedCell::Text(s.trim().to_string()),
                other => other,
            }
        } else {
            cell
        }
    }

    /// Numeric normalisation: the smallest representation whose decimal
    /// rendering round-trips wins — integer, then double, then the decimal's
    /// own canonical string.
    fn encode_numeric(&self, value: &SqlValue) -> EncodedCell {
        match value {
            SqlValue::Int(i) => EncodedCell::Long(*i as i64),
            SqlValue::Long(l) => EncodedCell::Long(*l),
            SqlValue::Double(d) => EncodedCell::Double(*d),
            SqlValue::Float(f) => EncodedCell::Double(
                f.to_string().parse().unwrap_or(f64::from(*f)),
            ),
            SqlValue::BigInt(b) => match b.to_i64() {
                Some(l) => EncodedCell::Long(l),
                None => EncodedCell::Text(b.to_string()),
            },
            SqlValue::Decimal(d) => encode_decimal(d),
            other => EncodedCell::Text(display_value(other)),
        }
    }

    fn format_timestamp(&self, ts: &NaiveDateTime) -> String {
        let mut text = ts.format(&self.config.timestamp_format).to_string();
        if let Some(stripped) = text
            .strip_suffix(".000")
            .or_else(|| text.strip_suffix(".0"))
        {
            text = stripped.to_string();
        }
        text
    }

    /// Pretty printer for nested array and struct cells: arrays render as
    /// `{e1,e2}`, structs as `Name(e1,e2)`; nested composites start on a new
    /// line indented two spaces per level.
    fn render_composite(&self, value: &SqlValue, level: usize) -> String {
        match value {
            SqlValue::Array(elements) => {
                format!("{{{}}}", self.render_elements(elements, level))
            }
            SqlValue::Struct { type_name, fields } => {
                format!("{}({})", type_name, self.render_elements(fields, level))
            }
            other => self.render_scalar(other),
        }
    }

    fn render_elements(&self, elements: &[SqlValue], level: usize) -> String {
        let mut out = String::new();
        for (i, element) in elements.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            match element {
                SqlValue::Array(_) | SqlValue::Struct { .. } => {
                    out.push('\n');
                    out.push_str(&"  ".repeat(level + 1));
                    out.push_str(&self.render_composite(element, level + 1));
                }
                other => out.push_str(&self.render_scalar(other)),
            }
        }
        out
    }

    fn render_scalar(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "null".to_string(),
            SqlValue::Boolean(b) => b.to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Long(l) => l.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Double(d) => d.to_string(),
            SqlValue::BigInt(b) => b.to_string(),
            SqlValue::Decimal(d) => match encode_decimal(d) {
                EncodedCell::Long(l) => l.to_string(),
                EncodedCell::Double(v) => v.to_string(),
                EncodedCell::Text(s) => s,
                _ => d.normalized().to_string(),
            },
            SqlValue::Date(d) => {
                format!("'{}'", d.format(&self.config.date_format))
            }
            SqlValue::Timestamp(ts) => format!("'{}'", self.format_timestamp(ts)),
            SqlValue::TimestampTz(dt) => {
                format!("'{}'", dt.format(&self.config.timestamptz_format))
            }
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            other => display_value(other),
        }
    }
}

/// Cut the fractional suffix off timestamps coming from drivers that report
/// plain dates through the timestamp accessor. The cut lands one character
/// before the dot, as the reference behaviour does.
fn apply_driver_date_quirk(text: String, column: &ColumnDescriptor) -> String {
    let is_driver_date = column
        .vendor_class
        .as_deref()
        .is_some_and(|c| c.starts_with("oracle.sql.DATE"));
    if !is_driver_date {
        return text;
    }
    match text.rfind('.') {
        Some(pos) if pos > 0 => text[..pos - 1].to_string(),
        _ => text,
    }
}

fn encode_decimal(d: &BigDecimal) -> EncodedCell {
    if d.is_integer() {
        let (int, _) = d.with_scale(0).as_bigint_and_exponent();
        return match int.to_i64() {
            Some(l) => EncodedCell::Long(l),
            None => EncodedCell::Text(int.to_string()),
        };
    }
    if let Some(dv) = d.to_f64() {
        if dv.is_finite() && double_round_trips(dv, d) {
            return EncodedCell::Double(dv);
        }
    }
    EncodedCell::Text(d.normalized().to_string())
}

fn to_i32(value: &SqlValue) -> Option<i32> {
    match value {
        SqlValue::Int(i) => Some(*i),
        SqlValue::Long(l) => Some(*l as i32),
        SqlValue::Float(f) => Some(*f as i32),
        SqlValue::Double(d) => Some(*d as i32),
        SqlValue::Decimal(d) => d.to_i32(),
        SqlValue::BigInt(b) => b.to_i32(),
        SqlValue::Boolean(b) => Some(*b as i32),
        _ => None,
    }
}

fn local_zoned(ts: &NaiveDateTime) -> chrono::DateTime<FixedOffset> {
    let offset = match chrono::Local.offset_from_local_datetime(ts) {
        LocalResult::Single(o) | LocalResult::Ambiguous(o, _) => o.fix(),
        LocalResult::None => Utc.fix(),
    };
    match offset.from_local_datetime(ts) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
        LocalResult::None => Utc.fix().from_utc_datetime(ts),
    }
}

fn display_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Boolean(b) => b.to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Long(l) => l.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Double(d) => d.to_string(),
        SqlValue::Decimal(d) => d.normalized().to_string(),
        SqlValue::BigInt(b) => b.to_string(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Bytes(b) => to_upper_hex(b),
        SqlValue::Date(d) => d.to_string(),
        SqlValue::Time(t) => t.to_string(),
        SqlValue::TimeTz(t, off) => format!("{}{}", t, off),
        SqlValue::Timestamp(ts) => ts.to_string(),
        SqlValue::TimestampTz(dt) => dt.to_rfc3339(),
        SqlValue::Array(_) | SqlValue::Struct { .. } => format!("{:?}", value),
        SqlValue::Vector(v) => render_vector(v),
    }
}

fn render_vector(values: &[f64]) -> String {
    let mut out = String::from("[");
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
            if i % 4 == 0 {
                out.push('\n');
            }
        }
        out.push_str(&v.to_string());
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{NaiveDate, Timelike};

    use super::*;
    use crate::config::CodecConfig;

    fn column(kind: SqlKind) -> ColumnDescriptor {
        ColumnDescriptor {
            index: 0,
            name: "C".to_string(),
            kind,
            vendor_code: 0,
            vendor_class: None,
            size: 0,
        }
    }

    fn codec() -> ValueCodec {
        ValueCodec::new(CodecConfig::default())
    }

    #[test]
    fn null_is_null_for_every_kind() {
        let codec = codec();
        for kind in [
            SqlKind::Boolean,
            SqlKind::Int,
            SqlKind::Double,
            SqlKind::Timestamp,
            SqlKind::Blob,
            SqlKind::String,
        ] {
            assert_eq!(codec.encode(&SqlValue::Null, &column(kind)), EncodedCell::Null);
        }
    }

    #[test]
    fn numeric_normalisation_prefers_smallest_form() {
        let codec = codec();
        let col = column(SqlKind::Double);
        assert_eq!(
            codec.encode(&SqlValue::Decimal(BigDecimal::from_str("42.000").unwrap()), &col),
            EncodedCell::Long(42)
        );
        assert_eq!(
            codec.encode(&SqlValue::Decimal(BigDecimal::from_str("3.14").unwrap()), &col),
            EncodedCell::Double(3.14)
        );
        let exact = "0.123456789012345678901234567890";
        assert_eq!(
            codec.encode(&SqlValue::Decimal(BigDecimal::from_str(exact).unwrap()), &col),
            EncodedCell::Text(exact.trim_end_matches('0').to_string())
        );
    }

    #[test]
    fn timestamps_strip_zero_fractions() {
        let codec = codec();
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(
            codec.encode(&SqlValue::Timestamp(ts), &column(SqlKind::Timestamp)),
            EncodedCell::Text("2024-01-02 03:04:05".to_string())
        );
        let with_millis = ts.with_nanosecond(120_000_000).unwrap();
        assert_eq!(
            codec.encode(&SqlValue::Timestamp(with_millis), &column(SqlKind::Timestamp)),
            EncodedCell::Text("2024-01-02 03:04:05.120".to_string())
        );
    }

    #[test]
    fn driver_date_quirk_cuts_before_the_dot() {
        let codec = codec();
        let mut col = column(SqlKind::Timestamp);
        col.vendor_class = Some("oracle.sql.DATE".to_string());
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap()
            .with_nanosecond(120_000_000)
            .unwrap();
        // "…03:04:05.120" loses ".120" and the character before the dot.
        assert_eq!(
            codec.encode(&SqlValue::Timestamp(ts), &col),
            EncodedCell::Text("2024-01-02 03:04:0".to_string())
        );
    }

    #[test]
    fn raw_and_blob_are_upper_hex() {
        let codec = codec();
        assert_eq!(
            codec.encode(&SqlValue::Bytes(vec![0xAB, 0x01]), &column(SqlKind::Raw)),
            EncodedCell::Text("AB01".to_string())
        );
    }

    #[test]
    fn composite_rendering() {
        let codec = codec();
        let array = SqlValue::Array(vec![
            SqlValue::Long(1),
            SqlValue::Text("o'brien".to_string()),
            SqlValue::Null,
        ]);
        assert_eq!(
            codec.encode(&array, &column(SqlKind::Array)),
            EncodedCell::Text("{1,'o''brien',null}".to_string())
        );

        let nested = SqlValue::Struct {
            type_name: "POINT".to_string(),
            fields: vec![
                SqlValue::Double(1.5),
                SqlValue::Array(vec![SqlValue::Long(2), SqlValue::Long(3)]),
            ],
        };
        assert_eq!(
            codec.encode(&nested, &column(SqlKind::Struct)),
            EncodedCell::Text("POINT(1.5,\n  {2,3})".to_string())
        );
    }

    #[test]
    fn vector_breaks_line_every_four() {
        let codec = codec();
        let v = SqlValue::Vector(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(
            codec.encode(&v, &column(SqlKind::Vector)),
            EncodedCell::Text("[1,2,3,4,\n5,6]".to_string())
        );
    }

    #[test]
    fn trim_applies_to_text_output() {
        let codec = codec();
        assert_eq!(
            codec.encode(
                &SqlValue::Text("  padded  ".to_string()),
                &column(SqlKind::String)
            ),
            EncodedCell::Text("padded".to_string())
        );
        let untrimmed = ValueCodec::new(CodecConfig {
            trim: false,
            ..CodecConfig::default()
        });
        assert_eq!(
            untrimmed.encode(
                &SqlValue::Text("  padded  ".to_string()),
                &column(SqlKind::String)
            ),
            EncodedCell::Text("  padded  ".to_string())
        );
    }

    #[test]
    fn int_kind_coerces_via_numeric_accessor() {
        let codec = codec();
        assert_eq!(
            codec.encode(&SqlValue::Double(7.9), &column(SqlKind::Int)),
            EncodedCell::Int(7)
        );
        assert_eq!(
            codec.encode(&SqlValue::Long(12), &column(SqlKind::Int)),
            EncodedCell::Int(12)
        );
    }
}
