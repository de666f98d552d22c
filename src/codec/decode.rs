//! Decoding of text fields into typed statement parameters.

use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::offset::LocalResult;
use chrono::{FixedOffset, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use num_bigint::BigInt;
use thiserror::Error;

use crate::codec::binary::parse_binary;
use crate::codec::numeric::parse_numeric;
use crate::codec::temporal::{TemporalParts, TimeParts};
use crate::codec::{parse_boolean, unescape_newline};
use crate::value::{Numeric, SqlType, SqlValue};

use super::ValueCodec;

/// A value failed to decode for its target column. Per-row recoverable.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid numeric value: {0}")]
    InvalidNumeric(String),
    #[error("Invalid date format: {0}")]
    InvalidDate(String),
    #[error("Unable to parse time value: {0}")]
    InvalidTime(String),
    #[error("Unable to parse time with timezone value: {0}")]
    InvalidTimeTz(String),
    #[error("Unable to parse timestamp value: {0}")]
    InvalidTimestamp(String),
    #[error("Unable to parse timestamp with timezone value: {0}")]
    InvalidTimestampTz(String),
    #[error("Invalid binary data: {0}")]
    InvalidBinary(String),
}

impl ValueCodec {
    /// Decode one field for the target column type. Empty and all-blank
    /// inputs bind NULL.
    pub fn decode(&mut self, input: &str, target: SqlType) -> Result<SqlValue, DecodeError> {
        if input.is_empty() {
            return Ok(SqlValue::Null);
        }

        if target.is_character() {
            let trimmed = input.trim();
            if trimmed.is_empty() {
                return Ok(SqlValue::Null);
            }
            return Ok(SqlValue::Text(
                unescape_newline(trimmed, self.config.unescape_newline).into_owned(),
            ));
        }

        if input.trim().is_empty() {
            return Ok(SqlValue::Null);
        }

        match target {
            SqlType::BigInt => match parse_numeric(input) {
                Some(Numeric::BigInt(b)) => Ok(SqlValue::Decimal(BigDecimal::from(b))),
                Some(n) if n.is_integral() => Ok(SqlValue::Long(integral_as_i64(&n))),
                _ => Err(DecodeError::InvalidNumeric(input.to_string())),
            },
            SqlType::Integer => match parse_numeric(input) {
                Some(Numeric::Byte(v)) => Ok(SqlValue::Int(v as i32)),
                Some(Numeric::Short(v)) => Ok(SqlValue::Int(v as i32)),
                Some(Numeric::Int(v)) => Ok(SqlValue::Int(v)),
                _ => Err(DecodeError::InvalidNumeric(input.to_string())),
            },
            SqlType::SmallInt => match parse_numeric(input) {
                Some(Numeric::Byte(v)) => Ok(SqlValue::Int(v as i32)),
                Some(Numeric::Short(v)) => Ok(SqlValue::Int(v as i32)),
                _ => Err(DecodeError::InvalidNumeric(input.to_string())),
            },
            SqlType::TinyInt => match parse_numeric(input) {
                Some(Numeric::Byte(v)) => Ok(SqlValue::Int(v as i32)),
                _ => Err(DecodeError::InvalidNumeric(input.to_string())),
            },
            SqlType::Decimal | SqlType::Numeric => match parse_numeric(input) {
                Some(Numeric::Decimal(d)) => Ok(SqlValue::Decimal(d)),
                Some(_) => BigDecimal::from_str(input.trim())
                    .map(SqlValue::Decimal)
                    .map_err(|_| DecodeError::InvalidNumeric(input.to_string())),
                None => Err(DecodeError::InvalidNumeric(input.to_string())),
            },
            SqlType::Double => match parse_numeric(input) {
                Some(Numeric::BigInt(b)) => {
                    let dv = b.to_f64().unwrap_or(f64::INFINITY);
                    if dv.is_finite() && BigInt::from(dv as i64) == b {
                        Ok(SqlValue::Double(dv))
                    } else {
                        Err(DecodeError::InvalidNumeric(input.to_string()))
                    }
                }
                Some(Numeric::Double(d)) => Ok(SqlValue::Double(d)),
                Some(n) if n.is_integral() => Ok(SqlValue::Double(integral_as_i64(&n) as f64)),
                _ => Err(DecodeError::InvalidNumeric(input.to_string())),
            },
            SqlType::Float | SqlType::Real => match parse_numeric(input) {
                Some(Numeric::BigInt(b)) => {
                    let fv = b.to_f32().unwrap_or(f32::INFINITY);
                    if fv.is_finite() && BigInt::from(fv as i64) == b {
                        Ok(SqlValue::Float(fv))
                    } else {
                        Err(DecodeError::InvalidNumeric(input.to_string()))
                    }
                }
                Some(Numeric::Double(d)) => Ok(SqlValue::Float(d as f32)),
                Some(n) if n.is_integral() => Ok(SqlValue::Float(integral_as_i64(&n) as f32)),
                _ => Err(DecodeError::InvalidNumeric(input.to_string())),
            },
            SqlType::Date => match self.datetime.parse(input) {
                Some(parts) => Ok(SqlValue::Date(local_parts(parts).date())),
                None => Err(DecodeError::InvalidDate(input.to_string())),
            },
            SqlType::Timestamp => match self.datetime.parse(input) {
                Some(parts) => Ok(SqlValue::Timestamp(local_parts(parts))),
                None => Err(DecodeError::InvalidTimestamp(input.to_string())),
            },
            SqlType::TimestampTz => match self.datetime.parse(input) {
                Some(TemporalParts::Zoned(dt)) => Ok(SqlValue::TimestampTz(dt)),
                Some(TemporalParts::DateTime(ndt)) => {
                    Ok(SqlValue::TimestampTz(attach_local_offset(&ndt)))
                }
                Some(TemporalParts::Date(d)) => Ok(SqlValue::TimestampTz(attach_local_offset(
                    &d.and_time(NaiveTime::MIN),
                ))),
                None => Err(DecodeError::InvalidTimestampTz(input.to_string())),
            },
            SqlType::Time => match self.time.parse(input) {
                Some(TimeParts::Local(t)) => Ok(SqlValue::Time(t)),
                Some(TimeParts::Offset(t, _)) => Ok(SqlValue::Time(t)),
                None => Err(DecodeError::InvalidTime(input.to_string())),
            },
            SqlType::TimeTz => match self.time.parse(input) {
                Some(TimeParts::Offset(t, off)) => Ok(SqlValue::TimeTz(t, off)),
                Some(TimeParts::Local(t)) => Ok(SqlValue::TimeTz(t, Utc.fix())),
                None => Err(DecodeError::InvalidTimeTz(input.to_string())),
            },
            SqlType::Boolean | SqlType::Bit => Ok(SqlValue::Boolean(parse_boolean(input))),
            SqlType::Binary | SqlType::VarBinary | SqlType::LongVarBinary | SqlType::Blob => {
                let unescaped = unescape_newline(input, self.config.unescape_newline);
                match parse_binary(&unescaped) {
                    Some(bytes) => Ok(SqlValue::Bytes(bytes)),
                    None => Err(DecodeError::InvalidBinary(input.to_string())),
                }
            }
            SqlType::Clob | SqlType::Xml | SqlType::Json | SqlType::Vector => {
                Ok(SqlValue::Text(
                    unescape_newline(input, self.config.unescape_newline).into_owned(),
                ))
            }
            _ => Ok(SqlValue::Text(input.to_string())),
        }
    }
}

fn integral_as_i64(n: &Numeric) -> i64 {
    match n {
        Numeric::Byte(v) => *v as i64,
        Numeric::Short(v) => *v as i64,
        Numeric::Int(v) => *v as i64,
        Numeric::Long(v) => *v,
        _ => 0,
    }
}

/// Promotion ladder: zoned values contribute their local wall-clock parts,
/// plain values pass through, dates start at midnight.
fn local_parts(parts: TemporalParts) -> NaiveDateTime {
    match parts {
        TemporalParts::Zoned(dt) => dt.naive_local(),
        TemporalParts::DateTime(ndt) => ndt,
        TemporalParts::Date(d) => d.and_time(NaiveTime::MIN),
    }
}

fn attach_local_offset(ndt: &NaiveDateTime) -> chrono::DateTime<FixedOffset> {
    let offset = match chrono::Local.offset_from_local_datetime(ndt) {
        LocalResult::Single(o) | LocalResult::Ambiguous(o, _) => o.fix(),
        LocalResult::None => Utc.fix(),
    };
    match offset.from_local_datetime(ndt) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
        LocalResult::None => Utc.fix().from_utc_datetime(ndt),
    }
}
