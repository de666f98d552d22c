//! Typed cell values and column metadata shared by every flow.
//!
//! A cursor produces raw [`SqlValue`] cells tagged by [`SqlKind`]; the codec
//! turns them into [`EncodedCell`]s for text output, or parses text back into
//! `SqlValue` parameters targeted at a [`SqlType`] column.

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use num_bigint::BigInt;

/// Semantic column tag, derived once from the vendor type code at cursor
/// open. Closed set; anything unrecognised lands on `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlKind {
    Object,
    Boolean,
    Int,
    Long,
    Double,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Raw,
    Blob,
    Clob,
    Xml,
    Array,
    Struct,
    Json,
    Vector,
    String,
}

impl SqlKind {
    /// Stable lower-case name, used in control sidecars and log lines.
    pub fn name(self) -> &'static str {
        match self {
            SqlKind::Object => "object",
            SqlKind::Boolean => "boolean",
            SqlKind::Int => "int",
            SqlKind::Long => "long",
            SqlKind::Double => "double",
            SqlKind::Date => "date",
            SqlKind::Time => "time",
            SqlKind::Timestamp => "timestamp",
            SqlKind::TimestampTz => "timestamptz",
            SqlKind::Raw => "raw",
            SqlKind::Blob => "blob",
            SqlKind::Clob => "clob",
            SqlKind::Xml => "xml",
            SqlKind::Array => "array",
            SqlKind::Struct => "struct",
            SqlKind::Json => "json",
            SqlKind::Vector => "vector",
            SqlKind::String => "string",
        }
    }

    /// True for tags whose encoded form is numeric or boolean, which the
    /// INSERT-script writer emits unquoted.
    pub fn is_unquoted(self) -> bool {
        matches!(
            self,
            SqlKind::Boolean | SqlKind::Int | SqlKind::Long | SqlKind::Double
        )
    }
}

/// Target column type used when binding parsed text into a prepared
/// statement, resolved from table metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Char,
    Varchar,
    LongVarchar,
    NChar,
    NVarchar,
    Clob,
    Xml,
    Json,
    Vector,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Numeric,
    Double,
    Float,
    Real,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Boolean,
    Bit,
    Binary,
    VarBinary,
    LongVarBinary,
    Blob,
    Other,
}

impl SqlType {
    /// Character-like targets bind trimmed text and treat an all-blank input
    /// as NULL.
    pub fn is_character(self) -> bool {
        matches!(
            self,
            SqlType::Char
                | SqlType::Varchar
                | SqlType::LongVarchar
                | SqlType::NChar
                | SqlType::NVarchar
        )
    }

    /// Map a database type name (as reported by metadata) onto a target
    /// type. Matching is case-insensitive and ignores any `(p,s)` suffix.
    pub fn from_type_name(name: &str) -> SqlType {
        let upper = name.trim().to_ascii_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "CHAR" | "CHARACTER" | "BPCHAR" => SqlType::Char,
            "VARCHAR" | "VARCHAR2" | "CHARACTER VARYING" | "STRING" | "TEXT" => SqlType::Varchar,
            "LONG VARCHAR" | "LONGTEXT" | "MEDIUMTEXT" => SqlType::LongVarchar,
            "NCHAR" => SqlType::NChar,
            "NVARCHAR" | "NVARCHAR2" => SqlType::NVarchar,
            "CLOB" | "NCLOB" => SqlType::Clob,
            "XML" | "XMLTYPE" | "SQLXML" => SqlType::Xml,
            "JSON" | "JSONB" => SqlType::Json,
            "VECTOR" => SqlType::Vector,
            "TINYINT" | "UTINYINT" => SqlType::TinyInt,
            "SMALLINT" | "INT2" | "USMALLINT" => SqlType::SmallInt,
            "INTEGER" | "INT" | "INT4" | "UINTEGER" | "MEDIUMINT" => SqlType::Integer,
            "BIGINT" | "INT8" | "UBIGINT" | "HUGEINT" => SqlType::BigInt,
            "DECIMAL" => SqlType::Decimal,
            "NUMERIC" | "NUMBER" => SqlType::Numeric,
            "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" => SqlType::Double,
            "FLOAT" => SqlType::Float,
            "REAL" | "FLOAT4" => SqlType::Real,
            "DATE" => SqlType::Date,
            "TIME" => SqlType::Time,
            "TIME WITH TIME ZONE" | "TIMETZ" => SqlType::TimeTz,
            "TIMESTAMP" | "DATETIME" | "TIMESTAMP WITHOUT TIME ZONE" => SqlType::Timestamp,
            "TIMESTAMP WITH TIME ZONE" | "TIMESTAMPTZ" | "TIMESTAMP WITH LOCAL TIME ZONE" => {
                SqlType::TimestampTz
            }
            "BOOLEAN" | "BOOL" => SqlType::Boolean,
            "BIT" => SqlType::Bit,
            "BINARY" => SqlType::Binary,
            "VARBINARY" | "BYTEA" | "RAW" => SqlType::VarBinary,
            "LONG VARBINARY" | "LONG RAW" => SqlType::LongVarBinary,
            "BLOB" => SqlType::Blob,
            _ => SqlType::Other,
        }
    }
}

/// A raw cell as handed over by a cursor, or a parsed parameter headed into
/// a prepared statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(BigDecimal),
    BigInt(BigInt),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeTz(NaiveTime, FixedOffset),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    Array(Vec<SqlValue>),
    Struct {
        type_name: String,
        fields: Vec<SqlValue>,
    },
    Vector(Vec<f64>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short vendor-class style name, recorded lazily on the descriptor the
    /// first time a non-null cell is seen.
    pub fn class_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Boolean(_) => "boolean",
            SqlValue::Int(_) => "i32",
            SqlValue::Long(_) => "i64",
            SqlValue::Float(_) => "f32",
            SqlValue::Double(_) => "f64",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::BigInt(_) => "bigint",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
            SqlValue::TimeTz(..) => "timetz",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::TimestampTz(_) => "timestamptz",
            SqlValue::Array(_) => "array",
            SqlValue::Struct { .. } => "struct",
            SqlValue::Vector(_) => "vector",
        }
    }
}

/// A cell after encoding: either text, or a primitive scalar the sink can
/// emit as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedCell {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
}

impl EncodedCell {
    /// Field text as written to delimited output; NULL renders as the empty
    /// string there.
    pub fn field_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            EncodedCell::Null => "".into(),
            EncodedCell::Bool(b) => if *b { "true" } else { "false" }.into(),
            EncodedCell::Int(i) => i.to_string().into(),
            EncodedCell::Long(l) => l.to_string().into(),
            EncodedCell::Double(d) => d.to_string().into(),
            EncodedCell::Text(s) => s.as_str().into(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, EncodedCell::Null)
    }
}

/// Column metadata discovered from the cursor at open. Immutable afterwards,
/// except for the vendor class name which is filled in from the first
/// non-null cell.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    /// 0-based position.
    pub index: usize,
    pub name: String,
    pub kind: SqlKind,
    /// Vendor type code as reported by the driver, kept for diagnostics.
    pub vendor_code: i32,
    /// Vendor value class, filled lazily from the first non-null cell.
    pub vendor_class: Option<String>,
    /// Nominal size from metadata, 0 when the driver does not report one.
    pub size: u32,
}

/// Result of numeric parsing: the smallest representation that holds the
/// input exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum Numeric {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    BigInt(BigInt),
    Double(f64),
    Decimal(BigDecimal),
}

impl Numeric {
    /// True for the integral arms (anything that can bind to an integer
    /// column without loss).
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Numeric::Byte(_) | Numeric::Short(_) | Numeric::Int(_) | Numeric::Long(_)
                | Numeric::BigInt(_)
        )
    }

    /// Canonical text form: integers print plainly, doubles use the shortest
    /// round-trip form, decimals print normalized.
    pub fn canonical_string(&self) -> String {
        match self {
            Numeric::Byte(v) => v.to_string(),
            Numeric::Short(v) => v.to_string(),
            Numeric::Int(v) => v.to_string(),
            Numeric::Long(v) => v.to_string(),
            Numeric::BigInt(v) => v.to_string(),
            Numeric::Double(v) => v.to_string(),
            Numeric::Decimal(v) => v.normalized().to_string(),
        }
    }
}
