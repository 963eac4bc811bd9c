// ABOUTME: Shared data models for SQL Utility
// ABOUTME: Primitive type mapping, cell values, column descriptions and utility events

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tiberius::{ColumnData, FromSql, ToSql};

use crate::db::SqlServerError;

/// The four primitive types a table column can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Text,
    Float,
    DateTime,
}

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

impl ColumnType {
    /// SQL type name used when generating `CREATE TABLE`
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "NTEXT",
            ColumnType::Float => "FLOAT(24)",
            ColumnType::DateTime => "DATETIME",
        }
    }

    /// Map a SQL Server type name back to a primitive type
    pub fn from_sql_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "int" | "integer" | "smallint" | "tinyint" | "bigint" => Some(ColumnType::Integer),
            "ntext" | "text" | "nvarchar" | "varchar" | "nchar" | "char" | "sysname" => {
                Some(ColumnType::Text)
            }
            "real" | "float" | "float(24)" | "float(53)" | "decimal" | "numeric" | "money" => {
                Some(ColumnType::Float)
            }
            "datetime" | "datetime2" | "smalldatetime" | "date" => Some(ColumnType::DateTime),
            _ => None,
        }
    }

    /// Parse a literal typed on the command line into a value of this type.
    ///
    /// `null` (any case) yields `Value::Null` for every type except text.
    pub fn parse_value(&self, raw: &str) -> Result<Value, SqlServerError> {
        let trimmed = raw.trim();
        if *self != ColumnType::Text && trimmed.eq_ignore_ascii_case("null") {
            return Ok(Value::Null);
        }

        let invalid = || SqlServerError::Conversion(format!("'{}' is not a valid {} value", raw, self));

        match self {
            ColumnType::Integer => trimmed.parse::<i32>().map(Value::Int).map_err(|_| invalid()),
            ColumnType::Float => trimmed.parse::<f32>().map(Value::Float).map_err(|_| invalid()),
            ColumnType::Text => Ok(Value::Text(raw.to_string())),
            ColumnType::DateTime => {
                for format in DATETIME_FORMATS {
                    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                        return Ok(Value::DateTime(dt));
                    }
                }
                NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                    .map(|d| Value::DateTime(d.and_time(NaiveTime::MIN)))
                    .map_err(|_| invalid())
            }
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Text => "text",
            ColumnType::Float => "float",
            ColumnType::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ColumnType {
    type Err = SqlServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(ColumnType::Integer),
            "text" | "string" => Ok(ColumnType::Text),
            "float" | "real" => Ok(ColumnType::Float),
            "datetime" | "timestamp" => Ok(ColumnType::DateTime),
            other => Err(SqlServerError::UnsupportedType(other.to_string())),
        }
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i32),
    Text(String),
    Float(f32),
    DateTime(NaiveDateTime),
    Null,
}

impl Value {
    /// Primitive type of the value, `None` for NULL
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Int(_) => Some(ColumnType::Integer),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Float(_) => Some(ColumnType::Float),
            Value::DateTime(_) => Some(ColumnType::DateTime),
            Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Values only order against values of the same variant
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Float(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::Null => f.write_str("NULL"),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            Value::Int(v) => ColumnData::I32(Some(*v)),
            Value::Text(v) => ColumnData::String(Some(Cow::Borrowed(v.as_str()))),
            Value::Float(v) => ColumnData::F32(Some(*v)),
            Value::DateTime(v) => v.to_sql(),
            // nvarchar NULL converts implicitly to every mapped column type, ntext included
            Value::Null => ColumnData::String(None),
        }
    }
}

impl TryFrom<ColumnData<'static>> for Value {
    type Error = SqlServerError;

    fn try_from(data: ColumnData<'static>) -> Result<Self, Self::Error> {
        let value = match data {
            ColumnData::U8(v) => v.map(|v| Value::Int(v as i32)),
            ColumnData::I16(v) => v.map(|v| Value::Int(v as i32)),
            ColumnData::I32(v) => v.map(Value::Int),
            ColumnData::I64(None) => None,
            ColumnData::I64(Some(v)) => {
                let narrowed = i32::try_from(v).map_err(|_| {
                    SqlServerError::Conversion(format!("{} does not fit in an INTEGER", v))
                })?;
                Some(Value::Int(narrowed))
            }
            ColumnData::Bit(v) => v.map(|b| Value::Int(b as i32)),
            ColumnData::F32(v) => v.map(Value::Float),
            ColumnData::F64(v) => v.map(|v| Value::Float(v as f32)),
            ColumnData::Numeric(v) => v.map(|n| {
                let scaled = n.value() as f64 / 10f64.powi(n.scale() as i32);
                Value::Float(scaled as f32)
            }),
            ColumnData::String(v) => v.map(|s| Value::Text(s.into_owned())),
            ref d @ (ColumnData::DateTime(_)
            | ColumnData::SmallDateTime(_)
            | ColumnData::DateTime2(_)) => NaiveDateTime::from_sql(d)?.map(Value::DateTime),
            ref d @ ColumnData::Date(_) => {
                NaiveDate::from_sql(d)?.map(|date| Value::DateTime(date.and_time(NaiveTime::MIN)))
            }
            ColumnData::Guid(_) => return Err(SqlServerError::UnsupportedType("uniqueidentifier".into())),
            ColumnData::Binary(_) => return Err(SqlServerError::UnsupportedType("binary".into())),
            ColumnData::Xml(_) => return Err(SqlServerError::UnsupportedType("xml".into())),
            ColumnData::Time(_) => return Err(SqlServerError::UnsupportedType("time".into())),
            ColumnData::DateTimeOffset(_) => {
                return Err(SqlServerError::UnsupportedType("datetimeoffset".into()))
            }
        };

        Ok(value.unwrap_or(Value::Null))
    }
}

fn mismatch(expected: ColumnType, got: &Value) -> SqlServerError {
    SqlServerError::Conversion(format!("expected {} value, got {:?}", expected, got))
}

impl TryFrom<Value> for i32 {
    type Error = SqlServerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int(v) => Ok(v),
            other => Err(mismatch(ColumnType::Integer, &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = SqlServerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(mismatch(ColumnType::Text, &other)),
        }
    }
}

impl TryFrom<Value> for f32 {
    type Error = SqlServerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Float(v) => Ok(v),
            other => Err(mismatch(ColumnType::Float, &other)),
        }
    }
}

impl TryFrom<Value> for NaiveDateTime {
    type Error = SqlServerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::DateTime(v) => Ok(v),
            other => Err(mismatch(ColumnType::DateTime, &other)),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

/// True when `lhs >= rhs`; values that cannot be ordered against each other never qualify
pub fn is_at_least<T: PartialOrd>(lhs: &T, rhs: &T) -> bool {
    matches!(lhs.partial_cmp(rhs), Some(Ordering::Greater | Ordering::Equal))
}

/// Column definition used by `CREATE TABLE`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    /// Define a column by example: the type is taken from the sample value
    pub fn from_sample(name: impl Into<String>, sample: &Value) -> Result<Self, SqlServerError> {
        let name = name.into();
        let column_type = sample.column_type().ok_or_else(|| {
            SqlServerError::UnsupportedType(format!("NULL sample for column {}", name))
        })?;
        Ok(Self { name, column_type })
    }
}

/// Column description read from `sys.columns`
#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "sqlType")]
    pub sql_type: String,
    #[serde(rename = "columnType")]
    pub column_type: Option<ColumnType>,
    #[serde(rename = "maxLength")]
    pub max_length: i16,
    pub nullable: bool,
}

/// Earliest and latest values of a table's first datetime column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSpan {
    pub column: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Result of an arbitrary statement
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Connected,
    Disconnected,
    TableCreated,
    RowsInserted,
    RowsDeleted,
}

/// Notification broadcast by `DbUtility` after state-changing operations
#[derive(Debug, Clone, Serialize)]
pub struct UtilityEvent {
    pub kind: EventKind,
    #[serde(default)]
    pub table: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl UtilityEvent {
    pub fn new(kind: EventKind, table: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.map(str::to_string),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
