//! Bound parameter values and query results.
//!
//! Every dynamic value reaches the database as a bound parameter; SQL text is
//! only ever built from trusted identifiers.

use duckdb::types::{TimeUnit, ToSql, ToSqlOutput, Value};
use std::fmt;

/// A scalar value bound to, or read from, a SQL statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
}

impl SqlValue {
    /// Text value, `Null` for `None`
    pub fn opt_text(value: Option<impl Into<String>>) -> Self {
        value.map_or(SqlValue::Null, |v| SqlValue::Text(v.into()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(n) => Some(*n),
            SqlValue::Double(f) => Some(*f as i64),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(n) => Some(*n as f64),
            SqlValue::Double(f) => Some(*f),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int(n) => Some(*n != 0),
            _ => None,
        }
    }

    /// Owned text rendering, `None` for NULL
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{b}"),
            SqlValue::Int(n) => write!(f, "{n}"),
            SqlValue::Double(v) => write!(f, "{v}"),
            SqlValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        SqlValue::Int(n)
    }
}

impl From<i32> for SqlValue {
    fn from(n: i32) -> Self {
        SqlValue::Int(n.into())
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Double(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        let value = match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Boolean(*b),
            SqlValue::Int(n) => Value::BigInt(*n),
            SqlValue::Double(v) => Value::Double(*v),
            SqlValue::Text(s) => Value::Text(s.clone()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Boolean(b) => SqlValue::Bool(b),
            Value::TinyInt(n) => SqlValue::Int(n.into()),
            Value::SmallInt(n) => SqlValue::Int(n.into()),
            Value::Int(n) => SqlValue::Int(n.into()),
            Value::BigInt(n) => SqlValue::Int(n),
            Value::HugeInt(n) => {
                i64::try_from(n).map_or(SqlValue::Double(n as f64), SqlValue::Int)
            }
            Value::UTinyInt(n) => SqlValue::Int(n.into()),
            Value::USmallInt(n) => SqlValue::Int(n.into()),
            Value::UInt(n) => SqlValue::Int(n.into()),
            Value::UBigInt(n) => {
                i64::try_from(n).map_or(SqlValue::Double(n as f64), SqlValue::Int)
            }
            Value::Float(v) => SqlValue::Double(v.into()),
            Value::Double(v) => SqlValue::Double(v),
            Value::Decimal(d) => d
                .to_string()
                .parse::<f64>()
                .map_or(SqlValue::Text(d.to_string()), SqlValue::Double),
            Value::Text(s) => SqlValue::Text(s),
            Value::Date32(days) => chrono::DateTime::from_timestamp(i64::from(days) * 86_400, 0)
                .map_or(SqlValue::Int(days.into()), |dt| {
                    SqlValue::Text(dt.date_naive().to_string())
                }),
            Value::Timestamp(unit, raw) => {
                let micros = match unit {
                    TimeUnit::Second => raw.saturating_mul(1_000_000),
                    TimeUnit::Millisecond => raw.saturating_mul(1_000),
                    TimeUnit::Microsecond => raw,
                    TimeUnit::Nanosecond => raw / 1_000,
                };
                chrono::DateTime::from_timestamp_micros(micros)
                    .map_or(SqlValue::Int(raw), |dt| {
                        SqlValue::Text(dt.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string())
                    })
            }
            other => SqlValue::Text(format!("{other:?}")),
        }
    }
}

/// Rows returned from a query, with column names
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryResult {
    /// Index of a named column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at (row, column name), `Null` when either is missing
    pub fn value(&self, row: usize, column: &str) -> &SqlValue {
        const NULL: &SqlValue = &SqlValue::Null;
        self.column_index(column)
            .and_then(|idx| self.rows.get(row).and_then(|r| r.get(idx)))
            .unwrap_or(NULL)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row
    pub fn scalar(&self) -> &SqlValue {
        const NULL: &SqlValue = &SqlValue::Null;
        self.rows.first().and_then(|r| r.first()).unwrap_or(NULL)
    }
}
