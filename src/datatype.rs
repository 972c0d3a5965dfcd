// used for persistence
use rusqlite::types::{Value as SqlValue, ValueRef};
// values are bound and viewed as JSON
use serde_json::{Number, Value};

// used to print out readable forms of a data type
use std::fmt;

use crate::error::{CanfigError, Result};

/// The scalar types that may appear inside `LIST(...)` without a struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Integer,
    Real,
    Text,
    Blob,
}

impl BuiltinType {
    pub const ALL: [BuiltinType; 4] = [
        BuiltinType::Integer,
        BuiltinType::Real,
        BuiltinType::Text,
        BuiltinType::Blob,
    ];
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinType::Integer => "INTEGER",
            BuiltinType::Real => "REAL",
            BuiltinType::Text => "TEXT",
            BuiltinType::Blob => "BLOB",
        }
    }
    /// Exact, case sensitive lookup.
    pub fn from_name(name: &str) -> Option<BuiltinType> {
        BuiltinType::ALL.iter().find(|t| t.name() == name).copied()
    }
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// Words that may start an SQLite column type. Anything else in that position
// is taken to be a reference to a struct.
const SQL_TYPE_WORDS: &[&str] = &[
    "INTEGER", "INT", "TINYINT", "SMALLINT", "MEDIUMINT", "BIGINT", "UNSIGNED", "INT2", "INT8",
    "REAL", "DOUBLE", "FLOAT", "NUMERIC", "DECIMAL", "BOOLEAN", "BOOL", "DATE", "DATETIME",
    "TIMESTAMP", "TEXT", "CHARACTER", "CHAR", "VARCHAR", "VARYING", "NCHAR", "NATIVE",
    "NVARCHAR", "CLOB", "BLOB", "ANY", "JSON",
];

pub fn is_sql_type_word(word: &str) -> bool {
    SQL_TYPE_WORDS.iter().any(|w| w.eq_ignore_ascii_case(word))
}

/// A parameterized struct argument coerced to its declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// Literal substituted into the struct body.
    pub literal: String,
    /// Suffix used to name the instantiation, `Base_<suffix>`.
    pub suffix: String,
}

/// Coerces the raw text of a struct argument to the declared type.
///
/// The result is canonical: `3`, ` 3 ` and `03` all coerce to the same
/// literal and suffix for an INTEGER placeholder.
pub fn coerce_argument(declared: &str, raw: &str) -> Result<Argument> {
    let raw = raw.trim();
    let invalid = || CanfigError::Compile(format!("argument '{}' is not a valid {}", raw, declared));
    match BuiltinType::from_name(&declared.to_uppercase()) {
        Some(BuiltinType::Integer) => {
            let n: i64 = raw.parse().map_err(|_| invalid())?;
            Ok(Argument { literal: n.to_string(), suffix: n.to_string().replace('-', "m") })
        }
        Some(BuiltinType::Real) => {
            let x: f64 = raw.parse().map_err(|_| invalid())?;
            if !x.is_finite() {
                return Err(invalid());
            }
            let rendered = format!("{:?}", x);
            Ok(Argument { suffix: rendered.replace('-', "m").replace('.', "p"), literal: rendered })
        }
        Some(BuiltinType::Text) => {
            let text = raw.trim_matches(|c| c == '\'' || c == '"');
            if text.is_empty() || !text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid());
            }
            Ok(Argument { literal: format!("'{}'", text), suffix: text.to_string() })
        }
        _ => Err(CanfigError::Compile(format!(
            "argument type '{}' must be INTEGER, REAL or TEXT",
            declared
        ))),
    }
}

/// Converts a bound JSON scalar into a value for the store.
pub fn to_sql(value: &Value) -> Result<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(*b as i64)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(SqlValue::Integer(i)),
            None => n
                .as_f64()
                .map(SqlValue::Real)
                .ok_or_else(|| CanfigError::Binding(format!("number {} is out of range", n))),
        },
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        other => Err(CanfigError::Binding(format!("{} is not a scalar value", other))),
    }
}

/// Converts a stored value into JSON.
pub fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(x) => Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}
