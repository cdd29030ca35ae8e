//! Runtime values for the flowchart interpreter.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The declared type of a diagram variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    Double,
    String,
    Boolean,
}

impl DataType {
    /// The value a variable of this type holds at the start of a run.
    pub fn default_value(self) -> Value {
        match self {
            DataType::Int => Value::Int(0),
            DataType::Double => Value::Double(0.0),
            DataType::String => Value::Str(String::new()),
            DataType::Boolean => Value::Bool(false),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int => "int",
            DataType::Double => "double",
            DataType::String => "string",
            DataType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// A runtime value. Immutable once constructed.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Double(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    /// The type tag of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Double(_) => DataType::Double,
            Value::Str(_) => DataType::String,
            Value::Bool(_) => DataType::Boolean,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_))
    }

    /// Coerce to an integer. Doubles truncate toward zero.
    pub fn as_int(&self) -> Result<i64, Error> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Double(d) if d.is_finite() => Ok(d.trunc() as i64),
            Value::Double(_) => Err(self.coercion_error(DataType::Int)),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| self.coercion_error(DataType::Int)),
        }
    }

    /// Coerce to a double.
    pub fn as_double(&self) -> Result<f64, Error> {
        match self {
            Value::Int(n) => Ok(*n as f64),
            Value::Double(d) => Ok(*d),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| self.coercion_error(DataType::Double)),
        }
    }

    /// Coerce to a boolean. Numbers are true when nonzero; strings must
    /// spell `true` or `false`.
    pub fn as_bool(&self) -> Result<bool, Error> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(n) => Ok(*n != 0),
            Value::Double(d) => Ok(*d != 0.0),
            Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(self.coercion_error(DataType::Boolean)),
            },
        }
    }

    /// Textual form of the payload. Never fails.
    pub fn as_string(&self) -> String {
        self.to_string()
    }

    /// The value written back as expression source: numbers bare, strings
    /// quoted.
    pub fn literal(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s),
            other => other.to_string(),
        }
    }

    /// Classify a line of user input: integer if it parses as one, then
    /// double, otherwise the raw string.
    pub fn from_input(text: &str) -> Value {
        let trimmed = text.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Value::Int(n);
        }
        match trimmed.parse::<f64>() {
            Ok(d) if d.is_finite() => Value::Double(d),
            _ => Value::Str(text.to_string()),
        }
    }

    fn coercion_error(&self, to: DataType) -> Error {
        Error::TypeCoercion {
            value: self.to_string(),
            from: self.data_type(),
            to,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Bool(a), Value::Int(n)) | (Value::Int(n), Value::Bool(a)) => *a == (*n != 0),
            (Value::Bool(a), Value::Double(d)) | (Value::Double(d), Value::Bool(a)) => {
                *a == (*d != 0.0)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            // Whole doubles keep their ".0" so they read back as doubles.
            Value::Double(d) if d.is_finite() && d.fract() == 0.0 => write!(f, "{:.1}", d),
            Value::Double(d) => write!(f, "{}", d),
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}
