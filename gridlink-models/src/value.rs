use bytes::Bytes;
use std::{fmt, sync::Arc};

/// Discriminant tag for [`Value`], used in diagnostics and cast errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Boolean,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Binary,
    String,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Boolean => "Boolean",
            ValueKind::Int16 => "Int16",
            ValueKind::Int32 => "Int32",
            ValueKind::Int64 => "Int64",
            ValueKind::Float32 => "Float32",
            ValueKind::Float64 => "Float64",
            ValueKind::Binary => "Binary",
            ValueKind::String => "String",
        };
        f.write_str(s)
    }
}

/// Error returned when converting a [`Value`] into a concrete Rust primitive.
///
/// Incompatibility is an explicit encode-time error here, not a late runtime
/// cast failure inside the 104 encoders.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueCastError {
    /// Value is not a number (int/float).
    #[error("expected numeric value, got {actual}")]
    NotNumeric { actual: ValueKind },
    /// Strict type mismatch for non-numeric conversions.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ValueKind,
        actual: ValueKind,
    },
}

/// A strongly-typed telemetry payload.
///
/// String storage is shared (`Arc<str>`) and binary payloads are zero-copy
/// (`Bytes`) so cloning a point stays cheap on the fan-out path.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Binary(Bytes),
    String(Arc<str>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Float32(0.0)
    }
}

impl Value {
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Int16(_) => ValueKind::Int16,
            Value::Int32(_) => ValueKind::Int32,
            Value::Int64(_) => ValueKind::Int64,
            Value::Float32(_) => ValueKind::Float32,
            Value::Float64(_) => ValueKind::Float64,
            Value::Binary(_) => ValueKind::Binary,
            Value::String(_) => ValueKind::String,
        }
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Int16(_)
                | Value::Int32(_)
                | Value::Int64(_)
                | Value::Float32(_)
                | Value::Float64(_)
        )
    }

    /// Widen a numeric payload to `f64`. Boolean is not numeric here; a
    /// boolean point mapped onto a measurement type is a configuration bug
    /// that must surface, not encode as 0/1.
    pub fn as_f64(&self) -> Result<f64, ValueCastError> {
        match self {
            Value::Int16(v) => Ok(*v as f64),
            Value::Int32(v) => Ok(*v as f64),
            Value::Int64(v) => Ok(*v as f64),
            Value::Float32(v) => Ok(*v as f64),
            Value::Float64(v) => Ok(*v),
            other => Err(ValueCastError::NotNumeric {
                actual: other.kind(),
            }),
        }
    }

    pub fn as_f32(&self) -> Result<f32, ValueCastError> {
        self.as_f64().map(|v| v as f32)
    }

    pub fn as_i32(&self) -> Result<i32, ValueCastError> {
        match self {
            Value::Int16(v) => Ok(*v as i32),
            Value::Int32(v) => Ok(*v),
            Value::Int64(v) => Ok(*v as i32),
            Value::Float32(v) => Ok(*v as i32),
            Value::Float64(v) => Ok(*v as i32),
            other => Err(ValueCastError::NotNumeric {
                actual: other.kind(),
            }),
        }
    }

    pub fn as_i64(&self) -> Result<i64, ValueCastError> {
        match self {
            Value::Int16(v) => Ok(*v as i64),
            Value::Int32(v) => Ok(*v as i64),
            Value::Int64(v) => Ok(*v),
            Value::Float32(v) => Ok(*v as i64),
            Value::Float64(v) => Ok(*v as i64),
            other => Err(ValueCastError::NotNumeric {
                actual: other.kind(),
            }),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ValueCastError> {
        match self {
            Value::Boolean(v) => Ok(*v),
            other => Err(ValueCastError::TypeMismatch {
                expected: ValueKind::Boolean,
                actual: other.kind(),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Binary(v) => write!(f, "<{} bytes>", v.len()),
            Value::String(v) => f.write_str(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_casts_widen() {
        assert_eq!(Value::Int16(-42).as_f64().unwrap(), -42.0);
        assert_eq!(Value::Int64(1 << 40).as_i64().unwrap(), 1 << 40);
        assert_eq!(Value::Float64(1.5).as_i32().unwrap(), 1);
        assert_eq!(Value::Float32(123.45).as_f32().unwrap(), 123.45);
    }

    #[test]
    fn boolean_is_not_numeric() {
        let err = Value::Boolean(true).as_f64().unwrap_err();
        assert_eq!(
            err,
            ValueCastError::NotNumeric {
                actual: ValueKind::Boolean
            }
        );
    }

    #[test]
    fn float_is_not_boolean() {
        let err = Value::Float32(1.0).as_bool().unwrap_err();
        assert!(matches!(err, ValueCastError::TypeMismatch { .. }));
    }
}
