//! Cell values and the "not yet fetched" sentinel.
//!
//! A [`Cell`] is either [`Cell::Unknown`] (never fetched from upstream) or a
//! [`Cell::Known`] value. The distinction lives in the enum tag, so a fetched
//! NaN is a perfectly good known value and is never refetched.

use std::{fmt, sync::Arc};

use crate::domain::AttributeKind;

/// A scalar produced by a data source.
#[derive(Debug, Clone)]
pub enum Value {
    /// A continuous measurement. NaN is a legitimate value.
    Continuous(f64),
    /// Code of a discrete category (index into the attribute's value list).
    Discrete(u32),
    /// Free text, typically metadata.
    Text(Arc<str>),
    /// The source reported the value as missing in the underlying data.
    Missing,
}

impl Value {
    /// Numeric view used by range filters and statistics.
    ///
    /// Discrete codes are exposed as their code; text and missing values
    /// have no numeric view.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Continuous(v) => Some(*v),
            Value::Discrete(code) => Some(f64::from(*code)),
            Value::Text(_) | Value::Missing => None,
        }
    }

    /// Discrete code, if this is a discrete value.
    pub fn as_code(&self) -> Option<u32> {
        match self {
            Value::Discrete(code) => Some(*code),
            _ => None,
        }
    }

    /// Text payload, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Bitwise identity: NaN equals NaN with the same payload, `0.0` and
    /// `-0.0` differ.
    pub fn same_bits(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Continuous(a), Value::Continuous(b)) => a.to_bits() == b.to_bits(),
            (Value::Discrete(a), Value::Discrete(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Missing, Value::Missing) => true,
            _ => false,
        }
    }

    /// Normalize a source value to the storage form for `kind`.
    ///
    /// Integer codes produced for a continuous attribute are stored as
    /// floats; everything else is kept as delivered.
    pub fn conform_to(self, kind: &AttributeKind) -> Value {
        match (kind, self) {
            (AttributeKind::Continuous, Value::Discrete(code)) => Value::Continuous(f64::from(code)),
            (_, value) => value,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Continuous(a), Value::Continuous(b)) => a == b,
            _ => self.same_bits(other),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Continuous(v)
    }
}

impl From<u32> for Value {
    fn from(code: u32) -> Self {
        Value::Discrete(code)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(Arc::from(s))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Continuous(v) => write!(f, "{v}"),
            Value::Discrete(code) => write!(f, "#{code}"),
            Value::Text(s) => f.write_str(s),
            Value::Missing => f.write_str("?"),
        }
    }
}

/// One cell of the materialized store.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Cell {
    /// Not yet fetched from upstream.
    #[default]
    Unknown,
    /// Fetched; never refetched.
    Known(Value),
}

impl Cell {
    /// Whether the cell has been fetched.
    pub fn is_known(&self) -> bool {
        matches!(self, Cell::Known(_))
    }

    /// The fetched value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Cell::Known(v) => Some(v),
            Cell::Unknown => None,
        }
    }
}
