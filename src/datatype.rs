// used for calendar-backed time values
use chrono::{NaiveDate, NaiveDateTime};

// projected values are serializable for downstream consumers
use serde::{Serialize, Serializer};

// used to print out readable forms of values and types
use std::cmp::Ordering;
use std::fmt;

use crate::construct::{RecordId, NO_RECORD};
use crate::error::{FacetbaseError, Result};

// ------------- Time -------------
/// A point in time with explicit granularity. Coarser granularities keep
/// their coarseness instead of being widened to a full timestamp, so a
/// value entered as a year compares and prints as a year.
#[derive(Eq, PartialEq, PartialOrd, Ord, Debug, Hash, Clone)]
pub enum Time {
    Year(u16),
    YearMonth(u16, u8),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Time {
    /// The empty value of time-typed cells that were never set.
    pub fn epoch() -> Time {
        Time::Date(NaiveDate::default())
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Time::Year(y) => write!(f, "{y:04}"),
            Time::YearMonth(y, m) => write!(f, "{y:04}-{m:02}"),
            Time::Date(d) => write!(f, "{d}"),
            Time::DateTime(d) => write!(f, "{d}"),
        }
    }
}

// ------------- Value -------------
/// The closed set of runtime value tags. Columns, table keys and filter
/// literals all carry these; comparisons dispatch on the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Text,
    Time,
    Reference,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueType::Int => write!(f, "Int"),
            ValueType::Text => write!(f, "Text"),
            ValueType::Time => write!(f, "Time"),
            ValueType::Reference => write!(f, "Reference"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i64),
    Text(String),
    Time(Time),
    /// Identity of a record in another table; `NO_RECORD` means unset.
    Reference(RecordId),
}

impl Value {
    pub fn int(value: i64) -> Value {
        Value::Int(value)
    }
    pub fn text(value: impl Into<String>) -> Value {
        Value::Text(value.into())
    }
    pub fn time(value: Time) -> Value {
        Value::Time(value)
    }
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Text(_) => ValueType::Text,
            Value::Time(_) => ValueType::Time,
            Value::Reference(_) => ValueType::Reference,
        }
    }
    /// Natural ordering within a tag: numeric, lexical, chronological.
    /// Comparing across tags is a type mismatch, never a silent ordering.
    pub fn natural_cmp(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Ok(a.cmp(b)),
            (a, b) => Err(FacetbaseError::Type(format!(
                "cannot compare {} with {}",
                a.value_type(),
                b.value_type()
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Text(t) => write!(f, "{t}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::Reference(NO_RECORD) => Ok(()),
            Value::Reference(id) => write!(f, "#{id}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Text(t) => serializer.serialize_str(t),
            Value::Time(t) => serializer.serialize_str(&t.to_string()),
            Value::Reference(id) => serializer.serialize_u64(*id),
        }
    }
}

// ------------- ColumnType -------------
/// Declared type of a stored column. `Reference` columns store record
/// identities of the named table and project as that record's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Text,
    Time,
    Reference { table: String },
}

impl ColumnType {
    pub fn value_type(&self) -> ValueType {
        match self {
            ColumnType::Int => ValueType::Int,
            ColumnType::Text => ValueType::Text,
            ColumnType::Time => ValueType::Time,
            ColumnType::Reference { .. } => ValueType::Reference,
        }
    }
    /// What a never-set cell reads as.
    pub fn empty_value(&self) -> Value {
        match self {
            ColumnType::Int => Value::Int(0),
            ColumnType::Text => Value::Text(String::new()),
            ColumnType::Time => Value::Time(Time::epoch()),
            ColumnType::Reference { .. } => Value::Reference(NO_RECORD),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ColumnType::Reference { table } => write!(f, "Reference({table})"),
            other => write!(f, "{}", other.value_type()),
        }
    }
}
