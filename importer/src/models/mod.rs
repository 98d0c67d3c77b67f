//! Domain models for the import pipeline.
//!
//! - [`RawValue`] / [`Row`] - one input record as read from the spreadsheet
//! - [`CoercedValue`] - a cell converted to the kind its target field requires
//! - [`SectionObject`] / [`Element`] - the nested object sent to Kordiam
//! - [`Outcome`] / [`ElementId`] - the per-row result of a run

mod element;

pub use element::{Element, SectionObject, SectionValue};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use crate::error::RowError;

// =============================================================================
// Raw Values
// =============================================================================

/// A cell as supplied by the row source.
///
/// CSV sources only produce [`RawValue::Text`]; Excel sources keep the
/// native cell type.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Empty,
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl RawValue {
    /// Empty cells are skipped, never coerced.
    pub fn is_empty(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Empty => "empty",
            RawValue::Text(_) => "text",
            RawValue::Integer(_) => "integer",
            RawValue::Float(_) => "number",
            RawValue::Bool(_) => "boolean",
            RawValue::Date(_) => "date",
            RawValue::Time(_) => "time",
            RawValue::DateTime(_) => "date-time",
        }
    }

    /// Build a raw value from a JSON scalar (used for mapping defaults).
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(RawValue::Empty),
            serde_json::Value::String(s) => Some(RawValue::Text(s.clone())),
            serde_json::Value::Bool(b) => Some(RawValue::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(RawValue::Integer(i)),
                None => n.as_f64().map(RawValue::Float),
            },
            _ => None,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Empty => Ok(()),
            RawValue::Text(s) => f.write_str(s),
            RawValue::Integer(i) => write!(f, "{}", i),
            RawValue::Float(v) => write!(f, "{}", v),
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            RawValue::Time(t) => write!(f, "{}", t.format("%H:%M")),
            RawValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Integer(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<NaiveDate> for RawValue {
    fn from(value: NaiveDate) -> Self {
        RawValue::Date(value)
    }
}

impl From<NaiveTime> for RawValue {
    fn from(value: NaiveTime) -> Self {
        RawValue::Time(value)
    }
}

impl From<NaiveDateTime> for RawValue {
    fn from(value: NaiveDateTime) -> Self {
        RawValue::DateTime(value)
    }
}

// =============================================================================
// Row
// =============================================================================

/// One input record: source column name to raw cell value.
///
/// Column lookup is exact and case-sensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: HashMap<String, RawValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<RawValue>) {
        self.cells.insert(column.into(), value.into());
    }

    /// Raw cell, including empty ones.
    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.cells.get(column)
    }

    /// Cell value when present and non-empty.
    pub fn value(&self, column: &str) -> Option<&RawValue> {
        self.cells.get(column).filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// True when every cell is empty (blank spreadsheet line).
    pub fn is_blank(&self) -> bool {
        self.cells.values().all(RawValue::is_empty)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for Row
where
    K: Into<String>,
    V: Into<RawValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

// =============================================================================
// Coerced Values
// =============================================================================

/// A cell converted to the kind its target field declares.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Integer(i64),
    Text(String),
    IsoDate(NaiveDate),
    IsoTime(NaiveTime),
    BooleanList(Vec<bool>),
    IntegerList(Vec<i64>),
}

impl Serialize for CoercedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CoercedValue::Integer(i) => serializer.serialize_i64(*i),
            CoercedValue::Text(s) => serializer.serialize_str(s),
            CoercedValue::IsoDate(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            CoercedValue::IsoTime(t) => serializer.collect_str(&t.format("%H:%M")),
            CoercedValue::BooleanList(values) => values.serialize(serializer),
            CoercedValue::IntegerList(values) => values.serialize(serializer),
        }
    }
}

/// Lists render back to the comma-separated form they were parsed from.
impl fmt::Display for CoercedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoercedValue::Integer(i) => write!(f, "{}", i),
            CoercedValue::Text(s) => f.write_str(s),
            CoercedValue::IsoDate(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CoercedValue::IsoTime(t) => write!(f, "{}", t.format("%H:%M")),
            CoercedValue::BooleanList(values) => {
                let tokens: Vec<String> = values.iter().map(|b| b.to_string()).collect();
                f.write_str(&tokens.join(","))
            }
            CoercedValue::IntegerList(values) => {
                let tokens: Vec<String> = values.iter().map(|i| i.to_string()).collect();
                f.write_str(&tokens.join(","))
            }
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Identifier of a created element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Deterministic marker used for dry runs.
    pub fn dry_run(row_number: usize) -> Self {
        Self(format!("dry-run:{}", row_number))
    }

    pub fn is_dry_run(&self) -> bool {
        self.0.starts_with("dry-run:")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of processing one row. Exactly one per input row.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Created(ElementId),
    Skipped(String),
    Failed(RowError),
}

impl Outcome {
    pub fn is_created(&self) -> bool {
        matches!(self, Outcome::Created(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

// =============================================================================
// Tests
// =============================================================================
