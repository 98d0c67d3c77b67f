//! The nested element object and its section sub-objects.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use super::CoercedValue;
use crate::error::AssemblyError;

/// Entry in a [`SectionObject`]: a value or a nested object built from a
/// dotted target path (`deadline.date`).
#[derive(Debug, Clone, PartialEq)]
pub enum SectionValue {
    Value(CoercedValue),
    Nested(SectionObject),
}

impl Serialize for SectionValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SectionValue::Value(v) => v.serialize(serializer),
            SectionValue::Nested(obj) => obj.serialize(serializer),
        }
    }
}

/// Target field name to value, for one section of one row.
///
/// Never contains empty nested objects: fields are only inserted when a
/// populated cell produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionObject {
    fields: BTreeMap<String, SectionValue>,
}

impl SectionObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, field: &str) -> Option<&SectionValue> {
        self.fields.get(field)
    }

    /// Value at a dotted path, if the path ends at a value.
    pub fn value_at(&self, path: &str) -> Option<&CoercedValue> {
        let mut current = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            match current.fields.get(segment)? {
                SectionValue::Value(v) if segments.peek().is_none() => return Some(v),
                SectionValue::Nested(obj) => current = obj,
                SectionValue::Value(_) => return None,
            }
        }
        None
    }

    pub fn contains_path(&self, path: &str) -> bool {
        let mut current = self;
        for segment in path.split('.') {
            match current.fields.get(segment) {
                Some(SectionValue::Nested(obj)) => current = obj,
                Some(SectionValue::Value(_)) => return true,
                None => return false,
            }
        }
        true
    }

    /// Insert a value at a dotted path, creating intermediate objects.
    ///
    /// A value already sitting where an intermediate object is needed gets
    /// replaced; mapping validation rules that case out beforehand.
    pub fn insert_path(&mut self, path: &str, value: CoercedValue) {
        let segments: Vec<&str> = path.split('.').collect();
        self.insert_segments(&segments, value);
    }

    fn insert_segments(&mut self, segments: &[&str], value: CoercedValue) {
        match segments {
            [] => {}
            [last] => {
                self.fields.insert((*last).to_string(), SectionValue::Value(value));
            }
            [head, rest @ ..] => {
                let entry = self
                    .fields
                    .entry((*head).to_string())
                    .or_insert_with(|| SectionValue::Nested(SectionObject::new()));
                if let SectionValue::Value(_) = entry {
                    *entry = SectionValue::Nested(SectionObject::new());
                }
                if let SectionValue::Nested(obj) = entry {
                    obj.insert_segments(rest, value);
                }
            }
        }
    }

    /// Copy every field of `other` that this object lacks, recursing into
    /// nested objects present on both sides.
    pub fn fill_missing(&mut self, other: &SectionObject) {
        for (key, value) in &other.fields {
            match (self.fields.get_mut(key), value) {
                (None, _) => {
                    self.fields.insert(key.clone(), value.clone());
                }
                (Some(SectionValue::Nested(mine)), SectionValue::Nested(theirs)) => {
                    mine.fill_missing(theirs)
                }
                _ => {}
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SectionValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for SectionObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// The assembled per-row output.
///
/// Holds at least one task, publication or group; [`Element::new`] refuses
/// to build one otherwise. Absent sections are omitted on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    #[serde(flatten)]
    fields: SectionObject,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tasks: Vec<SectionObject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    publications: Vec<SectionObject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    groups: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<SectionObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<SectionObject>,
}

impl Element {
    /// Build an element from already-built sections.
    ///
    /// Empty sub-entries and empty optional sections are dropped before the
    /// content check.
    pub fn new(
        fields: SectionObject,
        tasks: Vec<SectionObject>,
        publications: Vec<SectionObject>,
        groups: Vec<i64>,
        location: Option<SectionObject>,
        event: Option<SectionObject>,
    ) -> Result<Self, AssemblyError> {
        let tasks: Vec<SectionObject> = tasks.into_iter().filter(|t| !t.is_empty()).collect();
        let publications: Vec<SectionObject> =
            publications.into_iter().filter(|p| !p.is_empty()).collect();

        if tasks.len() + publications.len() + groups.len() == 0 {
            return Err(AssemblyError::NoContent);
        }

        Ok(Self {
            fields,
            tasks,
            publications,
            groups,
            location: location.filter(|l| !l.is_empty()),
            event: event.filter(|e| !e.is_empty()),
        })
    }

    pub fn fields(&self) -> &SectionObject {
        &self.fields
    }

    pub fn tasks(&self) -> &[SectionObject] {
        &self.tasks
    }

    pub fn publications(&self) -> &[SectionObject] {
        &self.publications
    }

    pub fn groups(&self) -> &[i64] {
        &self.groups
    }

    pub fn location(&self) -> Option<&SectionObject> {
        self.location.as_ref()
    }

    pub fn event(&self) -> Option<&SectionObject> {
        self.event.as_ref()
    }

    /// Wire representation.
    pub fn to_value(&self) -> serde_json::Value {
        // Serializing string-keyed maps and scalars cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Pretty-printed wire representation, used for dry-run output.
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
