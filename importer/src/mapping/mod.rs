//! Mapping definition.
//!
//! A mapping binds spreadsheet columns to Kordiam element fields, section by
//! section. It is loaded once, validated, and shared read-only by every row.
//!
//! # File format
//!
//! ```json
//! {
//!   "_comment": "keys starting with '_' are ignored",
//!   "element_fields": { "Title": "title", "Element Status": "elementStatus" },
//!   "tasks": {
//!     "Task Status ID": "status",
//!     "Deadline Day": { "field": "deadline.date" },
//!     "Second Task Status": { "field": "status", "entry": 2 }
//!   },
//!   "groups": { "Group IDs": "groups" },
//!   "defaults": { "tasks": { "confirmationStatus": -2 } }
//! }
//! ```
//!
//! A binding is either a target field name or an object with `field`, an
//! optional `kind` and, in `tasks`/`publications`, an optional `entry`
//! selecting which sub-entry the column feeds.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::models::{RawValue, SectionObject};
use crate::transform::coerce;

// =============================================================================
// Sections and Kinds
// =============================================================================

/// One named part of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionName {
    ElementFields,
    Tasks,
    Publications,
    Groups,
    Location,
    Event,
}

impl SectionName {
    pub const ALL: [SectionName; 6] = [
        SectionName::ElementFields,
        SectionName::Tasks,
        SectionName::Publications,
        SectionName::Groups,
        SectionName::Location,
        SectionName::Event,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionName::ElementFields => "element_fields",
            SectionName::Tasks => "tasks",
            SectionName::Publications => "publications",
            SectionName::Groups => "groups",
            SectionName::Location => "location",
            SectionName::Event => "event",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// Sections that may produce several sub-entries per row.
    pub fn is_repeatable(self) -> bool {
        matches!(self, SectionName::Tasks | SectionName::Publications)
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared kind of a target field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    Text,
    Date,
    Time,
    /// A `{date, time}` pair filled from a single cell.
    #[serde(rename = "datetime")]
    DateTime,
    BooleanList,
    IntegerList,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Text => "text",
            FieldKind::Date => "date",
            FieldKind::Time => "time",
            FieldKind::DateTime => "datetime",
            FieldKind::BooleanList => "boolean_list",
            FieldKind::IntegerList => "integer_list",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind the Kordiam element schema requires for a field, if it constrains it.
pub fn builtin_kind(section: SectionName, field: &str) -> Option<FieldKind> {
    use FieldKind::*;
    match (section, field) {
        (SectionName::ElementFields, "elementStatus") => Some(Integer),

        (SectionName::Tasks, "status" | "format" | "user" | "confirmationStatus") => Some(Integer),
        (SectionName::Tasks, "deadline") => Some(DateTime),
        (SectionName::Tasks, "deadline.date") => Some(Date),
        (SectionName::Tasks, "deadline.time") => Some(Time),

        (SectionName::Publications, "status" | "platform" | "category" | "type") => Some(Integer),
        (SectionName::Publications, "single" | "single.start") => Some(DateTime),
        (SectionName::Publications, "single.start.date") => Some(Date),
        (SectionName::Publications, "single.start.time") => Some(Time),
        (SectionName::Publications, "assignments") => Some(BooleanList),

        (SectionName::Groups, _) => Some(IntegerList),

        (SectionName::Event, "fromDate" | "toDate") => Some(Date),
        (SectionName::Event, "fromTime" | "toTime") => Some(Time),

        _ => None,
    }
}

/// Path a target field is written to. A publication's `single` schedule
/// lives under `single.start`.
fn target_path(section: SectionName, field: &str) -> String {
    match (section, field) {
        (SectionName::Publications, "single") => "single.start".to_string(),
        _ => field.to_string(),
    }
}

const RESERVED_FIELDS: [&str; 5] = ["tasks", "publications", "groups", "location", "event"];

// =============================================================================
// Bindings
// =============================================================================

/// One column bound to one target field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBinding {
    /// Source column (exact, case-sensitive).
    pub column: String,
    /// Target field as written in the mapping.
    pub field: String,
    /// Dotted path the value is written to.
    pub path: String,
    pub kind: FieldKind,
    /// Sub-entry index (1-based) for repeatable sections.
    pub entry: usize,
}

impl FieldBinding {
    /// Leaf paths this binding writes.
    fn written_paths(&self) -> Vec<String> {
        match self.kind {
            FieldKind::DateTime => vec![format!("{}.date", self.path), format!("{}.time", self.path)],
            _ => vec![self.path.clone()],
        }
    }
}

impl fmt::Display for FieldBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' -> {} ({})", self.column, self.path, self.kind)?;
        if self.entry > 1 {
            write!(f, " [entry {}]", self.entry)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BindingObject {
    field: String,
    #[serde(default)]
    kind: Option<FieldKind>,
    #[serde(default)]
    entry: Option<usize>,
}

/// The validated bindings of one section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSpec {
    pub name: SectionName,
    pub bindings: Vec<FieldBinding>,
    /// Values applied to every non-empty sub-entry lacking them.
    pub defaults: SectionObject,
}

impl SectionSpec {
    fn new(name: SectionName) -> Self {
        Self {
            name,
            bindings: Vec::new(),
            defaults: SectionObject::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Distinct entry indices, ascending.
    pub fn entries(&self) -> Vec<usize> {
        let mut entries: Vec<usize> = self.bindings.iter().map(|b| b.entry).collect();
        entries.sort_unstable();
        entries.dedup();
        entries
    }

    pub fn bindings_for_entry(&self, entry: usize) -> impl Iterator<Item = &FieldBinding> {
        self.bindings.iter().filter(move |b| b.entry == entry)
    }
}

// =============================================================================
// Mapping Spec
// =============================================================================

/// Validated, immutable column-to-field mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingSpec {
    sections: Vec<SectionSpec>,
}

impl MappingSpec {
    /// Parse and validate a mapping from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Load and validate a mapping file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Validate a mapping document.
    pub fn from_value(value: &Value) -> ConfigResult<Self> {
        let root = value.as_object().ok_or_else(|| ConfigError::InvalidBinding {
            section: "<root>".to_string(),
            column: String::new(),
            message: "mapping must be a JSON object".to_string(),
        })?;

        let mut spec = Self::empty();
        let mut defaults = None;

        for (key, body) in root {
            if key.starts_with('_') {
                continue;
            }
            if key == "defaults" {
                defaults = Some(body);
                continue;
            }
            let name =
                SectionName::parse(key).ok_or_else(|| ConfigError::UnknownSection(key.clone()))?;
            let bindings = parse_section(name, body)?;
            spec.section_mut(name).bindings = bindings;
        }

        if let Some(body) = defaults {
            spec.parse_defaults(body)?;
        }

        Ok(spec)
    }

    fn empty() -> Self {
        Self {
            sections: SectionName::ALL.into_iter().map(SectionSpec::new).collect(),
        }
    }

    fn section_mut(&mut self, name: SectionName) -> &mut SectionSpec {
        let idx = SectionName::ALL.iter().position(|s| *s == name).unwrap_or(0);
        &mut self.sections[idx]
    }

    pub fn section(&self, name: SectionName) -> &SectionSpec {
        let idx = SectionName::ALL.iter().position(|s| *s == name).unwrap_or(0);
        &self.sections[idx]
    }

    pub fn sections(&self) -> impl Iterator<Item = &SectionSpec> {
        self.sections.iter()
    }

    pub fn binding_count(&self) -> usize {
        self.sections.iter().map(|s| s.bindings.len()).sum()
    }

    fn parse_defaults(&mut self, body: &Value) -> ConfigResult<()> {
        let sections = body.as_object().ok_or_else(|| ConfigError::InvalidBinding {
            section: "defaults".to_string(),
            column: String::new(),
            message: "defaults must be an object of sections".to_string(),
        })?;

        for (key, fields) in sections {
            if key.starts_with('_') {
                continue;
            }
            let name =
                SectionName::parse(key).ok_or_else(|| ConfigError::UnknownSection(key.clone()))?;
            let fields = fields.as_object().ok_or_else(|| invalid(name, "", "defaults must be an object"))?;

            let mut template = SectionObject::new();
            for (field, json) in fields {
                if field.starts_with('_') {
                    continue;
                }
                if name == SectionName::Groups {
                    return Err(invalid(name, field, "groups cannot carry defaults"));
                }
                let path = target_path(name, field);
                if name == SectionName::ElementFields {
                    let head = path.split('.').next().unwrap_or_default();
                    if RESERVED_FIELDS.contains(&head) {
                        return Err(ConfigError::ReservedField(field.clone()));
                    }
                }
                let raw = RawValue::from_json(json)
                    .ok_or_else(|| invalid(name, field, "default must be a scalar"))?;
                // A bound field keeps the kind its binding declares.
                let kind = self
                    .section(name)
                    .bindings
                    .iter()
                    .find(|b| b.path == path)
                    .map(|b| b.kind)
                    .or_else(|| builtin_kind(name, field))
                    .unwrap_or(FieldKind::Text);
                coerce::coerce_into(&mut template, &path, kind, &raw)
                    .map_err(|e| invalid(name, field, &e.to_string()))?;
            }
            self.section_mut(name).defaults = template;
        }
        Ok(())
    }

    /// Source columns referenced by any binding, sorted.
    pub fn source_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .sections
            .iter()
            .flat_map(|s| s.bindings.iter().map(|b| b.column.clone()))
            .collect();
        columns.sort();
        columns.dedup();
        columns
    }

    /// Columns referenced by the mapping but absent from `headers`.
    pub fn validate_headers(&self, headers: &[String]) -> Result<(), Vec<String>> {
        let missing: Vec<String> = self
            .source_columns()
            .into_iter()
            .filter(|col| !headers.iter().any(|h| h == col))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }

    /// Mapping document equivalent to this spec.
    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        let mut defaults = Map::new();

        for section in &self.sections {
            if !section.bindings.is_empty() {
                let mut body = Map::new();
                for binding in &section.bindings {
                    let implied = builtin_kind(section.name, &binding.field).unwrap_or(FieldKind::Text);
                    let value = if binding.kind == implied && binding.entry == 1 {
                        Value::String(binding.field.clone())
                    } else {
                        let mut obj = Map::new();
                        obj.insert("field".into(), Value::String(binding.field.clone()));
                        obj.insert("kind".into(), Value::String(binding.kind.as_str().into()));
                        if binding.entry != 1 {
                            obj.insert("entry".into(), Value::from(binding.entry));
                        }
                        Value::Object(obj)
                    };
                    body.insert(binding.column.clone(), value);
                }
                root.insert(section.name.as_str().into(), Value::Object(body));
            }
            if !section.defaults.is_empty() {
                let rendered = serde_json::to_value(&section.defaults).unwrap_or(Value::Null);
                defaults.insert(section.name.as_str().into(), rendered);
            }
        }

        if !defaults.is_empty() {
            root.insert("defaults".into(), Value::Object(defaults));
        }
        Value::Object(root)
    }

    /// Serialize to a pretty JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_value())
    }

    /// The stock mapping for the reference Kordiam spreadsheet layout.
    pub fn reference() -> Self {
        let document = serde_json::json!({
            "_comment": "Reference column layout for Kordiam element imports",
            "element_fields": {
                "Title": "title",
                "Slug": "slug",
                "Note": "note",
                "Element Status": "elementStatus"
            },
            "tasks": {
                "Task Status ID": "status",
                "Task Format ID": "format",
                "Assigned User ID": "user",
                "Task Deadline": "deadline",
                "Confirmation Status": "confirmationStatus",
                "External Link": "externalLink",
                "External Link Title": "externalLinkTitle",
                "Custom Upload Link": "customUploadLink",
                "Task Note": "note"
            },
            "publications": {
                "Publication Status ID": "status",
                "Platform ID": "platform",
                "Category ID": "category",
                "Type ID": "type",
                "External ID": "externalId",
                "Publication Date": "single",
                "Task Assignments": "assignments",
                "CMS ID": "cms_id",
                "Published Content URL": "url_to_published_content",
                "Scope": "scope"
            },
            "groups": {
                "Group IDs": "groups"
            },
            "location": {
                "Location Name": "name",
                "Street": "street",
                "Postal Code": "postalCode",
                "Country": "country",
                "Directions": "directions",
                "City": "city",
                "State Code": "stateShortCode"
            },
            "event": {
                "Event Start Date": "fromDate",
                "Event Start Time": "fromTime",
                "Event End Date": "toDate",
                "Event End Time": "toTime"
            },
            "defaults": {
                "tasks": { "confirmationStatus": -2 }
            }
        });

        match Self::from_value(&document) {
            Ok(spec) => spec,
            // The document above is fixed; an empty mapping is the only sane fallback.
            Err(_) => Self::empty(),
        }
    }
}

fn invalid(section: SectionName, column: &str, message: &str) -> ConfigError {
    ConfigError::InvalidBinding {
        section: section.as_str().to_string(),
        column: column.to_string(),
        message: message.to_string(),
    }
}

fn parse_section(name: SectionName, body: &Value) -> ConfigResult<Vec<FieldBinding>> {
    let columns = body
        .as_object()
        .ok_or_else(|| invalid(name, "", "section must map column names to fields"))?;

    let mut bindings: Vec<FieldBinding> = Vec::new();

    for (column, target) in columns {
        if column.starts_with('_') {
            continue;
        }

        let (field, declared, entry) = match target {
            Value::String(field) => (field.clone(), None, None),
            Value::Object(_) => {
                let obj: BindingObject = serde_json::from_value(target.clone())
                    .map_err(|e| invalid(name, column, &e.to_string()))?;
                (obj.field, obj.kind, obj.entry)
            }
            _ => return Err(invalid(name, column, "expected a field name or a binding object")),
        };

        if field.is_empty() || field.split('.').any(str::is_empty) {
            return Err(invalid(name, column, "target field must be a non-empty dotted path"));
        }

        let entry = match entry {
            None => 1,
            Some(_) if !name.is_repeatable() => {
                return Err(invalid(name, column, "'entry' is only allowed in tasks and publications"));
            }
            Some(0) => return Err(invalid(name, column, "'entry' starts at 1")),
            Some(n) => n,
        };

        let builtin = builtin_kind(name, &field);
        let kind = match (builtin, declared) {
            (Some(expected), Some(declared)) if expected != declared => {
                return Err(ConfigError::KindConflict {
                    section: name.as_str().to_string(),
                    field,
                    expected: expected.as_str(),
                    declared: declared.as_str(),
                });
            }
            (Some(expected), _) => expected,
            (None, Some(declared)) => declared,
            (None, None) => FieldKind::Text,
        };

        let path = target_path(name, &field);

        if name == SectionName::ElementFields {
            let head = path.split('.').next().unwrap_or_default();
            if RESERVED_FIELDS.contains(&head) {
                return Err(ConfigError::ReservedField(field));
            }
        }

        let binding = FieldBinding {
            column: column.clone(),
            field,
            path,
            kind,
            entry,
        };

        // Every groups binding appends to the same list.
        if name != SectionName::Groups {
            if let Some(clash) = bindings
                .iter()
                .filter(|b| b.entry == binding.entry)
                .find(|b| paths_overlap(b, &binding))
            {
                return Err(ConfigError::DuplicateTarget {
                    section: name.as_str().to_string(),
                    target: if clash.path == binding.path {
                        binding.field.clone()
                    } else {
                        format!("{} / {}", clash.field, binding.field)
                    },
                });
            }
        }

        bindings.push(binding);
    }

    Ok(bindings)
}

fn paths_overlap(a: &FieldBinding, b: &FieldBinding) -> bool {
    let nested = |outer: &str, inner: &str| {
        inner == outer || inner.starts_with(&format!("{}.", outer))
    };
    a.written_paths()
        .iter()
        .any(|pa| b.written_paths().iter().any(|pb| nested(pa, pb) || nested(pb, pa)))
}

// =============================================================================
// Tests
// =============================================================================
