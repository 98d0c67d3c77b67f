//! Section builder
//!
//! Builds the object(s) of one element section from a row and the section's
//! bindings. A section with no populated cell builds to nothing.

use crate::error::{AssemblyError, CoercionError};
use crate::mapping::{FieldBinding, SectionSpec};
use crate::models::{CoercedValue, Row, SectionObject};

use super::coerce;

fn field_error(binding: &FieldBinding, reason: CoercionError) -> AssemblyError {
    AssemblyError::FieldError {
        column: binding.column.clone(),
        reason,
    }
}

/// Build one sub-entry of a section.
///
/// Returns `None` when none of the entry's columns carries data. Section
/// defaults are filled in only for entries that already have data.
pub fn build_entry(
    row: &Row,
    spec: &SectionSpec,
    entry: usize,
) -> Result<Option<SectionObject>, AssemblyError> {
    let mut object = SectionObject::new();

    for binding in spec.bindings_for_entry(entry) {
        if let Some(raw) = row.value(&binding.column) {
            coerce::coerce_into(&mut object, &binding.path, binding.kind, raw)
                .map_err(|reason| field_error(binding, reason))?;
        }
    }

    if object.is_empty() {
        return Ok(None);
    }
    object.fill_missing(&spec.defaults);
    Ok(Some(object))
}

/// Build a single-object section (`element_fields`, `location`, `event`).
pub fn build(row: &Row, spec: &SectionSpec) -> Result<Option<SectionObject>, AssemblyError> {
    build_entry(row, spec, 1)
}

/// Build every populated sub-entry of a repeatable section, in entry order.
pub fn build_entries(row: &Row, spec: &SectionSpec) -> Result<Vec<SectionObject>, AssemblyError> {
    let mut entries = Vec::new();
    for entry in spec.entries() {
        if let Some(object) = build_entry(row, spec, entry)? {
            entries.push(object);
        }
    }
    Ok(entries)
}

/// Build the group id list: every populated groups column, in binding order.
pub fn build_groups(row: &Row, spec: &SectionSpec) -> Result<Vec<i64>, AssemblyError> {
    let mut groups = Vec::new();

    for binding in &spec.bindings {
        let Some(raw) = row.value(&binding.column) else {
            continue;
        };
        // Groups bindings are always integer_list; the mapping rejects other kinds.
        if let coerce::Coerced::Value(CoercedValue::IntegerList(ids)) =
            coerce::coerce(raw, binding.kind).map_err(|reason| field_error(binding, reason))?
        {
            groups.extend(ids);
        }
    }

    Ok(groups)
}
