//! Element assembler
//!
//! Composes one [`Element`] per row from the section builders.
//!
//! # Pipeline
//!
//! ```text
//! Row ──┬─ element_fields ─┐
//!       ├─ tasks[] ────────┤
//!       ├─ publications[] ─┤──> Element (>= 1 task, publication or group)
//!       ├─ groups ─────────┤
//!       ├─ location ───────┤
//!       └─ event ──────────┘
//! ```

use std::sync::Arc;

use crate::error::AssemblyError;
use crate::mapping::{MappingSpec, SectionName};
use crate::models::{CoercedValue, Element, Row};

use super::section;

/// Builds elements from rows with a fixed mapping.
#[derive(Debug, Clone)]
pub struct ElementAssembler {
    mapping: Arc<MappingSpec>,
    default_assignments: bool,
}

impl ElementAssembler {
    pub fn new(mapping: Arc<MappingSpec>) -> Self {
        Self {
            mapping,
            default_assignments: true,
        }
    }

    /// When on (the default), a publication without `assignments` on an
    /// element with tasks is assigned to every task.
    pub fn with_default_assignments(mut self, enabled: bool) -> Self {
        self.default_assignments = enabled;
        self
    }

    pub fn mapping(&self) -> &MappingSpec {
        &self.mapping
    }

    /// Assemble one row. Any coercion failure aborts the whole row.
    pub fn assemble(&self, row: &Row) -> Result<Element, AssemblyError> {
        let mapping = &self.mapping;

        let fields = section::build(row, mapping.section(SectionName::ElementFields))?.unwrap_or_default();
        let tasks = section::build_entries(row, mapping.section(SectionName::Tasks))?;
        let mut publications = section::build_entries(row, mapping.section(SectionName::Publications))?;
        let groups = section::build_groups(row, mapping.section(SectionName::Groups))?;
        let location = section::build(row, mapping.section(SectionName::Location))?;
        let event = section::build(row, mapping.section(SectionName::Event))?;

        if self.default_assignments && !tasks.is_empty() {
            for publication in publications.iter_mut() {
                if !publication.contains_path("assignments") {
                    publication.insert_path(
                        "assignments",
                        CoercedValue::BooleanList(vec![true; tasks.len()]),
                    );
                }
            }
        }

        Element::new(fields, tasks, publications, groups, location, event)
    }
}

/// Assemble a row with default options.
pub fn assemble(row: &Row, mapping: &MappingSpec) -> Result<Element, AssemblyError> {
    ElementAssembler::new(Arc::new(mapping.clone())).assemble(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoercionError;
    use crate::models::RawValue;
    use chrono::NaiveDate;
    use serde_json::json;

    fn mapping(document: serde_json::Value) -> MappingSpec {
        MappingSpec::from_value(&document).unwrap()
    }

    fn task_mapping() -> MappingSpec {
        mapping(json!({
            "element_fields": { "Title": "title" },
            "tasks": { "Task Status ID": "status", "Task Format ID": "format" }
        }))
    }

    #[test]
    fn test_title_and_task() {
        let row: Row = [("Title", "A"), ("Task Status ID", "1"), ("Task Format ID", "18")]
            .into_iter()
            .collect();
        let element = assemble(&row, &task_mapping()).unwrap();
        assert_eq!(
            element.to_value(),
            json!({"title": "A", "tasks": [{"status": 1, "format": 18}]})
        );
    }

    #[test]
    fn test_title_only_has_no_content() {
        let row: Row = [("Title", "B")].into_iter().collect();
        assert_eq!(assemble(&row, &task_mapping()), Err(AssemblyError::NoContent));
    }

    #[test]
    fn test_no_content_regardless_of_other_sections() {
        let mapping = mapping(json!({
            "element_fields": { "Title": "title" },
            "tasks": { "Task Status ID": "status" },
            "publications": { "Platform ID": "platform" },
            "groups": { "Group IDs": "groups" },
            "location": { "City": "city" },
            "event": { "Event Start Date": "fromDate" }
        }));
        let row: Row = [
            ("Title", "C"),
            ("City", "Springfield"),
            ("Event Start Date", "2024-04-01"),
            ("Task Status ID", " "),
            ("Group IDs", ""),
        ]
        .into_iter()
        .collect();
        assert_eq!(assemble(&row, &mapping), Err(AssemblyError::NoContent));
    }

    #[test]
    fn test_each_content_section_alone_is_enough() {
        let mapping = mapping(json!({
            "tasks": { "Task Status ID": "status" },
            "publications": { "Platform ID": "platform" },
            "groups": { "Group IDs": "groups" }
        }));

        let element = assemble(&[("Task Status ID", "2")].into_iter().collect(), &mapping).unwrap();
        assert_eq!(element.tasks().len(), 1);

        let element = assemble(&[("Platform ID", "4")].into_iter().collect(), &mapping).unwrap();
        assert_eq!(element.publications().len(), 1);

        let element = assemble(&[("Group IDs", "5,8")].into_iter().collect(), &mapping).unwrap();
        assert_eq!(element.groups(), &[5, 8]);
    }

    #[test]
    fn test_native_deadline_becomes_date_time_pair() {
        let mapping = mapping(json!({ "tasks": { "Task Deadline": "deadline" } }));
        let deadline = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(16, 30, 0)
            .unwrap();
        let mut row = Row::new();
        row.insert("Task Deadline", RawValue::DateTime(deadline));

        let element = assemble(&row, &mapping).unwrap();
        assert_eq!(
            element.to_value(),
            json!({"tasks": [{"deadline": {"date": "2024-03-15", "time": "16:30"}}]})
        );
    }

    #[test]
    fn test_default_assignments_follow_task_count() {
        let mapping = mapping(json!({
            "tasks": { "Task Status ID": "status" },
            "publications": { "Platform ID": "platform", "Publication Date": "single" }
        }));
        let row: Row = [
            ("Task Status ID", "1"),
            ("Platform ID", "2"),
            ("Publication Date", "2024-03-16 07:00"),
        ]
        .into_iter()
        .collect();

        let element = assemble(&row, &mapping).unwrap();
        assert_eq!(
            element.to_value()["publications"],
            json!([{
                "platform": 2,
                "single": {"start": {"date": "2024-03-16", "time": "07:00"}},
                "assignments": [true]
            }])
        );

        let plain = ElementAssembler::new(Arc::new(mapping))
            .with_default_assignments(false)
            .assemble(&row)
            .unwrap();
        assert!(plain.to_value()["publications"][0].get("assignments").is_none());
    }

    #[test]
    fn test_coercion_failure_aborts_row() {
        let mapping = mapping(json!({
            "tasks": { "Task Status ID": "status" },
            "publications": { "Task Assignments": "assignments" }
        }));
        let row: Row = [("Task Status ID", "1"), ("Task Assignments", "yes,no")]
            .into_iter()
            .collect();

        let err = assemble(&row, &mapping).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::FieldError {
                column: "Task Assignments".into(),
                reason: CoercionError::NotBoolean { token: "yes".into() },
            }
        );
    }

    #[test]
    fn test_reference_mapping_full_row() {
        let row: Row = [
            ("Title", "Weather Alert"),
            ("Element Status", "4"),
            ("Task Status ID", "1"),
            ("Task Format ID", "19"),
            ("Task Deadline", "2024-03-15 08:00"),
            ("Publication Status ID", "2"),
            ("Task Assignments", "true"),
            ("Group IDs", "12"),
            ("City", "Springfield"),
        ]
        .into_iter()
        .collect();

        let element = assemble(&row, &MappingSpec::reference()).unwrap();
        assert_eq!(
            element.to_value(),
            json!({
                "title": "Weather Alert",
                "elementStatus": 4,
                "tasks": [{
                    "status": 1,
                    "format": 19,
                    "deadline": {"date": "2024-03-15", "time": "08:00"},
                    "confirmationStatus": -2
                }],
                "publications": [{"status": 2, "assignments": [true]}],
                "groups": [12],
                "location": {"city": "Springfield"}
            })
        );
    }
}
