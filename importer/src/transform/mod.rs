//! Transformation module.
//!
//! - Coerce: raw cells to typed values
//! - Section: one section object (or repeated entries) from a row
//! - Assemble: full elements from the section builders
//! - Pipeline: assemble, validate and submit rows

pub mod assemble;
pub mod coerce;
pub mod pipeline;
pub mod section;

pub use assemble::{assemble, ElementAssembler};
pub use pipeline::{
    FailureDetail, Pipeline, PipelineOptions, Remote, RowReport, RunReport, RunSummary, ABORTED_REASON,
};
