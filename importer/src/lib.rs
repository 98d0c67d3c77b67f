//! # Kordiam Importer - bulk element creation from spreadsheets
//!
//! Reads CSV or Excel rows, turns each row into a nested Kordiam element
//! according to a column mapping, and submits the elements with a
//! client-credentials bearer token. A failing row never stops the run; a
//! failing token request does.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ CSV / XLSX  │────▶│   Parser    │────▶│  Assemble   │────▶│  Validate   │
//! │ (auto-enc)  │     │   (rows)    │     │  (mapping)  │     │  (schema)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    │
//!                           ┌─────────────┐     ┌─────────────┐      │
//!                           │ TokenManager│────▶│  Submitter  │◀─────┘
//!                           │(single flight)    │ (POST JSON) │
//!                           └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kordiam_importer::{read_rows, ElementAssembler, MappingSpec, Pipeline, PipelineOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sheet = read_rows("elements.xlsx", None)?;
//!     let assembler = ElementAssembler::new(Arc::new(MappingSpec::reference()));
//!     let options = PipelineOptions { dry_run: true, ..Default::default() };
//!     let report = Pipeline::new(assembler, options, None)?.run(sheet.rows).await;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error hierarchy by handling scope
//! - [`models`] - Rows, coerced values, elements, outcomes
//! - [`mapping`] - Column-to-field mapping and its validation
//! - [`parser`] - CSV and Excel readers
//! - [`transform`] - Coercion, section building, assembly, pipeline
//! - [`validation`] - Element schema validation
//! - [`auth`] - Client-credentials token lifecycle
//! - [`api`] - Element API client and run events
//! - [`config`] - Settings from file and environment
//! - [`logging`] - Tracing subscriber setup

// Core modules
pub mod error;
pub mod models;

// Mapping and input
pub mod mapping;
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Remote API
pub mod api;
pub mod auth;

// Ambient
pub mod config;
pub mod logging;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    AssemblyError, AuthError, CoercionError, ConfigError, ImportError, ReadError, RowError,
    SubmissionError, ValidationError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CoercedValue, Element, ElementId, Outcome, RawValue, Row, SectionObject, SectionValue,
};

// =============================================================================
// Re-exports - Mapping
// =============================================================================

pub use mapping::{FieldBinding, FieldKind, MappingSpec, SectionName, SectionSpec};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{read_csv_bytes, read_excel, read_rows, Sheet, SourceFormat};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    assemble, ElementAssembler, FailureDetail, Pipeline, PipelineOptions, Remote, RowReport,
    RunReport, RunSummary,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::ElementValidator;

// =============================================================================
// Re-exports - Auth and API
// =============================================================================

pub use api::{KordiamClient, Submitter};
pub use auth::{AccessToken, ClientCredentialsClient, TokenFetcher, TokenManager};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{Connection, ImporterConfig};
