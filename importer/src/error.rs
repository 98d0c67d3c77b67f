//! Error types for the Kordiam import pipeline.
//!
//! The hierarchy follows the scope in which each error is handled:
//!
//! - [`CoercionError`] - a raw cell does not fit the declared field kind
//! - [`AssemblyError`] - a row cannot become an element (row-scoped)
//! - [`ValidationError`] - an assembled element breaks the element schema (row-scoped)
//! - [`AuthError`] - the token request failed (run-scoped, fatal)
//! - [`SubmissionError`] - the remote API rejected one element (row-scoped)
//! - [`ConfigError`] - malformed mapping or settings (fatal at startup)
//! - [`ReadError`] - the input spreadsheet cannot be read (fatal at startup)
//! - [`ImportError`] - top-level error returned by the CLI entry points
//!
//! Row-scoped errors are collected into [`RowError`] and recorded as a
//! failed outcome; the others stop the run.

use thiserror::Error;

// =============================================================================
// Field Coercion Errors
// =============================================================================

/// A raw value could not be interpreted as the declared field kind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    /// Not an integer (digits with an optional leading `-`).
    #[error("expected an integer, got '{0}'")]
    NotInteger(String),

    /// Not a `YYYY-MM-DD` date.
    #[error("expected a date (YYYY-MM-DD), got '{0}'")]
    NotDate(String),

    /// Not an `HH:MM` time.
    #[error("expected a time (HH:MM), got '{0}'")]
    NotTime(String),

    /// Not a date optionally followed by a time.
    #[error("expected a date and time (YYYY-MM-DD HH:MM), got '{0}'")]
    NotDateTime(String),

    /// One token of a boolean list is neither `true` nor `false`.
    #[error("expected true or false, got '{token}'")]
    NotBoolean { token: String },

    /// The raw value type cannot be converted to this kind at all.
    #[error("a {value_type} value cannot be used as {kind}")]
    UnsupportedValue {
        value_type: &'static str,
        kind: &'static str,
    },
}

// =============================================================================
// Assembly Errors
// =============================================================================

/// A row could not be assembled into an element.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    /// None of tasks, publications or groups carries any data.
    #[error("element must contain at least one task, publication or group")]
    NoContent,

    /// A populated cell failed coercion.
    #[error("column '{column}': {reason}")]
    FieldError {
        column: String,
        #[source]
        reason: CoercionError,
    },
}

// =============================================================================
// Validation Errors
// =============================================================================

/// An assembled element does not satisfy the element schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Schema validation failed.
    #[error("element failed schema validation: {}", .errors.join("; "))]
    Schema { errors: Vec<String> },
}

// =============================================================================
// Authentication Errors
// =============================================================================

/// The client-credentials token request failed.
///
/// `Clone` because one in-flight request result is handed to every waiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthError {
    /// Transport failure while calling the token endpoint.
    #[error("token request failed: {0}")]
    Network(String),

    /// The token endpoint did not answer within the configured timeout.
    #[error("token request timed out after {0}s")]
    Timeout(u64),

    /// The token endpoint answered with a non-success status.
    #[error("token endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The response body is not a token response.
    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    /// Even a freshly issued token expires within the refresh margin.
    #[error("issued token lives {expires_in}s, less than the {margin}s refresh margin")]
    TokenLifetimeTooShort { expires_in: i64, margin: i64 },
}

// =============================================================================
// Submission Errors
// =============================================================================

/// The element-creation endpoint rejected or lost one element.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmissionError {
    /// 401/403: the bearer token is no longer accepted.
    #[error("submission unauthorized (HTTP {0})")]
    Unauthorized(u16),

    /// Any other non-success status.
    #[error("element rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Transport failure.
    #[error("submission failed: {0}")]
    Network(String),

    /// No answer within the configured timeout.
    #[error("submission timed out after {0}s")]
    Timeout(u64),

    /// Success status but no usable identifier in the body.
    #[error("malformed creation response: {0}")]
    MalformedResponse(String),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Malformed mapping or settings. Always fatal, raised before any row.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A top-level mapping key is not a known section.
    #[error("unknown mapping section '{0}'")]
    UnknownSection(String),

    /// Two bindings in one section write the same target (or one nests inside the other).
    #[error("section '{section}': target '{target}' is mapped more than once")]
    DuplicateTarget { section: String, target: String },

    /// A top-level field would overwrite a nested section.
    #[error("element_fields cannot target reserved field '{0}'")]
    ReservedField(String),

    /// An explicit kind disagrees with the target schema.
    #[error("section '{section}': field '{field}' must be {expected}, mapping declares {declared}")]
    KindConflict {
        section: String,
        field: String,
        expected: &'static str,
        declared: &'static str,
    },

    /// A binding value is neither a field name nor a binding object.
    #[error("section '{section}', column '{column}': {message}")]
    InvalidBinding {
        section: String,
        column: String,
        message: String,
    },

    /// A required connection setting is absent.
    #[error("missing setting '{0}' (set it in the config file or the environment)")]
    MissingSetting(&'static str),

    /// A setting has an unusable value.
    #[error("invalid setting '{name}': {message}")]
    InvalidSetting { name: &'static str, message: String },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

// =============================================================================
// Input Reading Errors
// =============================================================================

/// The input spreadsheet could not be turned into rows.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Failed to read file.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV.
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed workbook.
    #[error("invalid workbook: {0}")]
    Excel(String),

    /// Extension is neither csv nor xlsx/xls.
    #[error("unsupported input format '{0}'")]
    UnsupportedFormat(String),

    /// Requested sheet does not exist.
    #[error("sheet '{0}' not found")]
    SheetNotFound(String),

    /// No header row.
    #[error("no headers found")]
    NoHeaders,
}

// =============================================================================
// Row Errors
// =============================================================================

/// Detail of a failed row, as recorded in its outcome.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

impl RowError {
    /// Offending column, when the failure is tied to one cell.
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::Assembly(AssemblyError::FieldError { column, .. }) => Some(column),
            _ => None,
        }
    }
}

// =============================================================================
// Top-level Errors
// =============================================================================

/// Errors that stop an import run.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("input error: {0}")]
    Read(#[from] ReadError),

    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("remote API error: {0}")]
    Submission(#[from] SubmissionError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for coercion.
pub type CoercionResult<T> = Result<T, CoercionError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for input reading.
pub type ReadResult<T> = Result<T, ReadError>;

/// Result type for token acquisition.
pub type AuthResult<T> = Result<T, AuthError>;
