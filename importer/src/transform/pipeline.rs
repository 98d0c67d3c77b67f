//! Submission pipeline: rows in, one [`Outcome`] per row out.
//!
//! Per row: assemble, validate, then either render (dry run) or obtain a
//! token and submit. Row-scoped failures are recorded and the run goes on;
//! an authentication failure stops every row that has not started yet.
//!
//! # Example
//!
//! ```rust,ignore
//! use kordiam_importer::transform::{Pipeline, PipelineOptions, ElementAssembler};
//!
//! let options = PipelineOptions { dry_run: true, ..Default::default() };
//! let pipeline = Pipeline::new(ElementAssembler::new(mapping), options, None)?;
//! let report = pipeline.run(sheet.rows).await;
//! println!("{}", report.summary());
//! ```

use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::api::logs::{LogBroadcaster, LogEntry, LOG_BROADCASTER};
use crate::api::Submitter;
use crate::auth::TokenManager;
use crate::error::{AuthError, ConfigError, ConfigResult, RowError, SubmissionError};
use crate::models::{ElementId, Outcome, Row};
use crate::validation::ElementValidator;

use super::assemble::ElementAssembler;

/// Reason recorded for rows that never started because of an auth failure.
pub const ABORTED_REASON: &str = "run aborted: authentication failed";

/// Options for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Render elements instead of submitting them
    pub dry_run: bool,

    /// Rows processed at once (at least 1)
    pub concurrency: usize,

    /// Bound on each submission call
    pub timeout: Duration,

    /// Check every element against the embedded schema
    pub validate: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            concurrency: 1,
            timeout: Duration::from_secs(30),
            validate: true,
        }
    }
}

/// Network collaborators for a submitting run.
#[derive(Clone)]
pub struct Remote {
    pub tokens: Arc<TokenManager>,
    pub submitter: Arc<dyn Submitter>,
}

/// Result of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowReport {
    /// 1-based data-row number
    pub row: usize,
    pub outcome: Outcome,
    /// Pretty JSON of the element, kept for dry runs
    pub rendered: Option<String>,
}

/// A failed row, with enough detail to fix the source data.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureDetail {
    pub row: usize,
    pub column: Option<String>,
    pub reason: String,
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(f, "row {} [{}]: {}", self.row, column, self.reason),
            None => write!(f, "row {}: {}", self.row, self.reason),
        }
    }
}

/// Outcome counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} skipped, {} failed",
            self.created, self.skipped, self.failed
        )
    }
}

/// Everything a run produced, in source order.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub rows: Vec<RowReport>,
    /// The authentication failure that stopped the run, reported once
    pub aborted: Option<AuthError>,
}

impl RunReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.rows.iter().map(|r| &r.outcome)
    }

    pub fn summary(&self) -> RunSummary {
        self.outcomes().fold(RunSummary::default(), |mut acc, outcome| {
            match outcome {
                Outcome::Created(_) => acc.created += 1,
                Outcome::Skipped(_) => acc.skipped += 1,
                Outcome::Failed(_) => acc.failed += 1,
            }
            acc
        })
    }

    pub fn failures(&self) -> Vec<FailureDetail> {
        self.rows
            .iter()
            .filter_map(|r| match &r.outcome {
                Outcome::Failed(err) => Some(FailureDetail {
                    row: r.row,
                    column: err.column().map(str::to_string),
                    reason: failure_reason(err),
                }),
                _ => None,
            })
            .collect()
    }

    /// True when any row failed or the run was aborted.
    pub fn has_failures(&self) -> bool {
        self.aborted.is_some() || self.rows.iter().any(|r| r.outcome.is_failed())
    }
}

/// Reason text without the column prefix, which is reported separately.
fn failure_reason(err: &RowError) -> String {
    match err {
        RowError::Assembly(crate::error::AssemblyError::FieldError { reason, .. }) => reason.to_string(),
        other => other.to_string(),
    }
}

/// Run-wide state shared by the rows of one `run`.
#[derive(Default)]
struct RunState {
    aborted: AtomicBool,
    auth_error: Mutex<Option<AuthError>>,
}

impl RunState {
    fn abort(&self, err: &AuthError) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            *self.auth_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.clone());
        }
    }
}

/// Turns rows into elements and submits them.
pub struct Pipeline {
    assembler: ElementAssembler,
    validator: Option<ElementValidator>,
    remote: Option<Remote>,
    options: PipelineOptions,
    events: LogBroadcaster,
}

impl Pipeline {
    /// Build a pipeline. A submitting run needs `remote`; a dry run ignores it.
    pub fn new(assembler: ElementAssembler, options: PipelineOptions, remote: Option<Remote>) -> ConfigResult<Self> {
        if !options.dry_run && remote.is_none() {
            return Err(ConfigError::MissingSetting("remote connection"));
        }
        if options.concurrency == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "concurrency",
                message: "must be at least 1".to_string(),
            });
        }

        let validator = if options.validate {
            Some(ElementValidator::new()?)
        } else {
            None
        };

        Ok(Self {
            assembler,
            validator,
            remote,
            options,
            events: LOG_BROADCASTER.clone(),
        })
    }

    /// Publish run events on `events` instead of the global broadcaster.
    pub fn with_events(mut self, events: LogBroadcaster) -> Self {
        self.events = events;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Process one row on its own.
    pub async fn process(&self, row_number: usize, row: &Row) -> RowReport {
        self.process_in_run(row_number, row, &RunState::default()).await
    }

    /// Process numbered rows, keeping their order in the report.
    #[instrument(skip_all, fields(rows = rows.len(), dry_run = self.options.dry_run))]
    pub async fn run(&self, rows: Vec<(usize, Row)>) -> RunReport {
        let run_id = Uuid::new_v4();
        let total = rows.len();
        self.events.log(LogEntry::info(format!(
            "Run {} started: {} rows{}",
            run_id,
            total,
            if self.options.dry_run { " (dry run)" } else { "" }
        )));

        let state = RunState::default();
        let reports: Vec<RowReport> = stream::iter(rows)
            .map(|(number, row)| {
                let state = &state;
                async move { self.process_in_run(number, &row, state).await }
            })
            .buffered(self.options.concurrency)
            .collect()
            .await;

        let aborted = state.auth_error.into_inner().unwrap_or_else(PoisonError::into_inner);
        let report = RunReport {
            run_id,
            rows: reports,
            aborted,
        };

        let summary = report.summary();
        match &report.aborted {
            Some(err) => self.events.log(LogEntry::error(format!("Run aborted: {} ({})", err, summary))),
            None if summary.failed > 0 => self.events.log(LogEntry::warning(format!("Run finished: {}", summary))),
            None => self.events.log(LogEntry::success(format!("Run finished: {}", summary))),
        }
        report
    }

    async fn process_in_run(&self, row_number: usize, row: &Row, state: &RunState) -> RowReport {
        let (outcome, rendered) = if state.aborted.load(Ordering::SeqCst) {
            (Outcome::Skipped(ABORTED_REASON.to_string()), None)
        } else {
            self.build_and_submit(row_number, row, state).await
        };

        self.publish(row_number, &outcome);
        RowReport {
            row: row_number,
            outcome,
            rendered,
        }
    }

    async fn build_and_submit(&self, row_number: usize, row: &Row, state: &RunState) -> (Outcome, Option<String>) {
        let element = match self.assembler.assemble(row) {
            Ok(element) => element,
            Err(e) => return (Outcome::Failed(e.into()), None),
        };

        if let Some(validator) = &self.validator {
            if let Err(e) = validator.validate(&element) {
                return (Outcome::Failed(e.into()), None);
            }
        }

        if self.options.dry_run {
            debug!(row = row_number, "Rendered element");
            return (Outcome::Created(ElementId::dry_run(row_number)), Some(element.render()));
        }

        let Some(remote) = &self.remote else {
            return (Outcome::Skipped("no remote connection configured".to_string()), None);
        };

        let token = match remote.tokens.get_token().await {
            Ok(token) => token,
            Err(e) => {
                state.abort(&e);
                return (Outcome::Failed(e.into()), None);
            }
        };

        let submitted = match tokio::time::timeout(self.options.timeout, remote.submitter.submit(&element, &token)).await {
            Ok(result) => result,
            Err(_) => Err(SubmissionError::Timeout(self.options.timeout.as_secs())),
        };

        match submitted {
            Ok(id) => (Outcome::Created(id), None),
            Err(e) => {
                if matches!(e, SubmissionError::Unauthorized(_)) {
                    remote.tokens.invalidate(&token);
                }
                (Outcome::Failed(e.into()), None)
            }
        }
    }

    fn publish(&self, row_number: usize, outcome: &Outcome) {
        let entry = match outcome {
            Outcome::Created(id) if id.is_dry_run() => LogEntry::info("Element rendered (dry run)"),
            Outcome::Created(id) => LogEntry::success(format!("Element created: {}", id)),
            Outcome::Skipped(reason) => LogEntry::warning(format!("Skipped: {}", reason)),
            Outcome::Failed(err) => LogEntry::error(format!("Failed: {}", err)),
        };
        self.events.log(entry.for_row(row_number));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TokenResponse;
    use crate::api::logs::LogLevel;
    use crate::auth::{AccessToken, TokenFetcher};
    use crate::error::{AssemblyError, AuthResult};
    use crate::mapping::MappingSpec;
    use crate::models::Element;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TokenFetcher for CountingFetcher {
        async fn request_token(&self) -> AuthResult<TokenResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AuthError::Rejected {
                    status: 401,
                    body: "invalid_client".to_string(),
                });
            }
            Ok(TokenResponse {
                access_token: "tok".to_string(),
                token_type: Some("Bearer".to_string()),
                expires_in: 3600,
            })
        }
    }

    /// Submitter returning ids in call order, with scripted failures by title.
    struct FakeSubmitter {
        calls: AtomicUsize,
        reject_title: Option<&'static str>,
        unauthorized: bool,
    }

    #[async_trait]
    impl Submitter for FakeSubmitter {
        async fn submit(&self, element: &Element, _token: &AccessToken) -> Result<ElementId, SubmissionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.unauthorized {
                return Err(SubmissionError::Unauthorized(401));
            }
            let title = element.to_value()["title"].as_str().map(str::to_string);
            if title.as_deref().is_some_and(|t| Some(t) == self.reject_title) {
                return Err(SubmissionError::Rejected {
                    status: 400,
                    body: "bad element".to_string(),
                });
            }
            Ok(ElementId::new(format!("id-{}", n)))
        }
    }

    fn fetcher(fail: bool) -> Arc<CountingFetcher> {
        Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    fn submitter(reject_title: Option<&'static str>, unauthorized: bool) -> Arc<FakeSubmitter> {
        Arc::new(FakeSubmitter {
            calls: AtomicUsize::new(0),
            reject_title,
            unauthorized,
        })
    }

    fn assembler() -> ElementAssembler {
        ElementAssembler::new(Arc::new(MappingSpec::reference()))
    }

    fn rows() -> Vec<(usize, Row)> {
        vec![
            (1, [("Title", "A"), ("Group IDs", "5")].into_iter().collect()),
            (2, [("Title", "B")].into_iter().collect()),
            (3, [("Title", "C"), ("Task Status ID", "1"), ("Task Format ID", "18")].into_iter().collect()),
        ]
    }

    fn networked(fetcher: Arc<CountingFetcher>, submitter: Arc<FakeSubmitter>, concurrency: usize) -> Pipeline {
        let options = PipelineOptions {
            concurrency,
            ..Default::default()
        };
        let remote = Remote {
            tokens: Arc::new(TokenManager::new(fetcher)),
            submitter,
        };
        Pipeline::new(assembler(), options, Some(remote)).unwrap()
    }

    fn dry_run() -> Pipeline {
        let options = PipelineOptions {
            dry_run: true,
            ..Default::default()
        };
        Pipeline::new(assembler(), options, None).unwrap()
    }

    #[test]
    fn test_submitting_pipeline_requires_remote() {
        let result = Pipeline::new(assembler(), PipelineOptions::default(), None);
        assert!(matches!(result, Err(ConfigError::MissingSetting(_))));
    }

    #[tokio::test]
    async fn test_dry_run_renders_and_marks_rows() {
        let report = dry_run().run(rows()).await;

        assert_eq!(report.rows[0].outcome, Outcome::Created(ElementId::dry_run(1)));
        assert!(report.rows[0].rendered.as_deref().unwrap().contains("\"groups\""));
        assert_eq!(
            report.rows[1].outcome,
            Outcome::Failed(RowError::Assembly(AssemblyError::NoContent))
        );
        assert_eq!(report.summary(), RunSummary { created: 2, skipped: 0, failed: 1 });
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn test_dry_run_is_idempotent() {
        let pipeline = dry_run();
        let first = pipeline.run(rows()).await;
        let second = pipeline.run(rows()).await;
        assert_eq!(first.rows, second.rows);
        assert_ne!(first.run_id, second.run_id);
    }

    #[tokio::test]
    async fn test_submission_failures_are_per_row() {
        let fetcher = fetcher(false);
        let submitter = submitter(Some("A"), false);
        let report = networked(fetcher.clone(), submitter.clone(), 1).run(rows()).await;

        assert!(matches!(
            report.rows[0].outcome,
            Outcome::Failed(RowError::Submission(SubmissionError::Rejected { status: 400, .. }))
        ));
        assert!(report.rows[1].outcome.is_failed());
        assert_eq!(report.rows[2].outcome, Outcome::Created(ElementId::new("id-2")));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 2);
        assert!(report.aborted.is_none());
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_remaining_rows() {
        crate::logging::init_test();
        let fetcher = fetcher(true);
        let submitter = submitter(None, false);
        let report = networked(fetcher.clone(), submitter.clone(), 1).run(rows()).await;

        assert!(matches!(report.rows[0].outcome, Outcome::Failed(RowError::Auth(_))));
        assert_eq!(report.rows[1].outcome, Outcome::Skipped(ABORTED_REASON.to_string()));
        assert_eq!(report.rows[2].outcome, Outcome::Skipped(ABORTED_REASON.to_string()));
        assert!(matches!(report.aborted, Some(AuthError::Rejected { status: 401, .. })));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_submission_invalidates_token() {
        let fetcher = fetcher(false);
        let submitter = submitter(None, true);
        let report = networked(fetcher.clone(), submitter.clone(), 1).run(rows()).await;

        assert!(matches!(
            report.rows[0].outcome,
            Outcome::Failed(RowError::Submission(SubmissionError::Unauthorized(401)))
        ));
        assert!(report.rows[2].outcome.is_failed());
        // A fresh token for each row after the rejection, no resubmission.
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_run_keeps_order_and_shares_token() {
        let fetcher = fetcher(false);
        let submitter = submitter(None, false);
        let many: Vec<(usize, Row)> = (1..=20)
            .map(|n| {
                let row: Row = [("Title", format!("T{}", n)), ("Group IDs", n.to_string())]
                    .into_iter()
                    .collect();
                (n, row)
            })
            .collect();

        let report = networked(fetcher.clone(), submitter, 8).run(many).await;

        let numbers: Vec<usize> = report.rows.iter().map(|r| r.row).collect();
        assert_eq!(numbers, (1..=20).collect::<Vec<_>>());
        assert_eq!(report.summary().created, 20);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_details_name_the_column() {
        let bad: Vec<(usize, Row)> = vec![(4, [("Title", "X"), ("Task Status ID", "open")].into_iter().collect())];
        let report = dry_run().run(bad).await;

        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].row, 4);
        assert_eq!(failures[0].column.as_deref(), Some("Task Status ID"));
        assert!(failures[0].reason.contains("integer"));
        assert!(failures[0].to_string().starts_with("row 4 [Task Status ID]"));
    }

    #[tokio::test]
    async fn test_row_events_are_published() {
        let events = LogBroadcaster::new();
        let mut rx = events.subscribe();
        let pipeline = dry_run().with_events(events);

        pipeline.run(rows()).await;

        let mut row_events = Vec::new();
        while let Ok(entry) = rx.try_recv() {
            if entry.row.is_some() {
                row_events.push(entry);
            }
        }
        assert_eq!(row_events.len(), 3);
        assert_eq!(row_events[1].level, LogLevel::Error);
    }
}
