pub mod clients;
pub mod types;

pub use types::{DiagnoseRequest, Diagnostic, PipelineResult, Solution};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, instrument, warn, Instrument};

use crate::pr::{ChangeRequestManager, ChangeRequestResult, CreatePrRequest};
use types::{ContextSummary, ErrorSummary, FixOutcome, Outcome};

/// Pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    Diagnostics,
    Solution,
    PullRequest,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Diagnostics => write!(f, "diagnostics"),
            Step::Solution => write!(f, "solution"),
            Step::PullRequest => write!(f, "pullRequest"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No error found for the given criteria")]
    NotFound,

    #[error("{step} service failed: {message}")]
    Upstream { step: Step, message: String },

    #[error("{step} service did not answer within {after:?}")]
    Timeout { step: Step, after: Duration },
}

impl PipelineError {
    pub fn step(&self) -> Step {
        match self {
            PipelineError::NotFound => Step::Diagnostics,
            PipelineError::Upstream { step, .. } | PipelineError::Timeout { step, .. } => *step,
        }
    }
}

/// Produces a [`Diagnostic`] for a transaction or scope.
#[async_trait]
pub trait DiagnosticProvider: Send + Sync {
    /// `Ok(None)` means the provider found no matching error.
    async fn diagnose(&self, request: &DiagnoseRequest) -> Result<Option<Diagnostic>, PipelineError>;

    /// Best-effort liveness probe.
    async fn healthy(&self) -> bool;
}

/// Produces a [`Solution`] for a [`Diagnostic`].
#[async_trait]
pub trait SolutionGenerator: Send + Sync {
    async fn generate(&self, diagnostic: &Diagnostic) -> Result<Solution, PipelineError>;

    async fn healthy(&self) -> bool;
}

/// Files a change request for a code fix.
#[async_trait]
pub trait ChangeRequestFiler: Send + Sync {
    async fn file(&self, request: CreatePrRequest) -> Result<ChangeRequestResult, PipelineError>;
}

#[async_trait]
impl ChangeRequestFiler for ChangeRequestManager {
    async fn file(&self, request: CreatePrRequest) -> Result<ChangeRequestResult, PipelineError> {
        self.create(request)
            .await
            .map_err(|e| PipelineError::Upstream {
                step: Step::PullRequest,
                message: e.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Ok,
    Down,
}

impl From<bool> for ServiceState {
    fn from(up: bool) -> Self {
        if up {
            ServiceState::Ok
        } else {
            ServiceState::Down
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub llm1: ServiceState,
    pub llm2: ServiceState,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub services: ServiceHealth,
}

impl HealthReport {
    pub fn all_ok(&self) -> bool {
        self.services.llm1 == ServiceState::Ok && self.services.llm2 == ServiceState::Ok
    }
}

/// Sequences diagnosis, solution generation and (for code fixes) change
/// request filing. Holds no mutable state.
pub struct Coordinator {
    diagnostics: Arc<dyn DiagnosticProvider>,
    solutions: Arc<dyn SolutionGenerator>,
    change_requests: Arc<dyn ChangeRequestFiler>,
    step_timeout: Duration,
    read_timeout: Duration,
    filing_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        diagnostics: Arc<dyn DiagnosticProvider>,
        solutions: Arc<dyn SolutionGenerator>,
        change_requests: Arc<dyn ChangeRequestFiler>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            diagnostics,
            solutions,
            change_requests,
            step_timeout,
            read_timeout: step_timeout,
            filing_timeout: step_timeout,
        }
    }

    /// Deadline for retried reads (diagnosis and health probes). Should cover
    /// every attempt the provider clients make, backoff included.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Deadline for change request filing, which may span a whole VCS
    /// publish sequence and so usually needs longer than the other steps.
    pub fn with_filing_timeout(mut self, timeout: Duration) -> Self {
        self.filing_timeout = timeout;
        self
    }

    /// Run one diagnosis request end to end.
    ///
    /// Diagnosis and solution failures abort the run. A failed change request
    /// does not: the fix is still returned, without `pr` and with `prError` set.
    #[instrument(skip_all, fields(
        transaction_id = request.transaction_id.as_deref().unwrap_or("N/A"),
        scope_id = request.scope_id.as_deref().unwrap_or("N/A"),
        time_range = request.time_range_or_default(),
    ))]
    pub async fn run_diagnosis(&self, request: &DiagnoseRequest) -> Result<PipelineResult, PipelineError> {
        info!("[1/3] requesting diagnosis");
        let diagnostic = self
            .bounded_by(self.read_timeout, Step::Diagnostics, self.diagnostics.diagnose(request))
            .instrument(info_span!("step", name = "diagnostics"))
            .await?
            .ok_or(PipelineError::NotFound)?;
        info!(
            category = %diagnostic.error.category,
            message = %diagnostic.error.message,
            file = diagnostic.source.file.as_deref().unwrap_or("unknown"),
            line = diagnostic.source.line,
            "diagnosis complete"
        );

        info!("[2/3] requesting solution");
        let solution = self
            .bounded(Step::Solution, self.solutions.generate(&diagnostic))
            .instrument(info_span!("step", name = "solution"))
            .await?;
        let solution_type = solution.kind();
        info!(solution_type = %solution_type, "solution generated");

        let outcome = match solution {
            Solution::CodeFix { fix } => {
                info!("[3/3] filing change request");
                let filing = CreatePrRequest {
                    repository: Some(diagnostic.repository.repository.clone()),
                    branch: diagnostic.repository.branch.clone(),
                    fix: Some(fix.clone()),
                    error: Some(diagnostic.error.clone()),
                };
                let filed = self
                    .bounded_by(self.filing_timeout, Step::PullRequest, self.change_requests.file(filing))
                    .instrument(info_span!("step", name = "pullRequest"))
                    .await;
                let (pr, pr_error) = match filed {
                    Ok(pr) => {
                        info!(mode = %pr.mode, url = %pr.pr_url, "change request filed");
                        (Some(pr), None)
                    }
                    Err(e) => {
                        warn!(error = %e, "change request filing failed, returning fix without it");
                        (None, Some(e.to_string()))
                    }
                };
                Outcome::Fix(FixOutcome {
                    file: fix.file,
                    line: fix.line,
                    explanation: fix.explanation,
                    original_code: fix.original_code,
                    fixed_code: fix.fixed_code,
                    pr,
                    pr_error,
                })
            }
            Solution::AlertSuggestion { alert } => {
                info!("[3/3] skipping change request for alert suggestion");
                Outcome::Alert(alert)
            }
        };

        Ok(PipelineResult {
            success: true,
            transaction_id: request.transaction_id.clone(),
            scope_id: request.scope_id.clone(),
            solution_type,
            error: ErrorSummary {
                message: diagnostic.error.message,
                kind: diagnostic.error.kind,
                category: diagnostic.error.category,
            },
            context: ContextSummary {
                container_name: diagnostic.context.container_name,
                occurrence_count: diagnostic.context.occurrence_count,
                repository: diagnostic.repository.repository,
                source_file: diagnostic.source.file,
                source_line: diagnostic.source.line,
            },
            outcome,
        })
    }

    /// Probe both collaborators concurrently.
    pub async fn health(&self) -> HealthReport {
        let (llm1, llm2) = tokio::join!(
            self.probe("llm1", self.diagnostics.healthy()),
            self.probe("llm2", self.solutions.healthy()),
        );
        let services = ServiceHealth {
            llm1: llm1.into(),
            llm2: llm2.into(),
        };
        let status = if llm1 && llm2 { "ok" } else { "degraded" };
        HealthReport { status, services }
    }

    async fn probe(&self, name: &str, check: impl Future<Output = bool>) -> bool {
        let up = tokio::time::timeout(self.read_timeout, check)
            .await
            .unwrap_or(false);
        if !up {
            warn!(service = name, "dependency unhealthy");
        }
        up
    }

    async fn bounded<T>(
        &self,
        step: Step,
        call: impl Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        self.bounded_by(self.step_timeout, step, call).await
    }

    async fn bounded_by<T>(
        &self,
        limit: Duration,
        step: Step,
        call: impl Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(PipelineError::Timeout { step, after: limit }))
    }
}
