//! HTTP clients for the pipeline's collaborators.
//!
//! Every call carries the client's request timeout. Reads that are safe to
//! repeat (diagnosis lookups, health probes) go through [`ReadRetry`];
//! solution generation and change request filing are attempted once.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use super::{
    ChangeRequestFiler, DiagnoseRequest, Diagnostic, DiagnosticProvider, PipelineError, Solution,
    SolutionGenerator, Step,
};
use crate::pr::{ChangeRequestResult, CreatePrRequest};

/// Shared reqwest client with a per-request deadline.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("fix-pipeline")
        .timeout(timeout)
        .build()
}

/// Bounded retry for idempotent reads: transport failures and 5xx answers
/// are retried with linear backoff, everything else returns immediately.
#[derive(Debug, Clone, Copy)]
pub struct ReadRetry {
    pub attempts: u32,
    pub backoff: Duration,
}

impl ReadRetry {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: Duration::from_millis(200),
        }
    }

    /// Worst-case wall time of [`run`](Self::run) when every attempt takes
    /// `per_attempt`: all attempts plus the linear backoff between them.
    pub fn budget(&self, per_attempt: Duration) -> Duration {
        let sleeps = (1..self.attempts).fold(Duration::ZERO, |acc, attempt| {
            acc.saturating_add(self.backoff.saturating_mul(attempt))
        });
        per_attempt.saturating_mul(self.attempts).saturating_add(sleeps)
    }

    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> reqwest::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = reqwest::Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if attempt < self.attempts && is_retryable(&e) => {
                    warn!(call = what, attempt, error = %e, "retrying read");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

fn is_retryable(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
}

fn upstream(step: Step, e: reqwest::Error) -> PipelineError {
    PipelineError::Upstream {
        step,
        message: e.to_string(),
    }
}

async fn probe(client: &reqwest::Client, retry: ReadRetry, base_url: &str) -> bool {
    let url = format!("{base_url}/health");
    retry
        .run("health", || async {
            client.get(&url).send().await?.error_for_status()
        })
        .await
        .is_ok()
}

/// Client for the diagnostic provider (`POST /diagnose`).
#[derive(Debug, Clone)]
pub struct HttpDiagnostics {
    client: reqwest::Client,
    base_url: String,
    retry: ReadRetry,
}

impl HttpDiagnostics {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, retry: ReadRetry) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        }
    }
}

#[derive(Deserialize)]
struct DiagnoseResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    diagnostic: Option<Diagnostic>,
}

#[async_trait]
impl DiagnosticProvider for HttpDiagnostics {
    #[instrument(skip_all, fields(url = %self.base_url))]
    async fn diagnose(&self, request: &DiagnoseRequest) -> Result<Option<Diagnostic>, PipelineError> {
        let url = format!("{}/diagnose", self.base_url);
        let body = json!({
            "transactionId": request.transaction_id,
            "scopeId": request.scope_id,
            "docName": request.doc_name,
            "timeRange": request.time_range_or_default(),
        });

        let response = self
            .retry
            .run("diagnose", || async {
                let response = self.client.post(&url).json(&body).send().await?;
                if response.status() == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                response.error_for_status().map(Some)
            })
            .await
            .map_err(|e| upstream(Step::Diagnostics, e))?;

        let Some(response) = response else {
            debug!("provider reported no match");
            return Ok(None);
        };
        let parsed: DiagnoseResponse = response
            .json()
            .await
            .map_err(|e| upstream(Step::Diagnostics, e))?;
        if !parsed.success {
            return Ok(None);
        }
        Ok(parsed.diagnostic)
    }

    async fn healthy(&self) -> bool {
        probe(&self.client, self.retry, &self.base_url).await
    }
}

/// Client for the solution generator (`POST /generate-solution`).
#[derive(Debug, Clone)]
pub struct HttpSolutions {
    client: reqwest::Client,
    base_url: String,
    retry: ReadRetry,
}

impl HttpSolutions {
    /// `retry` only applies to health probes.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, retry: ReadRetry) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        }
    }
}

#[async_trait]
impl SolutionGenerator for HttpSolutions {
    #[instrument(skip_all, fields(url = %self.base_url))]
    async fn generate(&self, diagnostic: &Diagnostic) -> Result<Solution, PipelineError> {
        let url = format!("{}/generate-solution", self.base_url);
        self.client
            .post(url)
            .json(&json!({ "diagnostic": diagnostic }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| upstream(Step::Solution, e))?
            .json::<Solution>()
            .await
            .map_err(|e| upstream(Step::Solution, e))
    }

    async fn healthy(&self) -> bool {
        probe(&self.client, self.retry, &self.base_url).await
    }
}

/// Client for a remote change request service (`POST /create-pr`).
#[derive(Debug, Clone)]
pub struct HttpChangeRequests {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChangeRequests {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChangeRequestFiler for HttpChangeRequests {
    #[instrument(skip_all, fields(url = %self.base_url))]
    async fn file(&self, request: CreatePrRequest) -> Result<ChangeRequestResult, PipelineError> {
        let url = format!("{}/create-pr", self.base_url);
        self.client
            .post(url)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| upstream(Step::PullRequest, e))?
            .json::<ChangeRequestResult>()
            .await
            .map_err(|e| upstream(Step::PullRequest, e))
    }
}
