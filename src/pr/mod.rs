pub mod diff;
pub mod github;
pub mod store;
pub mod template;
pub mod types;
pub mod vcs;

pub use store::{ChangeRequestStore, MemoryStore};
pub use types::{
    ChangeRequest, ChangeRequestResult, CreatePrRequest, ErrorInfo, Fix, ListFilter, Mode,
    PrStatus, StoreStats,
};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use template::BranchNamer;
use types::NewChangeRequest;
use vcs::{FixChange, RemotePull, VcsError, VcsHost};

#[derive(Debug, Error)]
pub enum PrError {
    #[error("Invalid change request: {0}")]
    Validation(String),

    #[error("Change request not found: {0}")]
    NotFound(String),

    #[error("Change request {id} is {status}, not open")]
    Conflict { id: String, status: PrStatus },

    #[error("Change request store failed: {0}")]
    Store(String),
}

/// Real VCS host plus the deadline for one complete publish sequence.
#[derive(Clone)]
pub struct VcsBackend {
    pub host: Arc<dyn VcsHost>,
    pub deadline: Duration,
}

/// Create a change request from a validated fix, tracking it either on a VCS
/// host or in the fallback store.
pub struct ChangeRequestManager {
    store: Arc<dyn ChangeRequestStore>,
    vcs: Option<VcsBackend>,
    branches: BranchNamer,
}

/// A create request whose required fields are known to be present.
struct ValidCreate {
    repository: String,
    base_branch: String,
    fix: Fix,
    error: ErrorInfo,
}

impl ChangeRequestManager {
    pub fn new(store: Arc<dyn ChangeRequestStore>, vcs: Option<VcsBackend>) -> Self {
        Self {
            store,
            vcs,
            branches: BranchNamer::new(),
        }
    }

    /// Mode new change requests will be attempted in.
    pub fn mode(&self) -> Mode {
        if self.vcs.is_some() {
            Mode::Real
        } else {
            Mode::Mock
        }
    }

    /// Create a change request for `request`.
    ///
    /// With a VCS backend configured the fix is published there first; any
    /// failure of that sequence is logged and the request is recorded in the
    /// store instead. Only validation and store failures reach the caller.
    #[instrument(skip_all, fields(repository = request.repository.as_deref().unwrap_or("")))]
    pub async fn create(&self, request: CreatePrRequest) -> Result<ChangeRequestResult, PrError> {
        let valid = validate(request)?;
        let now = Utc::now();
        let head_branch = self.branches.next(&valid.error.category, now);
        let title = template::title(&valid.error);
        let description = template::description(&valid.error, &valid.fix);
        let labels = template::labels(&valid.error);
        let files = vec![diff::file_change(
            &valid.fix.file,
            &valid.fix.original_code,
            &valid.fix.fixed_code,
        )];

        if let Some(backend) = &self.vcs {
            let change = FixChange {
                base_branch: valid.base_branch.clone(),
                head_branch: head_branch.clone(),
                title: title.clone(),
                description: description.clone(),
                file: valid.fix.file.clone(),
                fixed_code: valid.fix.fixed_code.clone(),
                commit_message: template::commit_message(&valid.error),
                labels: labels.clone(),
            };
            match publish_with_deadline(backend, &change).await {
                Ok(pull) => {
                    info!(number = pull.number, url = %pull.html_url, "filed change request on VCS host");
                    let record = ChangeRequest {
                        id: pull.id.to_string(),
                        number: pull.number,
                        repository: backend.host.repository(),
                        base_branch: valid.base_branch,
                        head_branch: head_branch.clone(),
                        title: pull.title,
                        description,
                        files,
                        labels,
                        status: PrStatus::Open,
                        created_at: pull.created_at,
                        merged_at: None,
                        closed_at: None,
                        created_by: template::BOT_NAME.to_string(),
                        diff_url: format!("{}/files", pull.html_url),
                        pr_url: pull.html_url,
                    };
                    return Ok(result(Mode::Real, head_branch, record));
                }
                Err(e) => {
                    warn!(error = %e, "VCS publish failed, falling back to store");
                }
            }
        }

        let record = self
            .store
            .insert(NewChangeRequest {
                repository: valid.repository,
                base_branch: valid.base_branch,
                head_branch: head_branch.clone(),
                title,
                description,
                files,
                labels,
                created_at: now,
            })
            .await?;
        info!(
            number = record.number,
            url = %record.pr_url,
            branch = %record.head_branch,
            base = %record.base_branch,
            files = record.files.len(),
            "recorded change request in store"
        );
        Ok(result(Mode::Mock, head_branch, record))
    }

    /// Look up a store-backed change request by id or number.
    pub async fn get(&self, identifier: &str) -> Result<ChangeRequest, PrError> {
        self.store
            .get(identifier)
            .await?
            .ok_or_else(|| PrError::NotFound(identifier.to_string()))
    }

    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<ChangeRequest>, PrError> {
        self.store.list(filter).await
    }

    /// `open -> merged`; anything else is a conflict.
    #[instrument(skip(self))]
    pub async fn merge(&self, id: &str) -> Result<ChangeRequest, PrError> {
        let pr = self.store.transition(id, PrStatus::Merged, Utc::now()).await?;
        info!(number = pr.number, "change request merged");
        Ok(pr)
    }

    /// `open -> closed`. Merged or already closed requests are rejected too.
    #[instrument(skip(self))]
    pub async fn close(&self, id: &str) -> Result<ChangeRequest, PrError> {
        let pr = self.store.transition(id, PrStatus::Closed, Utc::now()).await?;
        info!(number = pr.number, "change request closed");
        Ok(pr)
    }

    pub async fn stats(&self) -> Result<StoreStats, PrError> {
        self.store.stats().await
    }
}

async fn publish_with_deadline(backend: &VcsBackend, change: &FixChange) -> Result<RemotePull, VcsError> {
    match tokio::time::timeout(backend.deadline, vcs::publish_fix(backend.host.as_ref(), change)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(VcsError::Timeout(backend.deadline)),
    }
}

fn result(mode: Mode, branch: String, record: ChangeRequest) -> ChangeRequestResult {
    ChangeRequestResult {
        success: true,
        mode,
        pr_number: record.number,
        pr_url: record.pr_url.clone(),
        diff_url: record.diff_url.clone(),
        branch,
        details: record,
    }
}

fn validate(request: CreatePrRequest) -> Result<ValidCreate, PrError> {
    let repository = request
        .repository
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| PrError::Validation("repository is required".to_string()))?;
    let fix = request
        .fix
        .filter(|f| !f.file.trim().is_empty())
        .ok_or_else(|| PrError::Validation("fix with a target file is required".to_string()))?;
    let error = request
        .error
        .filter(|e| !e.category.trim().is_empty())
        .ok_or_else(|| PrError::Validation("error.category is required".to_string()))?;
    let base_branch = request
        .branch
        .filter(|b| !b.trim().is_empty())
        .unwrap_or_else(|| "main".to_string());

    Ok(ValidCreate {
        repository,
        base_branch,
        fix,
        error,
    })
}
