use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Remote operations in the order [`publish_fix`] performs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsStep {
    ResolveBase,
    CreateBranch,
    ReadFile,
    WriteFile,
    OpenPull,
    AddLabels,
}

impl std::fmt::Display for VcsStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VcsStep::ResolveBase => "resolve base branch",
            VcsStep::CreateBranch => "create branch",
            VcsStep::ReadFile => "read file",
            VcsStep::WriteFile => "write file",
            VcsStep::OpenPull => "open pull request",
            VcsStep::AddLabels => "add labels",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("{step} failed: {source}")]
    Request {
        step: VcsStep,
        #[source]
        source: reqwest::Error,
    },

    #[error("{step} rejected with HTTP {status}: {message}")]
    Rejected {
        step: VcsStep,
        status: u16,
        message: String,
    },

    #[error("{step} has no valid request URL for {path}")]
    InvalidPath { step: VcsStep, path: String },

    #[error("VCS sequence exceeded its {0:?} deadline")]
    Timeout(std::time::Duration),
}

/// A pull request as returned by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePull {
    pub id: u64,
    pub number: u64,
    pub html_url: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// One file write on a branch.
#[derive(Debug, Clone)]
pub struct FileWrite<'a> {
    pub path: &'a str,
    pub branch: &'a str,
    pub content: &'a str,
    pub message: &'a str,
    /// Revision marker of the file being replaced; `None` creates the file.
    pub prior_revision: Option<&'a str>,
}

/// Primitive operations of a version-control host.
#[async_trait]
pub trait VcsHost: Send + Sync {
    /// `owner/repo` this host writes to.
    fn repository(&self) -> String;

    /// Commit id `branch` points at.
    async fn branch_head(&self, branch: &str) -> Result<String, VcsError>;

    /// Create `branch` at `sha`. Fails if it already exists.
    async fn create_branch(&self, branch: &str, sha: &str) -> Result<(), VcsError>;

    /// Revision marker of `path` on `branch`, or `None` when the file does not exist.
    async fn file_revision(&self, path: &str, branch: &str) -> Result<Option<String>, VcsError>;

    async fn write_file(&self, write: FileWrite<'_>) -> Result<(), VcsError>;

    async fn open_pull(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<RemotePull, VcsError>;

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), VcsError>;
}

/// Input to [`publish_fix`].
#[derive(Debug, Clone)]
pub struct FixChange {
    pub base_branch: String,
    pub head_branch: String,
    pub title: String,
    pub description: String,
    pub file: String,
    pub fixed_code: String,
    pub commit_message: String,
    pub labels: Vec<String>,
}

/// Materialize a single-file fix as a pull request on `host`.
///
/// Steps: resolve base, branch, read current revision, commit, open the pull
/// request, label it. A failure before the pull request opens aborts the run;
/// nothing already created on the host is rolled back, so an aborted run can
/// leave an orphan branch behind. Label failures are logged and ignored.
#[instrument(skip_all, fields(repository = %host.repository(), head = %change.head_branch, base = %change.base_branch))]
pub async fn publish_fix(host: &dyn VcsHost, change: &FixChange) -> Result<RemotePull, VcsError> {
    let base_sha = host.branch_head(&change.base_branch).await?;
    info!(sha = %short_sha(&base_sha), "resolved base branch");

    host.create_branch(&change.head_branch, &base_sha).await?;
    info!("created branch");

    let revision = host.file_revision(&change.file, &change.base_branch).await?;
    if revision.is_none() {
        info!(file = %change.file, "file absent on base branch, creating it");
    }

    host.write_file(FileWrite {
        path: &change.file,
        branch: &change.head_branch,
        content: &change.fixed_code,
        message: &change.commit_message,
        prior_revision: revision.as_deref(),
    })
    .await?;
    info!(file = %change.file, "committed fix");

    let pull = host
        .open_pull(&change.title, &change.description, &change.head_branch, &change.base_branch)
        .await?;
    info!(number = pull.number, url = %pull.html_url, "opened pull request");

    if let Err(e) = host.add_labels(pull.number, &change.labels).await {
        warn!(error = %e, "could not add labels (they may not exist on the repository)");
    }

    Ok(pull)
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
