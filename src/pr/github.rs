use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::vcs::{FileWrite, RemotePull, VcsError, VcsHost, VcsStep};
use crate::config::GitHubTarget;

const USER_AGENT: &str = "fix-pipeline";

/// GitHub REST API host for one `owner/repo`.
#[derive(Debug, Clone)]
pub struct GitHubHost {
    client: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    token: String,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
}

#[derive(Deserialize)]
struct PullResponse {
    id: u64,
    number: u64,
    html_url: String,
    title: String,
    created_at: DateTime<Utc>,
}

impl GitHubHost {
    pub fn new(client: reqwest::Client, target: &GitHubTarget) -> Self {
        Self {
            client,
            api_url: target.api_url.trim_end_matches('/').to_string(),
            owner: target.owner.clone(),
            repo: target.repo.clone(),
            token: target.token.clone(),
        }
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, self.owner, self.repo, tail)
    }

    /// `contents/{path}` with each path segment percent-encoded.
    fn contents_url(&self, step: VcsStep, path: &str) -> Result<Url, VcsError> {
        let invalid = || VcsError::InvalidPath {
            step,
            path: path.to_string(),
        };
        let mut url = Url::parse(&self.url("contents")).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .bearer_auth(&self.token)
    }

    async fn send(&self, step: VcsStep, request: RequestBuilder) -> Result<Response, VcsError> {
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|source| VcsError::Request { step, source })?;
        check_status(step, response).await
    }
}

/// Turn a non-2xx response into [`VcsError::Rejected`] carrying GitHub's message.
async fn check_status(step: VcsStep, response: Response) -> Result<Response, VcsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.message)
        .unwrap_or(text);
    Err(VcsError::Rejected {
        step,
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(step: VcsStep, response: Response) -> Result<T, VcsError> {
    response
        .json::<T>()
        .await
        .map_err(|source| VcsError::Request { step, source })
}

#[async_trait]
impl VcsHost for GitHubHost {
    fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    #[instrument(skip(self))]
    async fn branch_head(&self, branch: &str) -> Result<String, VcsError> {
        let step = VcsStep::ResolveBase;
        let url = self.url(&format!("git/ref/heads/{branch}"));
        let response = self.send(step, self.client.get(url)).await?;
        let reference: RefResponse = decode(step, response).await?;
        Ok(reference.object.sha)
    }

    #[instrument(skip(self))]
    async fn create_branch(&self, branch: &str, sha: &str) -> Result<(), VcsError> {
        let body = json!({ "ref": format!("refs/heads/{branch}"), "sha": sha });
        self.send(VcsStep::CreateBranch, self.client.post(self.url("git/refs")).json(&body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn file_revision(&self, path: &str, branch: &str) -> Result<Option<String>, VcsError> {
        let step = VcsStep::ReadFile;
        let request = self
            .client
            .get(self.contents_url(step, path)?)
            .query(&[("ref", branch)]);
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|source| VcsError::Request { step, source })?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("file not found on branch");
            return Ok(None);
        }
        let response = check_status(step, response).await?;
        let content: ContentResponse = decode(step, response).await?;
        Ok(Some(content.sha))
    }

    #[instrument(skip(self, write), fields(path = write.path, branch = write.branch))]
    async fn write_file(&self, write: FileWrite<'_>) -> Result<(), VcsError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(write.content.as_bytes());
        let mut body = json!({
            "message": write.message,
            "content": encoded,
            "branch": write.branch,
        });
        if let Some(sha) = write.prior_revision {
            body["sha"] = json!(sha);
        }
        let url = self.contents_url(VcsStep::WriteFile, write.path)?;
        self.send(VcsStep::WriteFile, self.client.put(url).json(&body)).await?;
        Ok(())
    }

    #[instrument(skip(self, body))]
    async fn open_pull(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<RemotePull, VcsError> {
        let step = VcsStep::OpenPull;
        let payload = json!({ "title": title, "body": body, "head": head, "base": base });
        let response = self.send(step, self.client.post(self.url("pulls")).json(&payload)).await?;
        let pull: PullResponse = decode(step, response).await?;
        Ok(RemotePull {
            id: pull.id,
            number: pull.number,
            html_url: pull.html_url,
            title: pull.title,
            created_at: pull.created_at,
        })
    }

    #[instrument(skip(self))]
    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), VcsError> {
        let url = self.url(&format!("issues/{number}/labels"));
        self.send(VcsStep::AddLabels, self.client.post(url).json(&json!({ "labels": labels })))
            .await?;
        Ok(())
    }
}
