//! HTTP surface of the change request manager.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use super::error::{ApiJson, ApiQuery, ApiResult};
use crate::config::Config;
use crate::pr::{
    ChangeRequest, ChangeRequestManager, ChangeRequestResult, CreatePrRequest, ListFilter, Mode,
    StoreStats,
};

/// What the health endpoint reports about the GitHub target.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubStatus {
    pub configured: bool,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub has_token: bool,
}

impl GitHubStatus {
    /// Owner and repo are only reported once the target is fully configured.
    pub fn from_config(config: &Config) -> Self {
        let target = config.github_target();
        Self {
            configured: target.is_some(),
            owner: target.as_ref().map(|t| t.owner.clone()),
            repo: target.map(|t| t.repo),
            has_token: config.has_github_token(),
        }
    }
}

#[derive(Clone)]
pub struct PrServiceState {
    pub manager: Arc<ChangeRequestManager>,
    pub github: GitHubStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    count: usize,
    pull_requests: Vec<ChangeRequest>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    mode: Mode,
    github: GitHubStatus,
    prs: StoreStats,
}

/// POST /create-pr
async fn create_pr(
    State(state): State<PrServiceState>,
    ApiJson(request): ApiJson<CreatePrRequest>,
) -> ApiResult<Json<ChangeRequestResult>> {
    let result = state.manager.create(request).await?;
    Ok(Json(result))
}

/// GET /pr/{identifier}, by id or number.
async fn get_pr(
    State(state): State<PrServiceState>,
    Path(identifier): Path<String>,
) -> ApiResult<Json<ChangeRequest>> {
    Ok(Json(state.manager.get(&identifier).await?))
}

/// GET /prs?repository=&status=
async fn list_prs(
    State(state): State<PrServiceState>,
    ApiQuery(filter): ApiQuery<ListFilter>,
) -> ApiResult<Json<ListResponse>> {
    let pull_requests = state.manager.list(&filter).await?;
    Ok(Json(ListResponse {
        count: pull_requests.len(),
        pull_requests,
    }))
}

async fn merge_pr(
    State(state): State<PrServiceState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ChangeRequest>> {
    Ok(Json(state.manager.merge(&id).await?))
}

async fn close_pr(
    State(state): State<PrServiceState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ChangeRequest>> {
    Ok(Json(state.manager.close(&id).await?))
}

async fn health(State(state): State<PrServiceState>) -> ApiResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok",
        service: "github-pr-service",
        mode: state.manager.mode(),
        github: state.github.clone(),
        prs: state.manager.stats().await?,
    }))
}

pub fn routes(state: PrServiceState) -> Router {
    Router::new()
        .route("/create-pr", post(create_pr))
        .route("/pr/{identifier}", get(get_pr))
        .route("/prs", get(list_prs))
        .route("/pr/{id}/merge", post(merge_pr))
        .route("/pr/{id}/close", post(close_pr))
        .route("/health", get(health))
        .with_state(state)
}

/// Routes for a manager with no GitHub status to report.
#[cfg(test)]
pub fn router(manager: Arc<ChangeRequestManager>) -> Router {
    routes(PrServiceState {
        manager,
        github: GitHubStatus::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pr::tests::{mock_manager, sample_request};
    use crate::server::tests::{body_json, get, post_json};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    fn app() -> Router {
        router(Arc::new(mock_manager()))
    }

    async fn create(app: &Router) -> Value {
        let response = post_json(app.clone(), "/create-pr", json!(sample_request())).await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    #[tokio::test]
    async fn test_create_pr_mock_mode() {
        let app = app();
        let json = create(&app).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["mode"], "MOCK");
        assert_eq!(json["prNumber"], 1);
        assert!(json["branch"].as_str().unwrap().starts_with("fix/null_pointer-"));
        assert_eq!(json["details"]["status"], "open");
        assert_eq!(json["details"]["files"][0]["path"], "src/api/users.js");
    }

    #[tokio::test]
    async fn test_create_pr_requires_repository_and_fix() {
        let response = post_json(app(), "/create-pr", json!({ "error": { "category": "X" } })).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_validation_error() {
        let response = post_json(app(), "/create-pr", json!({ "repository": 5 })).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert!(json["message"].as_str().unwrap().starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn test_unknown_status_filter_is_json_validation_error() {
        let response = get(app(), "/prs?status=bogus").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert!(json["message"].as_str().unwrap().starts_with("Invalid query string"));
    }

    #[tokio::test]
    async fn test_get_by_id_and_number() {
        let app = app();
        let created = create(&app).await;
        let id = created["details"]["id"].as_str().unwrap().to_string();

        let by_id = body_json(get(app.clone(), &format!("/pr/{id}")).await).await;
        assert_eq!(by_id["number"], 1);
        let by_number = body_json(get(app.clone(), "/pr/1").await).await;
        assert_eq!(by_number["id"], id.as_str());

        let missing = get(app, "/pr/42").await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let app = app();
        let first = create(&app).await;
        create(&app).await;
        let mut other = sample_request();
        other.repository = Some("company/order-service".to_string());
        post_json(app.clone(), "/create-pr", json!(other)).await;

        let id = first["details"]["id"].as_str().unwrap();
        post_json(app.clone(), &format!("/pr/{id}/merge"), Value::Null).await;

        let all = body_json(get(app.clone(), "/prs").await).await;
        assert_eq!(all["count"], 3);

        let filtered = body_json(
            get(app.clone(), "/prs?repository=company/user-service&status=open").await,
        )
        .await;
        assert_eq!(filtered["count"], 1);
        assert_eq!(filtered["pullRequests"][0]["repository"], "company/user-service");
        assert_eq!(filtered["pullRequests"][0]["status"], "open");

        let merged = body_json(get(app, "/prs?status=merged").await).await;
        assert_eq!(merged["count"], 1);
    }

    #[tokio::test]
    async fn test_merge_then_conflict() {
        let app = app();
        let created = create(&app).await;
        let id = created["details"]["id"].as_str().unwrap();

        let first = post_json(app.clone(), &format!("/pr/{id}/merge"), Value::Null).await;
        assert_eq!(first.status(), StatusCode::OK);
        let merged = body_json(first).await;
        assert_eq!(merged["status"], "merged");
        assert!(merged["mergedAt"].is_string());

        let second = post_json(app.clone(), &format!("/pr/{id}/merge"), Value::Null).await;
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(second).await["code"], "CONFLICT");

        let missing = post_json(app, "/pr/unknown/merge", Value::Null).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_close_then_close_again() {
        let app = app();
        let created = create(&app).await;
        let id = created["details"]["id"].as_str().unwrap();

        let closed = post_json(app.clone(), &format!("/pr/{id}/close"), Value::Null).await;
        assert_eq!(closed.status(), StatusCode::OK);
        assert_eq!(body_json(closed).await["status"], "closed");

        let again = post_json(app.clone(), &format!("/pr/{id}/close"), Value::Null).await;
        assert_eq!(again.status(), StatusCode::BAD_REQUEST);

        let missing = post_json(app, "/pr/unknown/close", Value::Null).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_github_status_hides_partial_target() {
        let partial = Config::from_sources(None, |var| match var {
            "TARGET_GITHUB_OWNER" => Some("acme".to_string()),
            "TARGET_GITHUB_REPO" => Some("user-service".to_string()),
            _ => None,
        })
        .unwrap();
        let status = GitHubStatus::from_config(&partial);
        assert!(!status.configured);
        assert!(!status.has_token);
        assert_eq!(status.owner, None);
        assert_eq!(status.repo, None);

        let full = Config::from_sources(None, |var| match var {
            "GITHUB_TOKEN" => Some("ghp_test".to_string()),
            "TARGET_GITHUB_OWNER" => Some("acme".to_string()),
            "TARGET_GITHUB_REPO" => Some("user-service".to_string()),
            _ => None,
        })
        .unwrap();
        let status = GitHubStatus::from_config(&full);
        assert!(status.configured);
        assert!(status.has_token);
        assert_eq!(status.owner.as_deref(), Some("acme"));
        assert_eq!(status.repo.as_deref(), Some("user-service"));
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let app = app();
        let created = create(&app).await;
        create(&app).await;
        let id = created["details"]["id"].as_str().unwrap();
        post_json(app.clone(), &format!("/pr/{id}/merge"), Value::Null).await;

        let json = body_json(get(app, "/health").await).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["mode"], "MOCK");
        assert_eq!(json["github"]["configured"], false);
        assert_eq!(json["github"]["hasToken"], false);
        assert_eq!(json["prs"]["total"], 2);
        assert_eq!(json["prs"]["open"], 1);
        assert_eq!(json["prs"]["merged"], 1);
    }
}
