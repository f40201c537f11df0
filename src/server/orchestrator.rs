//! HTTP surface of the diagnose-to-fix pipeline.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::error::{ApiJson, ApiResult};
use crate::pipeline::types::{HistoryEntry, RunStatus, SolutionType};
use crate::pipeline::{Coordinator, DiagnoseRequest, HealthReport, PipelineResult};

const HISTORY_LIMIT: usize = 100;

/// Past runs: two fixed entries followed by this process's completed runs.
pub struct RunLog {
    seeded: Vec<HistoryEntry>,
    recent: RwLock<VecDeque<HistoryEntry>>,
    next_id: AtomicU64,
}

impl RunLog {
    pub fn seeded(started: DateTime<Utc>) -> Self {
        let seeded = vec![
            HistoryEntry {
                id: 1,
                timestamp: started - Duration::hours(1),
                transaction_id: Some("txn-seed-001".to_string()),
                error_type: "TypeError".to_string(),
                solution_type: SolutionType::CodeFix,
                status: RunStatus::PrCreated,
            },
            HistoryEntry {
                id: 2,
                timestamp: started - Duration::hours(2),
                transaction_id: Some("txn-seed-002".to_string()),
                error_type: "UnhandledPromiseRejection".to_string(),
                solution_type: SolutionType::AlertSuggestion,
                status: RunStatus::AlertSent,
            },
        ];
        let next_id = AtomicU64::new(seeded.len() as u64 + 1);
        Self {
            seeded,
            recent: RwLock::new(VecDeque::new()),
            next_id,
        }
    }

    pub async fn record(&self, result: &PipelineResult) {
        let entry = HistoryEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            transaction_id: result.transaction_id.clone(),
            error_type: result.error.kind.clone(),
            solution_type: result.solution_type,
            status: RunStatus::of(result),
        };
        let mut recent = self.recent.write().await;
        if recent.len() == HISTORY_LIMIT {
            recent.pop_front();
        }
        recent.push_back(entry);
    }

    pub async fn entries(&self) -> Vec<HistoryEntry> {
        let recent = self.recent.read().await;
        self.seeded.iter().chain(recent.iter()).cloned().collect()
    }
}

#[derive(Clone)]
pub struct OrchestratorState {
    pub coordinator: Arc<Coordinator>,
    pub history: Arc<RunLog>,
}

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<HistoryEntry>,
}

/// POST /api/diagnose
async fn diagnose(
    State(state): State<OrchestratorState>,
    ApiJson(request): ApiJson<DiagnoseRequest>,
) -> ApiResult<Json<PipelineResult>> {
    let result = state.coordinator.run_diagnosis(&request).await?;
    state.history.record(&result).await;
    Ok(Json(result))
}

async fn history(State(state): State<OrchestratorState>) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        history: state.history.entries().await,
    })
}

async fn health(State(state): State<OrchestratorState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.coordinator.health().await;
    let status = if report.all_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    let state = OrchestratorState {
        coordinator,
        history: Arc::new(RunLog::seeded(Utc::now())),
    };
    Router::new()
        .route("/api/diagnose", post(diagnose))
        .route("/api/history", get(history))
        .route("/health", get(health))
        .with_state(state)
}
