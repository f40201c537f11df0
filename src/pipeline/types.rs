use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pr::types::de_line;
use crate::pr::{ChangeRequestResult, ErrorInfo, Fix};

/// Body of `POST /api/diagnose`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnoseRequest {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub scope_id: Option<String>,
    #[serde(default)]
    pub doc_name: Option<String>,
    #[serde(default)]
    pub time_range: Option<String>,
}

impl DiagnoseRequest {
    pub fn time_range_or_default(&self) -> &str {
        self.time_range.as_deref().filter(|t| !t.is_empty()).unwrap_or("24h")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default, deserialize_with = "de_line")]
    pub line: Option<u32>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub code_snippet: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRef {
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub occurrence_count: u64,
}

/// Structured description of one detected error and where it lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub error: ErrorInfo,
    #[serde(default)]
    pub source: SourceLocation,
    #[serde(default)]
    pub repository: RepositoryRef,
    #[serde(default)]
    pub context: ErrorContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub recommended_value: Option<String>,
}

/// Operational recommendation for errors a code change will not fix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub occurrence_count: u64,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

/// Output of the solution generator; exactly one variant is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "solutionType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Solution {
    CodeFix { fix: Fix },
    AlertSuggestion { alert: Alert },
}

impl Solution {
    pub fn kind(&self) -> SolutionType {
        match self {
            Solution::CodeFix { .. } => SolutionType::CodeFix,
            Solution::AlertSuggestion { .. } => SolutionType::AlertSuggestion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolutionType {
    CodeFix,
    AlertSuggestion,
}

impl std::fmt::Display for SolutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolutionType::CodeFix => write!(f, "CODE_FIX"),
            SolutionType::AlertSuggestion => write!(f, "ALERT_SUGGESTION"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub container_name: Option<String>,
    pub occurrence_count: u64,
    pub repository: String,
    pub source_file: Option<String>,
    pub source_line: Option<u32>,
}

/// Fix payload of a pipeline run, with the filed change request if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixOutcome {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub explanation: String,
    pub original_code: String,
    pub fixed_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<ChangeRequestResult>,
    /// Why no change request was filed, when filing failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Fix(FixOutcome),
    Alert(Alert),
}

/// Response of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub scope_id: Option<String>,
    pub solution_type: SolutionType,
    pub error: ErrorSummary,
    pub context: ContextSummary,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl PipelineResult {
    pub fn change_request(&self) -> Option<&ChangeRequestResult> {
        match &self.outcome {
            Outcome::Fix(fix) => fix.pr.as_ref(),
            Outcome::Alert(_) => None,
        }
    }
}

/// One entry of `GET /api/history`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub transaction_id: Option<String>,
    pub error_type: String,
    pub solution_type: SolutionType,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    PrCreated,
    FixOnly,
    AlertSent,
}

impl RunStatus {
    pub fn of(result: &PipelineResult) -> Self {
        match &result.outcome {
            Outcome::Fix(fix) if fix.pr.is_some() => RunStatus::PrCreated,
            Outcome::Fix(_) => RunStatus::FixOnly,
            Outcome::Alert(_) => RunStatus::AlertSent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solution_code_fix_from_generator_json() {
        let json = r#"{
            "success": true,
            "solutionType": "CODE_FIX",
            "fix": {
                "file": "src/api/users.js",
                "line": "11",
                "originalCode": "return user.email;",
                "fixedCode": "return user?.email;",
                "explanation": "Added null/undefined check before accessing properties",
                "category": "NULL_REFERENCE"
            },
            "diagnostic": {}
        }"#;
        let solution: Solution = serde_json::from_str(json).unwrap();
        assert_eq!(solution.kind(), SolutionType::CodeFix);
        match solution {
            Solution::CodeFix { fix } => {
                assert_eq!(fix.file, "src/api/users.js");
                assert_eq!(fix.line, Some(11));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_solution_alert_from_generator_json() {
        let json = r#"{
            "success": true,
            "solutionType": "ALERT_SUGGESTION",
            "alert": {
                "category": "TIMEOUT",
                "errorMessage": "Gateway timeout",
                "occurrenceCount": 4,
                "suggestions": [{
                    "type": "INFRASTRUCTURE",
                    "priority": "HIGH",
                    "action": "Increase timeout configuration for payment gateway",
                    "details": "Payment gateway timeouts occurring 4 times",
                    "recommendedValue": "30s -> 60s"
                }]
            }
        }"#;
        let solution: Solution = serde_json::from_str(json).unwrap();
        match solution {
            Solution::AlertSuggestion { alert } => {
                assert_eq!(alert.suggestions.len(), 1);
                assert_eq!(alert.suggestions[0].kind, "INFRASTRUCTURE");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_diagnostic_tolerates_sparse_provider_output() {
        let json = r#"{
            "error": {"message": "x is undefined", "type": "TypeError", "stack": "...", "category": "NULL_REFERENCE"},
            "context": {"containerName": "user-service-7d9", "roleInstance": "aks-1", "occurrenceCount": 12},
            "pipeline": {"pipelineId": "pipeline-001"},
            "repository": {"repository": "company/user-service", "branch": "main", "lastCommit": "abc"},
            "source": {"file": "src/api/users.js", "line": "11"}
        }"#;
        let diagnostic: Diagnostic = serde_json::from_str(json).unwrap();
        assert_eq!(diagnostic.error.category, "NULL_REFERENCE");
        assert_eq!(diagnostic.source.line, Some(11));
        assert_eq!(diagnostic.context.occurrence_count, 12);
        assert_eq!(diagnostic.repository.branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_time_range_default() {
        let req = DiagnoseRequest::default();
        assert_eq!(req.time_range_or_default(), "24h");
        let req = DiagnoseRequest { time_range: Some("1h".to_string()), ..Default::default() };
        assert_eq!(req.time_range_or_default(), "1h");
    }
}
