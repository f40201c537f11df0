use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle state of a change request. `Merged` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrStatus {
    Open,
    Merged,
    Closed,
}

impl PrStatus {
    /// Only `open -> merged` and `open -> closed` are permitted.
    pub fn can_transition_to(self, next: PrStatus) -> bool {
        self == PrStatus::Open && next != PrStatus::Open
    }
}

impl std::fmt::Display for PrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrStatus::Open => write!(f, "open"),
            PrStatus::Merged => write!(f, "merged"),
            PrStatus::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for PrStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PrStatus::Open),
            "merged" => Ok(PrStatus::Merged),
            "closed" => Ok(PrStatus::Closed),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// Which backend served a create request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "REAL_GITHUB")]
    Real,
    #[serde(rename = "MOCK")]
    Mock,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Real => write!(f, "REAL_GITHUB"),
            Mode::Mock => write!(f, "MOCK"),
        }
    }
}

/// Error summary attached to a create request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

/// A concrete code change proposed by the solution generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub original_code: String,
    #[serde(default)]
    pub fixed_code: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, deserialize_with = "de_line", skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Body of `POST /create-pr`. Fields are optional so that missing input
/// surfaces as a validation error rather than a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrRequest {
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub fix: Option<Fix>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

/// One changed file within a change request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    pub additions: usize,
    pub deletions: usize,
    /// Unified diff of the change
    pub diff: String,
}

/// A pull-request-like record, either mirrored from GitHub or held in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    /// Opaque, globally unique identifier
    pub id: String,
    /// Display number; unique only within one backend
    pub number: u64,
    pub repository: String,
    pub base_branch: String,
    pub head_branch: String,
    pub title: String,
    pub description: String,
    pub files: Vec<FileChange>,
    pub labels: Vec<String>,
    pub status: PrStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub pr_url: String,
    pub diff_url: String,
}

/// Everything needed to record a change request, before the backend assigns
/// `id`, `number` and the URLs.
#[derive(Debug, Clone)]
pub struct NewChangeRequest {
    pub repository: String,
    pub base_branch: String,
    pub head_branch: String,
    pub title: String,
    pub description: String,
    pub files: Vec<FileChange>,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Uniform result of a create call, whichever backend served it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequestResult {
    pub success: bool,
    pub mode: Mode,
    pub pr_number: u64,
    pub pr_url: String,
    pub diff_url: String,
    pub branch: String,
    pub details: ChangeRequest,
}

/// Conjunctive filter for listing; `None` fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilter {
    pub repository: Option<String>,
    pub status: Option<PrStatus>,
}

impl ListFilter {
    pub fn matches(&self, pr: &ChangeRequest) -> bool {
        self.repository.as_ref().is_none_or(|r| *r == pr.repository)
            && self.status.is_none_or(|s| s == pr.status)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub open: usize,
    pub merged: usize,
    pub closed: usize,
}

/// Accepts a line number given as a JSON number, a numeric string, or null.
pub fn de_line<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Line {
        Number(u32),
        Text(String),
    }

    Ok(match Option::<Line>::deserialize(deserializer)? {
        Some(Line::Number(n)) => Some(n),
        Some(Line::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(PrStatus::Open.can_transition_to(PrStatus::Merged));
        assert!(PrStatus::Open.can_transition_to(PrStatus::Closed));
        assert!(!PrStatus::Open.can_transition_to(PrStatus::Open));
        assert!(!PrStatus::Merged.can_transition_to(PrStatus::Closed));
        assert!(!PrStatus::Closed.can_transition_to(PrStatus::Merged));
    }

    #[test]
    fn test_mode_wire_names() {
        assert_eq!(serde_json::to_value(Mode::Real).unwrap(), "REAL_GITHUB");
        assert_eq!(serde_json::to_value(Mode::Mock).unwrap(), "MOCK");
    }

    #[test]
    fn test_fix_line_accepts_string_or_number() {
        let fix: Fix = serde_json::from_str(
            r#"{"file":"src/api/users.js","originalCode":"a","fixedCode":"b","explanation":"x","line":"11"}"#,
        )
        .unwrap();
        assert_eq!(fix.line, Some(11));

        let fix: Fix = serde_json::from_str(r#"{"file":"f","line":7}"#).unwrap();
        assert_eq!(fix.line, Some(7));

        let fix: Fix = serde_json::from_str(r#"{"file":"f","line":null}"#).unwrap();
        assert_eq!(fix.line, None);
    }

    #[test]
    fn test_error_info_type_field() {
        let error: ErrorInfo = serde_json::from_str(
            r#"{"type":"TypeError","category":"NULL_POINTER","message":"boom"}"#,
        )
        .unwrap();
        assert_eq!(error.kind, "TypeError");
        assert_eq!(error.category, "NULL_POINTER");
        assert!(error.severity.is_none());
    }
}
