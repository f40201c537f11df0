//! Deterministic text for change requests: titles, descriptions, labels and
//! branch names. Everything here is a pure function of its inputs except
//! [`BranchNamer`], which only guarantees monotonic suffixes.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use super::types::{ErrorInfo, Fix};

pub const BOT_NAME: &str = "log-maintenance-bot";
const BASE_LABELS: [&str; 2] = ["automated-fix", "bug"];

/// `Fix: <type> - <category>` with the category lower-cased and underscores
/// turned into spaces.
pub fn title(error: &ErrorInfo) -> String {
    let category = error.category.to_lowercase().replace('_', " ");
    let kind = if error.kind.is_empty() { "Error" } else { error.kind.as_str() };
    format!("Fix: {kind} - {category}")
}

/// Commit message for the file write; keeps the category verbatim.
pub fn commit_message(error: &ErrorInfo) -> String {
    let kind = if error.kind.is_empty() { "Error" } else { error.kind.as_str() };
    format!("Fix: {kind} - {}", error.category)
}

/// `automated-fix`, `bug`, then the lower-cased category (deduplicated).
pub fn labels(error: &ErrorInfo) -> Vec<String> {
    let mut labels: Vec<String> = BASE_LABELS.iter().map(|l| l.to_string()).collect();
    let category = error.category.to_lowercase();
    if !category.is_empty() && !labels.contains(&category) {
        labels.push(category);
    }
    labels
}

/// Markdown body of the change request.
pub fn description(error: &ErrorInfo, fix: &Fix) -> String {
    let location = match fix.line {
        Some(line) => format!("`{}` (Line {})", fix.file, line),
        None => format!("`{}`", fix.file),
    };
    let lang = fence_language(&fix.file);
    let label_list = labels(error)
        .iter()
        .map(|l| format!("- `{l}`"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut md = String::new();
    md.push_str("## Automated Fix Generated by Log Maintenance System\n\n");
    md.push_str("### Error Details\n");
    md.push_str(&format!("- **Type**: {}\n", error.kind));
    md.push_str(&format!("- **Category**: {}\n", error.category));
    md.push_str(&format!("- **Message**: {}\n\n", error.message));
    md.push_str("### Fix Applied\n");
    md.push_str(&format!("{}\n\n", fix.explanation));
    md.push_str("### Changes Made\n");
    md.push_str(&format!("**File**: {location}\n\n"));
    md.push_str("#### Before:\n");
    md.push_str(&format!("```{lang}\n{}\n```\n\n", fix.original_code));
    md.push_str("#### After:\n");
    md.push_str(&format!("```{lang}\n{}\n```\n\n", fix.fixed_code));
    md.push_str("### Testing\n");
    md.push_str("Please review the changes and run the following tests:\n");
    md.push_str("- Unit tests for the affected component\n");
    md.push_str("- Integration tests if applicable\n");
    md.push_str("- Manual verification in staging environment\n\n");
    md.push_str("### Labels\n");
    md.push_str(&label_list);
    md.push_str("\n\n---\n");
    md.push_str("*This PR was automatically generated by the Log Maintenance Automation System*");
    md
}

fn fence_language(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("js" | "mjs" | "cjs") => "javascript",
        Some("ts") => "typescript",
        Some("py") => "python",
        Some("rs") => "rust",
        Some("java") => "java",
        Some("go") => "go",
        _ => "",
    }
}

/// Category as it may appear inside a git ref: lower-case, with anything
/// outside `[a-z0-9_-]` replaced by `-`.
fn branch_slug(category: &str) -> String {
    let slug: String = category
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    if slug.is_empty() { "error".to_string() } else { slug }
}

/// Issues `fix/<category>-<millis>` branch names. Suffixes are strictly
/// increasing per namer, so two fixes in the same millisecond still differ.
#[derive(Debug, Default)]
pub struct BranchNamer {
    last: AtomicI64,
}

impl BranchNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, category: &str, now: DateTime<Utc>) -> String {
        let now_ms = now.timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        let stamp = loop {
            let candidate = now_ms.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break candidate,
                Err(actual) => prev = actual,
            }
        };
        format!("fix/{}-{}", branch_slug(category), stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn error() -> ErrorInfo {
        ErrorInfo {
            kind: "TypeError".to_string(),
            category: "NULL_POINTER".to_string(),
            message: "Cannot read property 'email' of undefined".to_string(),
            severity: None,
        }
    }

    fn fix() -> Fix {
        Fix {
            file: "src/api/users.js".to_string(),
            original_code: "return user.email;".to_string(),
            fixed_code: "return user?.email;".to_string(),
            explanation: "Added null/undefined check before accessing properties".to_string(),
            line: Some(11),
        }
    }

    #[test]
    fn test_title_format() {
        assert_eq!(title(&error()), "Fix: TypeError - null pointer");
        assert_eq!(title(&error()), title(&error()));
    }

    #[test]
    fn test_title_defaults_error_type() {
        let mut e = error();
        e.kind.clear();
        assert_eq!(title(&e), "Fix: Error - null pointer");
    }

    #[test]
    fn test_commit_message_keeps_category() {
        assert_eq!(commit_message(&error()), "Fix: TypeError - NULL_POINTER");
    }

    #[test]
    fn test_labels_keep_underscores() {
        assert_eq!(labels(&error()), vec!["automated-fix", "bug", "null_pointer"]);
        let mut e = error();
        e.category = "BUG".to_string();
        assert_eq!(labels(&e), vec!["automated-fix", "bug"]);
    }

    #[test]
    fn test_description_golden() {
        let expected = "## Automated Fix Generated by Log Maintenance System

### Error Details
- **Type**: TypeError
- **Category**: NULL_POINTER
- **Message**: Cannot read property 'email' of undefined

### Fix Applied
Added null/undefined check before accessing properties

### Changes Made
**File**: `src/api/users.js` (Line 11)

#### Before:
```javascript
return user.email;
```

#### After:
```javascript
return user?.email;
```

### Testing
Please review the changes and run the following tests:
- Unit tests for the affected component
- Integration tests if applicable
- Manual verification in staging environment

### Labels
- `automated-fix`
- `bug`
- `null_pointer`

---
*This PR was automatically generated by the Log Maintenance Automation System*";
        assert_eq!(description(&error(), &fix()), expected);
    }

    #[test]
    fn test_description_without_line() {
        let mut f = fix();
        f.line = None;
        f.file = "service/handler.py".to_string();
        let md = description(&error(), &f);
        assert!(md.contains("**File**: `service/handler.py`\n"));
        assert!(md.contains("```python\n"));
    }

    #[test]
    fn test_branch_name_shape() {
        let namer = BranchNamer::new();
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(namer.next("NULL_POINTER", now), "fix/null_pointer-1700000000123");
    }

    #[test]
    fn test_branch_names_unique_within_same_millisecond() {
        let namer = BranchNamer::new();
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let a = namer.next("TIMEOUT", now);
        let b = namer.next("TIMEOUT", now);
        assert_ne!(a, b);
        assert_eq!(b, "fix/timeout-1700000000001");
    }

    #[test]
    fn test_branch_slug_sanitizes() {
        let namer = BranchNamer::new();
        let now = Utc.timestamp_millis_opt(5).unwrap();
        assert_eq!(namer.next("Access Denied!", now), "fix/access-denied--5");
    }
}
