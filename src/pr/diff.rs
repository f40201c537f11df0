use similar::{ChangeTag, TextDiff};

use super::types::FileChange;

/// Summarize a single-file fix as a unified diff plus line counts.
///
/// The diff carries `a/{path}` / `b/{path}` headers and three lines of
/// context per hunk, the same shape GitHub serves from its diff endpoint.
/// An empty `original` is rendered as a new file.
pub fn file_change(path: &str, original: &str, fixed: &str) -> FileChange {
    let diff = TextDiff::from_lines(original, fixed);

    let mut additions = 0;
    let mut deletions = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => additions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }

    let old_header = if original.is_empty() {
        "/dev/null".to_string()
    } else {
        format!("a/{path}")
    };
    let rendered = diff
        .unified_diff()
        .context_radius(3)
        .header(&old_header, &format!("b/{path}"))
        .to_string();

    FileChange {
        path: path.to_string(),
        additions,
        deletions,
        diff: rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_replacement() {
        let change = file_change(
            "src/api/users.js",
            "const user = users.get(id);\nreturn user.email;\n",
            "const user = users.get(id);\nreturn user?.email;\n",
        );
        assert_eq!(change.path, "src/api/users.js");
        assert_eq!(change.additions, 1);
        assert_eq!(change.deletions, 1);
        assert!(change.diff.contains("--- a/src/api/users.js"));
        assert!(change.diff.contains("+++ b/src/api/users.js"));
        assert!(change.diff.contains("-return user.email;"));
        assert!(change.diff.contains("+return user?.email;"));
    }

    #[test]
    fn test_added_guard_lines() {
        let change = file_change(
            "calc.js",
            "return a / b;",
            "if (b === 0) {\n  throw new Error('Division by zero');\n}\nreturn a / b;",
        );
        assert_eq!(change.additions, 3);
        assert_eq!(change.deletions, 0);
    }

    #[test]
    fn test_new_file() {
        let change = file_change("new.js", "", "module.exports = {};\n");
        assert_eq!(change.additions, 1);
        assert_eq!(change.deletions, 0);
        assert!(change.diff.contains("--- /dev/null"));
    }

    #[test]
    fn test_identical_content_has_no_changes() {
        let change = file_change("same.js", "a\nb\n", "a\nb\n");
        assert_eq!(change.additions, 0);
        assert_eq!(change.deletions, 0);
    }
}
