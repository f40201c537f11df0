use crate::pipeline::types::{Alert, FixOutcome, Outcome};
use crate::pipeline::PipelineResult;
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Output a pipeline result to the terminal (default) or to a markdown file.
#[instrument(skip(result), fields(solution_type = %result.solution_type))]
pub fn output(result: &PipelineResult, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(result);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            std::fs::write(path, render_markdown(result))?;
            Ok(())
        }
    }
}

fn location(result: &PipelineResult) -> String {
    match (&result.context.source_file, result.context.source_line) {
        (Some(f), Some(l)) => format!("{f}:{l}"),
        (Some(f), None) => f.clone(),
        _ => "unknown".to_string(),
    }
}

/// Format and print the result to the terminal with colors.
///
/// ```text
/// TypeError [NULL_POINTER]: Cannot read property 'email' of undefined
/// Repository: company/user-service | Source: src/api/users.js:11 | Occurrences: 23
///
/// ═══ Code Fix ═══
/// ...
/// ```
fn print_terminal_report(result: &PipelineResult) {
    println!();
    println!(
        "{} [{}]: {}",
        result.error.kind.bold(),
        result.error.category.red().bold(),
        result.error.message
    );
    println!(
        "Repository: {} | Source: {} | Occurrences: {}",
        result.context.repository,
        location(result),
        result.context.occurrence_count
    );
    println!();

    match &result.outcome {
        Outcome::Fix(fix) => print_fix(fix),
        Outcome::Alert(alert) => print_alert(alert),
    }
    println!();
}

fn print_fix(fix: &FixOutcome) {
    println!("═══ Code Fix ═══");
    println!("{}", fix.explanation);
    println!();
    for line in fix.original_code.lines() {
        println!("{}", format!("- {line}").red());
    }
    for line in fix.fixed_code.lines() {
        println!("{}", format!("+ {line}").green());
    }
    println!();
    match (&fix.pr, &fix.pr_error) {
        (Some(pr), _) => println!(
            "Change request #{} ({}): {}",
            pr.pr_number,
            pr.mode.to_string().cyan(),
            pr.pr_url
        ),
        (None, Some(reason)) => println!("{} {}", "Change request not filed:".yellow().bold(), reason),
        (None, None) => println!("{}", "Change request not filed".yellow()),
    }
}

fn print_alert(alert: &Alert) {
    println!("═══ Alert Suggestion ═══");
    if let Some(message) = &alert.error_message {
        println!("{message} ({} occurrences)", alert.occurrence_count);
    }
    if alert.suggestions.is_empty() {
        println!("  No suggestions.");
    }
    for suggestion in &alert.suggestions {
        println!("  • [{}] {}", colorize_priority(&suggestion.priority), suggestion.action);
        if let Some(details) = &suggestion.details {
            println!("    {details}");
        }
        if let Some(value) = &suggestion.recommended_value {
            println!("    Recommended: {value}");
        }
    }
}

fn render_markdown(result: &PipelineResult) -> String {
    let mut md = String::new();
    md.push_str(&format!(
        "# {} [{}]\n\n{}\n\n",
        result.error.kind, result.error.category, result.error.message
    ));
    md.push_str(&format!(
        "**Repository:** {} | **Source:** `{}` | **Occurrences:** {}\n\n",
        result.context.repository,
        location(result),
        result.context.occurrence_count
    ));
    if let Some(txn) = &result.transaction_id {
        md.push_str(&format!("**Transaction:** `{txn}`\n\n"));
    }

    match &result.outcome {
        Outcome::Fix(fix) => {
            md.push_str("## Code Fix\n\n");
            md.push_str(&format!("{}\n\n", fix.explanation));
            md.push_str("```diff\n");
            for line in fix.original_code.lines() {
                md.push_str(&format!("- {line}\n"));
            }
            for line in fix.fixed_code.lines() {
                md.push_str(&format!("+ {line}\n"));
            }
            md.push_str("```\n\n");
            match (&fix.pr, &fix.pr_error) {
                (Some(pr), _) => md.push_str(&format!(
                    "**Change request:** [#{}]({}) ({}, branch `{}`)\n",
                    pr.pr_number, pr.pr_url, pr.mode, pr.branch
                )),
                (None, Some(reason)) => {
                    md.push_str(&format!("**Change request not filed:** {reason}\n"))
                }
                (None, None) => md.push_str("**Change request not filed**\n"),
            }
        }
        Outcome::Alert(alert) => {
            md.push_str("## Alert Suggestion\n\n");
            if alert.suggestions.is_empty() {
                md.push_str("No suggestions.\n");
            }
            for suggestion in &alert.suggestions {
                md.push_str(&format!("- **[{}]** {}", suggestion.priority, suggestion.action));
                if let Some(value) = &suggestion.recommended_value {
                    md.push_str(&format!(" (`{value}`)"));
                }
                md.push('\n');
            }
        }
    }
    md
}

fn colorize_priority(priority: &str) -> colored::ColoredString {
    match priority {
        "HIGH" => priority.red().bold(),
        "MEDIUM" => priority.yellow().bold(),
        _ => priority.green().bold(),
    }
}
