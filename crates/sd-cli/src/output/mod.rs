//! Output formatting utilities for the CLI
//!
//! Progress lines while hosts are being deployed, and the summary table
//! printed once every attempt has finished.

use tabled::{settings::Style, Table, Tabled};

use sd_core::{DeployResult, RunOutcome};
use sd_deploy::DeployEvent;

/// Format every host's result as an ASCII table
///
/// Rows follow host-list order. Failed hosts show the failure class and,
/// when known, the step that was running.
pub fn format_results(outcome: &RunOutcome) -> String {
    if outcome.results.is_empty() {
        return "No hosts deployed".to_string();
    }

    #[derive(Tabled)]
    struct ResultRow {
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "DURATION")]
        duration: String,
        #[tabled(rename = "UPLOAD")]
        upload: String,
        #[tabled(rename = "ERROR")]
        error: String,
    }

    let rows: Vec<ResultRow> = outcome
        .results
        .iter()
        .map(|r| ResultRow {
            host: r.target.to_string(),
            status: if r.success { "ok" } else { "failed" }.to_string(),
            duration: format_duration(r.duration_seconds),
            upload: r
                .upload_seconds
                .map(format_duration)
                .unwrap_or_else(|| "-".to_string()),
            error: r
                .error
                .as_ref()
                .map(|e| match e.step {
                    Some(step) => format!("{} during {}: {}", e.kind, step, e.detail),
                    None => format!("{}: {}", e.kind, e.detail),
                })
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// One-line run summary
pub fn format_summary(outcome: &RunOutcome) -> String {
    format!(
        "{} of {} host(s) deployed in {}",
        outcome.succeeded().count(),
        outcome.results.len(),
        format_duration(outcome.duration_seconds)
    )
}

/// Print a progress line for an orchestrator event
pub fn print_event(event: &DeployEvent) {
    match event {
        DeployEvent::AttemptStarted { target } => print_info(&format!("{}: deploying", target)),
        DeployEvent::StepFinished {
            target,
            step,
            duration,
        } => tracing::debug!("{}: {} done in {:?}", target, step, duration),
        DeployEvent::AttemptFinished(result) => {
            let line = format_finished(result);
            if result.success {
                print_success(&line);
            } else {
                print_error(&line);
            }
        }
    }
}

/// Text of the line printed when a host finishes
pub fn format_finished(result: &DeployResult) -> String {
    let elapsed = format_duration(result.duration_seconds);
    match &result.error {
        None => format!("{}: deployed in {}", result.target, elapsed),
        Some(e) => format!(
            "{}: failed after {} ({}): {}",
            result.target, elapsed, e.kind, e.detail
        ),
    }
}

/// Format duration in human-readable form
pub fn format_duration(secs: f64) -> String {
    if secs < 1.0 {
        format!("{}ms", (secs * 1000.0).round() as u64)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let whole = secs.round() as u64;
        format!("{}m {}s", whole / 60, whole % 60)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
