//! The error/notification sink.
//!
//! Every pipeline failure funnels through [`report`]: a styled, human
//! readable line on stderr plus a structured tracing record. Reporting never
//! terminates the process; the registry marks the owning task as finished so
//! a single broken pipeline cannot hang a run.

use std::fmt::Display;
use std::time::Instant;

use console::style;

/// Surface a task failure to the user without aborting the run.
pub fn report(task: &str, err: &anyhow::Error) {
    tracing::error!(task = %task, error = %err, "task failed");
    eprintln!(
        "{} task {} failed: {:#}",
        style("✗").red().bold(),
        style(task).cyan(),
        err
    );
}

/// Styled elapsed-time suffix for status lines.
pub fn as_overhead(start: Instant) -> impl Display {
    let elapsed = start.elapsed().as_millis();
    style(format!("(+{elapsed}ms)")).blue()
}
