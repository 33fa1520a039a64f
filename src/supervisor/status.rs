//! On-demand textual report of all tracked children.

use std::fmt::Write as _;

use crate::registry::ProcessRegistry;

/// Render the status report: header/footer-framed rows of
/// (timestamp, pid, command-line), sorted by pid, with an explicit
/// message when no children are active.
#[must_use]
pub fn render_status(registry: &ProcessRegistry) -> String {
    let records = registry.snapshot_active();

    let mut report = String::new();
    let _ = writeln!(
        report,
        "{:>24} | {:>12} | {}",
        "   *** timestamp ***   ", "*** pid ***", "*** command-line ***"
    );

    for record in &records {
        let _ = writeln!(
            report,
            "{:>24}   {:>12}   {}",
            record.created_at.format("%Y-%m-%dT%H:%M:%S%.3f"),
            record.pid,
            record.command_line
        );
    }

    if records.is_empty() {
        let _ = writeln!(report, "\nNo child processes currently active");
    } else {
        let _ = writeln!(report, "{} child processes active", records.len());
    }

    report
}
