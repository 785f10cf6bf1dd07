//! `doctor` subcommand: run the self-check diagnostics and report.

use crate::diagnostics::DiagnosticReport;

/// Run every diagnostic check and print the report. Returns `Ok(())`
/// with a non-zero process exit only when the caller asks for it; the
/// health verdict is conveyed back via the boolean return so `main`
/// can choose the exit code.
pub fn cmd_doctor() -> anyhow::Result<bool> {
    let report = DiagnosticReport::generate();
    report.print();

    if report.is_healthy() {
        println!("\nAll checks passed.");
    } else {
        println!("\n{} issue(s) found.", report.issues().len());
    }

    Ok(report.is_healthy())
}
