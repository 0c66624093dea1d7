//! Public SDK surface for modelsmith.
//!
//! This crate re-exports the building blocks and carries the small helpers
//! the `modelsmith` binary uses to read scripts and report results.

/// Re-export for convenience.
pub use modelsmith_config as config;
pub use modelsmith_core as core;
/// Re-export for convenience.
pub use modelsmith_protocol as protocol;
pub use modelsmith_sandbox as sandbox;

use modelsmith_protocol::{ExecutionResult, PolicyViolation, RunOutcome};
use modelsmith_sandbox::MemoryHost;
use std::io::Read;
use std::path::Path;

/// Initialize logging with `env_logger`, honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();
}

/// Read script text from a file, or from stdin when the path is `-`.
pub fn read_source(path: &Path) -> std::io::Result<String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        return Ok(buffer);
    }
    std::fs::read_to_string(path)
}

/// One line per violation, in rule order.
pub fn render_violations(violations: &[PolicyViolation]) -> String {
    if violations.is_empty() {
        return "allowed: no policy rule matched".to_string();
    }
    violations
        .iter()
        .map(|violation| format!("denied: {violation}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Human-readable report of a check-and-run outcome on the in-memory host.
pub fn render_outcome(outcome: &RunOutcome, host: &MemoryHost) -> String {
    match outcome {
        RunOutcome::Denied(violation) => {
            format!("denied: {violation}\nThe code was not executed.")
        }
        RunOutcome::Completed(ExecutionResult::Success { workspace, output }) => {
            let mut lines = vec![format!("success: workspace {workspace}")];
            lines.extend(output.iter().map(|line| format!("  > {line}")));
            for feature in host.features(workspace).unwrap_or_default() {
                let [x, y, z] = feature.solid.placement;
                lines.push(format!(
                    "  {} {} volume={:.3} at ({x}, {y}, {z})",
                    feature.label,
                    feature.solid.kind_name(),
                    feature.solid.volume()
                ));
            }
            lines.join("\n")
        }
        RunOutcome::Completed(ExecutionResult::Failure { message }) => {
            format!("failure: {message}")
        }
        RunOutcome::Completed(ExecutionResult::Cancelled { reason }) => {
            format!("cancelled: {reason}")
        }
    }
}
