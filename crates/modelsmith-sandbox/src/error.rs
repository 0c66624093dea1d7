//! Sandbox error types.

use crate::host::HostError;

/// Errors returned by the sandbox outside of the policy and execution outcomes.
///
/// A denied check or a faulting script is not an error: those are reported
/// through `PolicyVerdict` and `ExecutionResult`.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Host workspace operation failed.
    #[error("host error: {0}")]
    Host(#[from] HostError),
    /// Invalid sandbox configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An approved capability is not provided by the host.
    #[error("approved capability unavailable: {0}")]
    CapabilityUnavailable(String),
    /// Code text exceeds the configured size bound.
    #[error("code too large ({size} bytes, limit {limit})")]
    CodeTooLarge { size: usize, limit: usize },
    /// Another execution attempt is in flight.
    #[error("an execution attempt is already running")]
    Busy,
}
