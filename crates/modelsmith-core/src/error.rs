//! Error types for the modeler.

use modelsmith_protocol::GenerationError;
use modelsmith_sandbox::SandboxError;
use thiserror::Error;

/// Errors returned by [`crate::Modeler::submit`].
#[derive(Debug, Error)]
pub enum ModelerError {
    /// The request had no text.
    #[error("prompt is empty")]
    EmptyPrompt,
    /// The generator failed; nothing was executed.
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    /// The sandbox refused the attempt before running it.
    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}
