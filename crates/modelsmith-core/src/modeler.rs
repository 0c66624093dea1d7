//! Prompt in, sandboxed model out.

use crate::ModelerError;
use crate::response::strip_code_fence;
use log::{info, warn};
use modelsmith_protocol::{CodeGenerator, ExecutionResult, GenerationError, RunOutcome};
use modelsmith_sandbox::CodeSandbox;
use std::fmt;
use std::sync::Arc;

/// Coarse status of one submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    /// The model was built and left in its workspace.
    Generated,
    /// The generated code was denied without being run.
    PolicyDenied,
    /// The generated code faulted; its workspace was discarded.
    ExecutionFault,
    /// The generated code exhausted its budget; its workspace was discarded.
    Cancelled,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AttemptStatus::Generated => "generated",
            AttemptStatus::PolicyDenied => "policy_denied",
            AttemptStatus::ExecutionFault => "execution_fault",
            AttemptStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Generated code and what the sandbox made of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReport {
    pub code: String,
    pub outcome: RunOutcome,
}

impl SubmitReport {
    pub fn status(&self) -> AttemptStatus {
        match &self.outcome {
            RunOutcome::Denied(_) => AttemptStatus::PolicyDenied,
            RunOutcome::Completed(ExecutionResult::Success { .. }) => AttemptStatus::Generated,
            RunOutcome::Completed(ExecutionResult::Failure { .. }) => {
                AttemptStatus::ExecutionFault
            }
            RunOutcome::Completed(ExecutionResult::Cancelled { .. }) => AttemptStatus::Cancelled,
        }
    }

    /// Text shown to the person who made the request.
    pub fn user_message(&self) -> String {
        match &self.outcome {
            RunOutcome::Denied(violation) => format!(
                "Unsafe code detected ({}): matched {:?}. The code was not executed.",
                violation.category, violation.matched_text
            ),
            RunOutcome::Completed(ExecutionResult::Success { workspace, .. }) => {
                format!("Model generated in workspace {workspace}.")
            }
            RunOutcome::Completed(ExecutionResult::Failure { message }) => {
                format!("Model generation failed: {message}")
            }
            RunOutcome::Completed(ExecutionResult::Cancelled { reason }) => {
                format!("Model generation cancelled: {reason}")
            }
        }
    }
}

/// Sends requests to a generator and gates its code through the sandbox.
///
/// Every request is a single attempt; nothing is retried.
pub struct Modeler {
    generator: Arc<dyn CodeGenerator>,
    sandbox: CodeSandbox,
}

impl Modeler {
    pub fn new(generator: Arc<dyn CodeGenerator>, sandbox: CodeSandbox) -> Self {
        Self { generator, sandbox }
    }

    pub fn sandbox(&self) -> &CodeSandbox {
        &self.sandbox
    }

    /// Generate code for `prompt`, then check and run it.
    ///
    /// Code that does not parse is reported as a malformed generator
    /// response and never reaches a workspace. The run itself is synchronous
    /// and holds the calling task for up to the configured wall-clock budget,
    /// so callers on a shared runtime should drive this from a blocking-capable
    /// context.
    pub async fn submit(&self, prompt: &str) -> Result<SubmitReport, ModelerError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ModelerError::EmptyPrompt);
        }
        info!(
            "modeling request received (generator={}, prompt_chars={})",
            self.generator.description(),
            prompt.len()
        );
        let raw = self.generator.generate(prompt).await?;
        let code = strip_code_fence(&raw);
        if code.is_empty() {
            return Err(GenerationError::EmptyResponse("generated code is empty".to_string()).into());
        }
        if self.sandbox.check(&code).is_allowed() {
            if let Err(err) = self.sandbox.check_syntax(&code) {
                warn!("generated code does not parse (error={})", err);
                return Err(GenerationError::MalformedResponse(format!(
                    "generated code does not parse: {err}"
                ))
                .into());
            }
        }
        let outcome = self.sandbox.check_and_run(&code)?;
        let report = SubmitReport { code, outcome };
        info!("modeling request finished (status={})", report.status());
        Ok(report)
    }
}
