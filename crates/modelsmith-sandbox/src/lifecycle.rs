//! Execution lifecycle for a single attempt.
//!
//! `Start -> Executing -> Finalizing -> Done` on success and
//! `Executing -> Failing -> Done` otherwise. The workspace created in `Start`
//! is either refreshed and left active, or closed before `run` returns.

use crate::SandboxError;
use crate::environment::CapabilityEnvironmentBuilder;
use crate::host::CadHost;
use log::{debug, info, warn};
use modelsmith_protocol::ExecutionResult;
use rhai::EvalAltResult;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use uuid::Uuid;

/// Lifecycle states, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Start,
    Executing,
    Finalizing,
    Failing,
    Done,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Start => "start",
            LifecycleState::Executing => "executing",
            LifecycleState::Finalizing => "finalizing",
            LifecycleState::Failing => "failing",
            LifecycleState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Runs one code text against a fresh workspace. Consumed by `run`.
pub struct ExecutionLifecycle<'a> {
    host: &'a dyn CadHost,
    builder: &'a CapabilityEnvironmentBuilder,
    workspace_prefix: &'a str,
    workspace: String,
    state: LifecycleState,
}

impl<'a> ExecutionLifecycle<'a> {
    pub fn new(
        host: &'a dyn CadHost,
        builder: &'a CapabilityEnvironmentBuilder,
        workspace_prefix: &'a str,
    ) -> Self {
        Self {
            host,
            builder,
            workspace_prefix,
            workspace: workspace_name(workspace_prefix),
            state: LifecycleState::Start,
        }
    }

    /// Name of the workspace this attempt creates.
    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// Execute `code` with no policy check of its own.
    ///
    /// Script faults, parse errors and panics from host callbacks are all
    /// reported as `ExecutionResult::Failure`; budget exhaustion as
    /// `ExecutionResult::Cancelled`. `Err` is reserved for host and
    /// environment configuration problems.
    pub fn run(mut self, code: &str) -> Result<ExecutionResult, SandboxError> {
        self.host.create_workspace(&self.workspace)?;
        info!(
            "execution attempt started (workspace={}, prefix={}, code_len={})",
            self.workspace,
            self.workspace_prefix,
            code.len()
        );
        self.transition(LifecycleState::Executing);

        let environment = match self.builder.build(self.host) {
            Ok(environment) => environment,
            Err(err) => {
                warn!(
                    "environment build failed (workspace={}, error={})",
                    self.workspace, err
                );
                self.transition(LifecycleState::Failing);
                self.discard_workspace();
                self.transition(LifecycleState::Done);
                return Err(err);
            }
        };

        let mut runtime = environment.into_runtime();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| runtime.run(code)));
        let fault = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(classify_error(&err)),
            Err(payload) => Some(ExecutionResult::Failure {
                message: panic_message(payload.as_ref()),
            }),
        };

        match fault {
            None => {
                let output = runtime.output();
                drop(runtime);
                self.transition(LifecycleState::Finalizing);
                if let Err(err) = self.host.refresh_view() {
                    warn!(
                        "view refresh failed (workspace={}, error={})",
                        self.workspace, err
                    );
                }
                self.transition(LifecycleState::Done);
                info!(
                    "execution attempt succeeded (workspace={}, output_lines={})",
                    self.workspace,
                    output.len()
                );
                Ok(ExecutionResult::Success {
                    workspace: self.workspace,
                    output,
                })
            }
            Some(result) => {
                drop(runtime);
                self.transition(LifecycleState::Failing);
                self.discard_workspace();
                self.transition(LifecycleState::Done);
                info!(
                    "execution attempt failed (workspace={}, result={:?})",
                    self.workspace, result
                );
                Ok(result)
            }
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        info!(
            "lifecycle transition (workspace={}, from={}, to={})",
            self.workspace, self.state, next
        );
        self.state = next;
    }

    /// Best-effort close; a failure is logged and does not change the outcome.
    fn discard_workspace(&self) {
        match self.host.close_workspace(&self.workspace) {
            Ok(()) => debug!("workspace discarded (workspace={})", self.workspace),
            Err(err) => warn!(
                "workspace discard failed (workspace={}, error={})",
                self.workspace, err
            ),
        }
    }
}

/// `{prefix}_{8 hex chars}`.
fn workspace_name(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &id[..8])
}

fn classify_error(err: &EvalAltResult) -> ExecutionResult {
    match err {
        EvalAltResult::ErrorTooManyOperations(_) => ExecutionResult::Cancelled {
            reason: "operation budget exhausted".to_string(),
        },
        EvalAltResult::ErrorTerminated(token, _) => ExecutionResult::Cancelled {
            reason: token.to_string(),
        },
        other => ExecutionResult::Failure {
            message: other.to_string(),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|text| text.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("host callback panicked: {detail}")
}
