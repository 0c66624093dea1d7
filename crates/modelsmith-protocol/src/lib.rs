//! Shared value types for policy verdicts, execution results, and the
//! code-generation collaborator.

mod generator;

pub use generator::{CodeGenerator, GenerationError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of forbidden capability a policy rule denotes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCategory {
    /// File handles and file-system mutation.
    FileSystem,
    /// Process spawning, shell access, and interpreter exit.
    ProcessControl,
    /// HTTP, socket, and FTP clients.
    Network,
    /// Dynamic evaluation, dynamic import, and reflective access.
    Reflection,
    /// Calls back into a code-generation service.
    SelfReference,
}

impl PolicyCategory {
    /// All categories in reporting order.
    pub const ALL: [PolicyCategory; 5] = [
        PolicyCategory::FileSystem,
        PolicyCategory::ProcessControl,
        PolicyCategory::Network,
        PolicyCategory::Reflection,
        PolicyCategory::SelfReference,
    ];

    /// Human-readable label shown to users.
    pub fn label(self) -> &'static str {
        match self {
            PolicyCategory::FileSystem => "file-system",
            PolicyCategory::ProcessControl => "process/OS control",
            PolicyCategory::Network => "network",
            PolicyCategory::Reflection => "reflection/dynamic-eval",
            PolicyCategory::SelfReference => "self-referential API call",
        }
    }
}

impl fmt::Display for PolicyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single policy rule that matched a piece of code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyViolation {
    /// Identifier of the violated rule.
    pub rule_id: String,
    /// Category the rule belongs to.
    pub category: PolicyCategory,
    /// Source pattern of the rule.
    pub pattern: String,
    /// Text that matched the pattern.
    pub matched_text: String,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (rule={}, matched={:?})",
            self.category, self.rule_id, self.matched_text
        )
    }
}

/// Outcome of the static policy check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum PolicyVerdict {
    /// No rule matched.
    Allowed,
    /// The first rule in order that matched.
    Denied(PolicyViolation),
}

impl PolicyVerdict {
    /// Whether the code may be run.
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyVerdict::Allowed)
    }

    /// Violation details when denied.
    pub fn violation(&self) -> Option<&PolicyViolation> {
        match self {
            PolicyVerdict::Allowed => None,
            PolicyVerdict::Denied(violation) => Some(violation),
        }
    }
}

/// Terminal result of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ExecutionResult {
    /// Script completed and the workspace was refreshed.
    Success {
        /// Name of the workspace left active.
        workspace: String,
        /// Lines printed by the script.
        output: Vec<String>,
    },
    /// Script raised a fault; the workspace was discarded.
    Failure {
        /// Fault message, verbatim.
        message: String,
    },
    /// Script exhausted its execution budget; the workspace was discarded.
    Cancelled {
        /// Which budget was exhausted.
        reason: String,
    },
}

impl ExecutionResult {
    /// Whether the attempt succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    /// Workspace left active by a successful attempt.
    pub fn workspace(&self) -> Option<&str> {
        match self {
            ExecutionResult::Success { workspace, .. } => Some(workspace),
            _ => None,
        }
    }
}

/// Result of the single check-and-run entry point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum RunOutcome {
    /// The static check denied the code; nothing was executed.
    Denied(PolicyViolation),
    /// The code was executed.
    Completed(ExecutionResult),
}

impl RunOutcome {
    /// Whether the code was executed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed(result) if result.is_success())
    }
}
