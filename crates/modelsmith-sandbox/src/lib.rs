//! Sandboxed execution of generated CAD scripts.
//!
//! Code text passes a static policy check, then runs in a freshly built
//! capability environment inside a new host workspace that is discarded on
//! any failure.

pub mod environment;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod policy;
mod sandbox;

/// Sandbox error type.
pub use error::SandboxError;
/// Environment construction and limits.
pub use environment::{
    CapabilityEnvironment, CapabilityEnvironmentBuilder, ExecutionLimits, ScriptRuntime,
};
/// Host boundary and the in-memory reference host.
pub use host::{CadHost, Capability, CapabilityKind, HostError, memory::MemoryHost};
/// Execution lifecycle.
pub use lifecycle::{ExecutionLifecycle, LifecycleState};
/// Static policy rules.
pub use policy::{PolicyRule, PolicyRuleSet, RuleSource};
/// Check-and-run gate.
pub use sandbox::{CapabilityDescription, CodeSandbox};
