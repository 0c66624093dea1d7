//! Host CAD application boundary.
//!
//! The sandbox consumes exactly this surface: workspace creation and
//! disposal, a view refresh, and named capability handles. Everything else
//! about the host's object model stays behind the capability handles.

pub mod memory;

use rhai::{Dynamic, Module, Shared};
use std::fmt;

/// Errors raised by host workspace operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// A workspace with this name is already open.
    #[error("workspace already exists: {0}")]
    WorkspaceExists(String),
    /// No workspace with this name is open.
    #[error("unknown workspace: {0}")]
    UnknownWorkspace(String),
    /// The operation needs an active workspace.
    #[error("no active workspace")]
    NoActiveWorkspace,
    /// The host could not perform the operation.
    #[error("host unavailable: {0}")]
    Unavailable(String),
}

/// Shape of a capability as seen by scripts.
#[derive(Clone)]
pub enum CapabilityKind {
    /// A constant bound under the capability name; its methods come from `methods`.
    Object {
        value: Dynamic,
        methods: Shared<Module>,
    },
    /// A module reachable as `Name::function(...)`; `methods` act on the
    /// values its functions return.
    Namespace {
        module: Shared<Module>,
        methods: Shared<Module>,
    },
}

/// A named, host-provided handle exposed to generated code.
#[derive(Clone)]
pub struct Capability {
    pub name: String,
    /// One-line description used when documenting the capability surface.
    pub description: String,
    pub kind: CapabilityKind,
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            CapabilityKind::Object { .. } => "object",
            CapabilityKind::Namespace { .. } => "namespace",
        };
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

/// Host application operations used by the execution lifecycle.
pub trait CadHost: Send + Sync {
    /// Create a workspace with the given name and make it active.
    fn create_workspace(&self, name: &str) -> Result<(), HostError>;

    /// Discard a workspace and every object in it.
    fn close_workspace(&self, name: &str) -> Result<(), HostError>;

    /// Name of the active workspace, if any.
    fn active_workspace(&self) -> Option<String>;

    /// Whether a workspace with this name is open.
    fn has_workspace(&self, name: &str) -> bool;

    /// Refresh the active view so the resulting model is observable.
    fn refresh_view(&self) -> Result<(), HostError>;

    /// Fetch a fresh handle for a capability. `None` means the host does not
    /// provide it.
    fn capability(&self, name: &str) -> Option<Capability>;
}
