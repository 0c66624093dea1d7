//! Test helpers shared across modelsmith crates.

pub mod generator;
pub mod scripts;

use modelsmith_config::ModelsmithConfig;
use modelsmith_sandbox::{CodeSandbox, MemoryHost};
use std::sync::Arc;

pub use generator::{FailingGenerator, FixedGenerator, RecordingGenerator};

/// A sandbox over a fresh in-memory host, returning the host for inspection.
pub fn memory_sandbox(config: &ModelsmithConfig) -> (CodeSandbox, MemoryHost) {
    let host = MemoryHost::new();
    let sandbox = CodeSandbox::new(Arc::new(host.clone()), config)
        .expect("memory sandbox from test config");
    (sandbox, host)
}
