use async_trait::async_trait;
use modelsmith_protocol::{CodeGenerator, GenerationError};
use parking_lot::Mutex;
use std::sync::Arc;

/// Returns the same code for every prompt.
#[derive(Debug, Clone)]
pub struct FixedGenerator {
    code: String,
}

impl FixedGenerator {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

#[async_trait]
impl CodeGenerator for FixedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Ok(self.code.clone())
    }

    fn description(&self) -> String {
        "fixed".to_string()
    }
}

/// Fails every request with the given error.
#[derive(Debug, Clone)]
pub struct FailingGenerator {
    error: GenerationError,
}

impl FailingGenerator {
    pub fn new(error: GenerationError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl CodeGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(self.error.clone())
    }

    fn description(&self) -> String {
        "failing".to_string()
    }
}

/// Records every prompt it receives and answers with fixed code.
#[derive(Debug, Clone)]
pub struct RecordingGenerator {
    code: String,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl RecordingGenerator {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl CodeGenerator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self.code.clone())
    }

    fn description(&self) -> String {
        "recording".to_string()
    }
}
