use async_trait::async_trait;

/// Errors returned by code-generation collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The API key environment variable is not set.
    #[error("missing api key: set {0}")]
    MissingApiKey(String),
    /// The request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Request(String),
    /// The service answered with a non-success status.
    #[error("api error ({status}): {body}")]
    Api { status: u16, body: String },
    /// The service returned no usable text.
    #[error("empty response: {0}")]
    EmptyResponse(String),
    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Turns a natural-language modeling request into script text.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Generate code for a prompt.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Human-readable description of the backend, e.g. `"gemini (gemini-2.5-flash)"`.
    fn description(&self) -> String;
}
