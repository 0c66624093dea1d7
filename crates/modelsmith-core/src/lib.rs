//! Natural-language modeling on top of the code sandbox.
//!
//! This crate owns the system prompt, the Gemini code generator, response
//! cleanup, and the [`Modeler`] that ties generation to check-and-run.

pub mod error;
pub mod gemini;
pub mod modeler;
pub mod prompt;
pub mod response;

pub use error::ModelerError;
pub use gemini::GeminiGenerator;
pub use modeler::{AttemptStatus, Modeler, SubmitReport};
pub use prompt::PromptBuilder;
pub use response::strip_code_fence;
