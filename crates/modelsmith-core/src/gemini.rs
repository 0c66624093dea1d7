//! Gemini `generateContent` client.

use async_trait::async_trait;
use log::{debug, info};
use modelsmith_config::GeneratorConfig;
use modelsmith_protocol::{CodeGenerator, GenerationError};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Code generator backed by the Gemini REST API.
pub struct GeminiGenerator {
    client: Client,
    config: GeneratorConfig,
    api_key: String,
    system_prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GeminiGenerator {
    /// Read the API key from the environment variable named in `config`.
    pub fn from_env(
        config: GeneratorConfig,
        system_prompt: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingApiKey(config.api_key_env.clone()))?;
        Ok(Self::with_api_key(config, api_key, system_prompt))
    }

    pub fn with_api_key(
        config: GeneratorConfig,
        api_key: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            config,
            api_key: api_key.into(),
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    fn request(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(self.system_prompt.clone()),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
                response_mime_type: "text/plain",
            },
        }
    }
}

#[async_trait]
impl CodeGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(
            "calling gemini (model={}, prompt_chars={})",
            self.config.model,
            prompt.len()
        );
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|err| GenerationError::Request(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| GenerationError::Request(err.to_string()))?;
        if !status.is_success() {
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let code = extract_code(&body)?;
        info!(
            "gemini response received (model={}, code_chars={})",
            self.config.model,
            code.len()
        );
        Ok(code)
    }

    fn description(&self) -> String {
        format!("gemini ({})", self.config.model)
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_code(body: &str) -> Result<String, GenerationError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|err| GenerationError::MalformedResponse(err.to_string()))?;
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::EmptyResponse("no candidates".to_string()))?;
    let parts = candidate.content.map(|content| content.parts).unwrap_or_default();
    if parts.is_empty() {
        return Err(GenerationError::EmptyResponse(
            "candidate has no parts".to_string(),
        ));
    }
    let text = parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(GenerationError::EmptyResponse(
            "candidate text is blank".to_string(),
        ));
    }
    Ok(text)
}
