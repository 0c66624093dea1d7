//! Configuration schema for modelsmith.

use modelsmith_protocol::PolicyCategory;
use serde::{Deserialize, Serialize};

/// Root config for modelsmith.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelsmithConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl ModelsmithConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> ModelsmithConfigBuilder {
        ModelsmithConfigBuilder::new()
    }
}

/// Builder for assembling a `ModelsmithConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct ModelsmithConfigBuilder {
    config: ModelsmithConfig,
}

impl ModelsmithConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: ModelsmithConfig::default(),
        }
    }

    /// Replace the static policy configuration.
    pub fn policy(mut self, policy: PolicyConfig) -> Self {
        self.config.policy = policy;
        self
    }

    /// Replace the approved capability list.
    pub fn capabilities(mut self, capabilities: CapabilitiesConfig) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    /// Replace the execution budget configuration.
    pub fn execution(mut self, execution: ExecutionConfig) -> Self {
        self.config.execution = execution;
        self
    }

    /// Replace the code generator configuration.
    pub fn generator(mut self, generator: GeneratorConfig) -> Self {
        self.config.generator = generator;
        self
    }

    /// Finalize and return the built `ModelsmithConfig`.
    pub fn build(self) -> ModelsmithConfig {
        self.config
    }
}

/// Static policy check configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Integrator rules appended after the builtin rule table.
    #[serde(default)]
    pub extra_rules: Vec<PolicyRuleConfig>,
    /// Largest code text accepted for checking, in bytes.
    #[serde(default = "default_max_code_bytes")]
    pub max_code_bytes: Option<usize>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            extra_rules: Vec::new(),
            max_code_bytes: default_max_code_bytes(),
        }
    }
}

fn default_max_code_bytes() -> Option<usize> {
    Some(64 * 1024)
}

/// A single integrator-defined policy rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyRuleConfig {
    pub id: String,
    pub category: PolicyCategory,
    /// Case-insensitive regular expression matched against raw code text.
    pub pattern: String,
}

/// Host capabilities exposed to generated code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilitiesConfig {
    #[serde(default = "default_approved_capabilities")]
    pub approved: Vec<String>,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            approved: default_approved_capabilities(),
        }
    }
}

/// Default capability allowlist: application root, view handle, solid modeling.
fn default_approved_capabilities() -> Vec<String> {
    ["App", "Gui", "Part"]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Workspace naming and execution budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionConfig {
    #[serde(default = "default_workspace_prefix")]
    pub workspace_prefix: String,
    #[serde(default = "default_max_operations")]
    pub max_operations: Option<u64>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,
    #[serde(default = "default_max_expr_depth")]
    pub max_expr_depth: usize,
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,
    #[serde(default = "default_max_array_size")]
    pub max_array_size: usize,
    #[serde(default = "default_max_map_size")]
    pub max_map_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workspace_prefix: default_workspace_prefix(),
            max_operations: default_max_operations(),
            timeout_ms: default_timeout_ms(),
            max_call_levels: default_max_call_levels(),
            max_expr_depth: default_max_expr_depth(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_array_size(),
            max_map_size: default_max_map_size(),
        }
    }
}

fn default_workspace_prefix() -> String {
    "ModelsmithModel".to_string()
}

fn default_max_operations() -> Option<u64> {
    Some(5_000_000)
}

fn default_timeout_ms() -> Option<u64> {
    Some(10_000)
}

fn default_max_call_levels() -> usize {
    64
}

fn default_max_expr_depth() -> usize {
    64
}

fn default_max_string_size() -> usize {
    1024 * 1024
}

fn default_max_array_size() -> usize {
    100_000
}

fn default_max_map_size() -> usize {
    10_000
}

/// Code generation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_provider")]
    pub provider: String,
    #[serde(default = "default_generator_model")]
    pub model: String,
    #[serde(default = "default_generator_endpoint")]
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub additional_instructions: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: default_generator_provider(),
            model: default_generator_model(),
            endpoint: default_generator_endpoint(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            additional_instructions: None,
        }
    }
}

fn default_generator_provider() -> String {
    "gemini".to_string()
}

fn default_generator_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_generator_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_output_tokens() -> u32 {
    20_000
}
