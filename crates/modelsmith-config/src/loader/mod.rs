//! Layered config loading.
//!
//! Each layer is a JSON5 file checked against the schema on its own; layers
//! are merged lowest precedence first, with keys from the requirements file
//! locked, and the merged value is decoded and validated once.

mod discovery;
mod merge;
mod schema;
mod utils;


use crate::{ConfigError, ModelsmithConfig};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "modelsmith.json5";
/// Hidden directory under the home and repo roots.
const DEFAULT_CONFIG_DIR: &str = ".modelsmith";
const DEFAULT_PROJECT_ROOT_MARKERS: &[&str] = &[".git"];

/// Directory holding system-wide config and requirements.
#[cfg(unix)]
const SYSTEM_CONFIG_DIR: Option<&str> = Some("/etc/modelsmith");
#[cfg(windows)]
const SYSTEM_CONFIG_DIR: Option<&str> = Some("C:\\ProgramData\\modelsmith");
#[cfg(not(any(unix, windows)))]
const SYSTEM_CONFIG_DIR: Option<&str> = None;
/// Requirements filename inside the system config directory.
const REQUIREMENTS_FILE: &str = "requirements.json5";

/// Merged config and the layers that went into it, in load order.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub config: ModelsmithConfig,
    pub layers: Vec<ConfigLayer>,
}

/// Where a layer came from, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// Locks every key it sets.
    Requirements,
    System,
    User,
    /// `modelsmith.json5` at the project root.
    Project,
    Cwd,
    /// `.modelsmith/modelsmith.json5` at the project root.
    Repo,
    /// Paths passed explicitly by the caller.
    Runtime,
}

/// One loaded layer.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    pub path: Option<PathBuf>,
}

/// Layer locations. `None` skips that layer.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    pub cwd: PathBuf,
    /// Optional system config path (defaults to `/etc/modelsmith/modelsmith.json5` on Unix).
    pub system_config_path: Option<PathBuf>,
    /// Optional user config path (defaults to `~/.modelsmith/modelsmith.json5`).
    pub user_config_path: Option<PathBuf>,
    pub requirements_path: Option<PathBuf>,
    pub runtime_paths: Vec<PathBuf>,
    /// Names whose presence marks a directory as the project root.
    pub project_root_markers: Vec<String>,
}

impl LayeredConfigOptions {
    /// Default system, user and requirements locations for `cwd`.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            system_config_path: SYSTEM_CONFIG_DIR
                .map(|dir| Path::new(dir).join(DEFAULT_CONFIG_FILE)),
            user_config_path: discovery::default_user_config_path(),
            requirements_path: SYSTEM_CONFIG_DIR.map(|dir| Path::new(dir).join(REQUIREMENTS_FILE)),
            runtime_paths: Vec::new(),
            project_root_markers: DEFAULT_PROJECT_ROOT_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }

    /// Append a runtime layer; later paths win over earlier ones.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

impl ModelsmithConfig {
    /// Read one file as the whole config.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("loading config from path: {}", path.display());
        let contents = fs::read_to_string(path)?;
        let value: Value = json5::from_str(&contents)?;
        config_from_value(value, &format!("config({})", path.display()))
    }

    /// Parse JSON5 text as the whole config.
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from string (bytes={})", contents.len());
        let value: Value = json5::from_str(contents)?;
        config_from_value(value, "config")
    }

    /// [`Self::load_layered_with_options`] with default locations.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        info!(
            "loading layered config (cwd={}, defaults=true)",
            cwd.as_ref().display()
        );
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Load, merge and validate every layer `options` points at.
    ///
    /// Layer precedence (low -> high): requirements (constraints), system, user,
    /// project, cwd, repo, runtime overrides. Keys present in the requirements
    /// layer cannot be overridden by any later layer.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let cwd = utils::normalize_path(&options.cwd)?;
        debug!("normalized cwd for config load: {}", cwd.display());

        let requirements = match &options.requirements_path {
            Some(path) => discovery::read_layer(&discovery::LayerCandidate {
                source: ConfigLayerSource::Requirements,
                path: path.clone(),
                required: false,
            })?,
            None => None,
        };
        let constraints = requirements.as_ref().map(|layer| layer.value.clone());

        let mut loaded = Vec::new();
        for candidate in discovery::plan_layers(&options, &cwd) {
            if let Some(layer) = discovery::read_layer(&candidate)? {
                loaded.push(layer);
            }
        }

        let mut merged = constraints
            .clone()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        for layer in &loaded {
            merge::merge_json_with_constraints(&mut merged, &layer.value, constraints.as_ref());
        }
        let layers: Vec<ConfigLayer> = requirements
            .into_iter()
            .chain(loaded)
            .map(|layer| layer.meta)
            .collect();

        let config = config_from_value(merged, "effective")?;
        info!(
            "layered config loaded (layers={}, approved_capabilities={})",
            layers.len(),
            config.capabilities.approved.len()
        );
        Ok(LayeredConfig { config, layers })
    }

    /// Cross-field checks run after decoding.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for name in &self.capabilities.approved {
            if !is_identifier(name) {
                return Err(ConfigError::Invalid(format!(
                    "approved capability is not an identifier: {name:?}"
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "approved capability listed twice: {name}"
                )));
            }
        }

        let mut rule_ids = HashSet::new();
        for rule in &self.policy.extra_rules {
            if rule.id.trim().is_empty() || rule.pattern.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "policy rules require a non-empty id and pattern".to_string(),
                ));
            }
            if !rule_ids.insert(rule.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "policy rule id listed twice: {}",
                    rule.id
                )));
            }
        }

        if !is_identifier(&self.execution.workspace_prefix) {
            return Err(ConfigError::Invalid(format!(
                "workspace prefix is not an identifier: {:?}",
                self.execution.workspace_prefix
            )));
        }
        if self.policy.max_code_bytes == Some(0) {
            return Err(ConfigError::Invalid(
                "policy.max_code_bytes must be positive".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generator.temperature) {
            return Err(ConfigError::Invalid(format!(
                "generator temperature out of range [0, 2]: {}",
                self.generator.temperature
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
struct LoadedLayer {
    meta: ConfigLayer,
    value: Value,
}

fn config_from_value(value: Value, label: &str) -> Result<ModelsmithConfig, ConfigError> {
    schema::validate_layer_schema(&value, label)?;
    let config: ModelsmithConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}

/// ASCII identifier check shared by capability names and workspace prefixes.
fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
