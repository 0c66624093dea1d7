//! Error types for config loading and validation.

use thiserror::Error;

/// Errors returned while loading or validating config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading a config file failed.
    #[error("failed to read config: {0}")]
    ReadFailed(#[from] std::io::Error),
    /// Parsing JSON5 contents failed.
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] json5::Error),
    /// Converting JSON values into the typed model failed.
    #[error("failed to decode config: {0}")]
    DecodeFailed(#[from] serde_json::Error),
    /// A layer on disk could not be loaded.
    #[error("config layer {layer}: {source}")]
    Layer {
        layer: String,
        #[source]
        source: Box<ConfigError>,
    },
    /// A specific field failed validation.
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
    /// Cross-field validation failure.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Attach the layer label to an error raised while reading that layer.
    pub(crate) fn in_layer(self, layer: impl Into<String>) -> Self {
        match self {
            err @ ConfigError::InvalidField { .. } => err,
            err => ConfigError::Layer {
                layer: layer.into(),
                source: Box::new(err),
            },
        }
    }
}
