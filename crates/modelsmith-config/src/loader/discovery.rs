//! Where config layers live and how each one is read.

use super::{
    ConfigLayer, ConfigLayerSource, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILE,
    LayeredConfigOptions, LoadedLayer, schema, utils,
};
use crate::ConfigError;
use directories::UserDirs;
use log::debug;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A layer file the loader will look at, lowest precedence first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct LayerCandidate {
    pub source: ConfigLayerSource,
    pub path: PathBuf,
    /// Runtime overrides must exist; every other layer is optional.
    pub required: bool,
}

/// Ordered layer files for `cwd`, excluding requirements.
///
/// A file reachable under two sources is only planned once, at its first
/// (lower precedence) position.
pub(super) fn plan_layers(options: &LayeredConfigOptions, cwd: &Path) -> Vec<LayerCandidate> {
    let project_root = utils::find_project_root(cwd, &options.project_root_markers);
    match &project_root {
        Some(root) => debug!("resolved project root: {}", root.display()),
        None => debug!("project root not found; skipping project/repo layers"),
    }

    let mut optional = Vec::new();
    optional.extend(
        options
            .system_config_path
            .clone()
            .map(|path| (ConfigLayerSource::System, path)),
    );
    optional.extend(
        options
            .user_config_path
            .clone()
            .map(|path| (ConfigLayerSource::User, path)),
    );
    if let Some(root) = &project_root {
        optional.push((ConfigLayerSource::Project, root.join(DEFAULT_CONFIG_FILE)));
    }
    optional.push((ConfigLayerSource::Cwd, cwd.join(DEFAULT_CONFIG_FILE)));
    if let Some(root) = &project_root {
        optional.push((
            ConfigLayerSource::Repo,
            root.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE),
        ));
    }

    let mut seen = HashSet::new();
    let mut plan: Vec<LayerCandidate> = optional
        .into_iter()
        .filter(|(source, path)| {
            let fresh = seen.insert(utils::unique_path(path));
            if !fresh {
                debug!(
                    "skipping duplicate layer (source={:?}, path={})",
                    source,
                    path.display()
                );
            }
            fresh
        })
        .map(|(source, path)| LayerCandidate {
            source,
            path,
            required: false,
        })
        .collect();
    plan.extend(options.runtime_paths.iter().map(|path| LayerCandidate {
        source: ConfigLayerSource::Runtime,
        path: path.clone(),
        required: true,
    }));
    plan
}

/// Read one candidate; a missing optional file yields `None`.
pub(super) fn read_layer(candidate: &LayerCandidate) -> Result<Option<LoadedLayer>, ConfigError> {
    let LayerCandidate {
        source,
        path,
        required,
    } = candidate;
    if !required && !path.exists() {
        debug!(
            "optional layer missing (source={:?}, path={})",
            source,
            path.display()
        );
        return Ok(None);
    }

    let label = layer_label(*source, path);
    debug!("reading config layer {label}");
    let value = std::fs::read_to_string(path)
        .map_err(ConfigError::from)
        .and_then(|contents| json5::from_str::<Value>(&contents).map_err(ConfigError::from))
        .map_err(|err| err.in_layer(&label))?;
    schema::validate_layer_schema(&value, &label)?;
    Ok(Some(LoadedLayer {
        meta: ConfigLayer {
            source: *source,
            path: Some(path.clone()),
        },
        value,
    }))
}

/// Label used in errors, e.g. `user(/home/me/.modelsmith/modelsmith.json5)`.
pub(super) fn layer_label(source: ConfigLayerSource, path: &Path) -> String {
    let name = format!("{source:?}").to_lowercase();
    format!("{name}({})", path.display())
}

pub(super) fn default_user_config_path() -> Option<PathBuf> {
    UserDirs::new().map(|dirs| {
        dirs.home_dir()
            .join(DEFAULT_CONFIG_DIR)
            .join(DEFAULT_CONFIG_FILE)
    })
}
