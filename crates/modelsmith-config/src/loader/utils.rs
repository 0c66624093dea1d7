//! Path helpers for layer discovery.

use crate::ConfigError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Canonicalize the cwd, keeping it as-is when it does not exist yet.
pub(super) fn normalize_path(path: &Path) -> Result<PathBuf, ConfigError> {
    path.canonicalize().or_else(|err| {
        if err.kind() == ErrorKind::NotFound {
            Ok(path.to_path_buf())
        } else {
            Err(ConfigError::ReadFailed(err))
        }
    })
}

/// Key used to skip a layer file that was already loaded under another source.
pub(super) fn unique_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Nearest ancestor of `cwd` (inclusive) containing any of the markers.
pub(super) fn find_project_root(cwd: &Path, markers: &[String]) -> Option<PathBuf> {
    cwd.ancestors()
        .find(|dir| markers.iter().any(|marker| dir.join(marker).exists()))
        .map(Path::to_path_buf)
}
