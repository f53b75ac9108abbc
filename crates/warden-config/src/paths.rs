//! Well-known configuration file locations.

use std::path::{Path, PathBuf};

use crate::ConfigError;

pub struct Paths;

impl Paths {
    /// User-level defaults: `~/.config/warden/config.toml` (or the
    /// platform equivalent).
    pub fn user_config_file() -> Result<PathBuf, ConfigError> {
        directories::ProjectDirs::from("", "", "warden")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or_else(|| ConfigError::Xdg("no home directory available".to_string()))
    }

    /// Git-tracked project configuration.
    pub fn project_config_file(project_dir: &Path) -> PathBuf {
        project_dir.join("warden.toml")
    }

    /// Gitignored local overrides.
    pub fn local_config_file(project_dir: &Path) -> PathBuf {
        project_dir.join("warden.local.toml")
    }
}
