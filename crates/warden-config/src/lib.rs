//! Configuration management for Warden
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (WARDEN_* prefix, highest precedence)
//! 2. warden.local.toml (gitignored, local overrides)
//! 3. warden.toml (git-tracked, project config)
//! 4. ~/.config/warden/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! Backend selection and tuning, cache TTL, sweep cadence, and the
//! escalation thresholds are all configurable; the built-in defaults suit
//! a small single-node deployment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main Warden configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub sweep: SweepConfig,
    pub escalation: EscalationConfig,
}

impl WardenConfig {
    /// Rejects configurations that cannot be wired into a running system.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.sql_workers == 0 {
            return Err(ConfigError::Validation(
                "storage.sql_workers must be at least 1".to_string(),
            ));
        }
        if self.storage.sql_call_deadline_ms == 0 {
            return Err(ConfigError::Validation(
                "storage.sql_call_deadline_ms must be positive".to_string(),
            ));
        }
        if self.sweep.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "sweep.interval_secs must be positive".to_string(),
            ));
        }
        let e = &self.escalation;
        if !(e.notice_level <= e.mute_level && e.mute_level <= e.ban_level) {
            return Err(ConfigError::Validation(format!(
                "escalation tiers must be ordered notice <= mute <= ban (got {}, {}, {})",
                e.notice_level, e.mute_level, e.ban_level
            )));
        }
        Ok(())
    }

    /// Resolve relative paths against the project directory.
    pub fn resolve_paths(&mut self, project_dir: &Path) {
        if self.storage.data_dir.is_relative() {
            self.storage.data_dir = project_dir.join(&self.storage.data_dir);
        }
        if self.storage.sql_path.is_relative() {
            self.storage.sql_path = project_dir.join(&self.storage.sql_path);
        }
    }
}

/// Which backend owns the dataset, chosen once at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// JSON snapshots behind a process-wide lock.
    File,
    /// SQLite through the bounded worker pool.
    Sql,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Root directory for the file backend's dataset files.
    pub data_dir: PathBuf,
    /// SQLite database location for the relational backend.
    pub sql_path: PathBuf,
    /// Worker threads draining the relational operation queue.
    pub sql_workers: usize,
    /// Per-call deadline for relational operations, in milliseconds.
    pub sql_call_deadline_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::File,
            data_dir: PathBuf::from(".warden/data"),
            sql_path: PathBuf::from(".warden/warden.db"),
            sql_workers: 2,
            sql_call_deadline_ms: 5_000,
        }
    }
}

impl StorageConfig {
    pub fn sql_call_deadline(&self) -> Duration {
        Duration::from_millis(self.sql_call_deadline_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Per-target read cache entries expire this long after write.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Cadence of the expiration sweep.
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Warning-level boundaries for automatic escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub notice_level: u32,
    pub mute_level: u32,
    pub mute_duration_secs: u64,
    pub ban_level: u32,
    pub ban_duration_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            notice_level: 5,
            mute_level: 10,
            mute_duration_secs: 2 * 60 * 60,
            ban_level: 15,
            ban_duration_secs: 24 * 60 * 60,
        }
    }
}

impl EscalationConfig {
    pub fn mute_duration(&self) -> Duration {
        Duration::from_secs(self.mute_duration_secs)
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_and_validate() {
        let config = WardenConfig::default();
        assert_eq!(config.storage.backend, BackendKind::File);
        assert_eq!(config.storage.sql_workers, 2);
        assert_eq!(config.storage.sql_call_deadline(), Duration::from_secs(5));
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.sweep.interval(), Duration::from_secs(60));
        assert_eq!(config.escalation.notice_level, 5);
        assert_eq!(config.escalation.mute_level, 10);
        assert_eq!(config.escalation.ban_level, 15);
        config.validate().expect("defaults validate");
    }

    #[test]
    fn misordered_escalation_tiers_fail_validation() {
        let mut config = WardenConfig::default();
        config.escalation.mute_level = 20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn zero_workers_fail_validation() {
        let mut config = WardenConfig::default();
        config.storage.sql_workers = 0;
        assert!(config.validate().is_err());
    }
}
