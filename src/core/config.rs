use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::permissions::Capability;
use crate::core::system_monitor::{ProcessListingFormat, RankMetric};

/// Engine settings. Every field has a default, so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub process_interval_secs: u64,
    pub memory_interval_secs: u64,
    pub permission_interval_secs: u64,
    /// Upper bound for ordinary tool invocations
    pub command_timeout_ms: u64,
    /// Upper bound for invocations that wait on a consent dialog
    pub privileged_timeout_ms: u64,
    /// Processes below this value of `rank_metric` are dropped
    pub noise_floor_mb: f64,
    pub process_limit: usize,
    pub rank_metric: RankMetric,
    pub listing_format: ProcessListingFormat,
    /// Minimum gap between ambient permission reminders
    pub prompt_cooldown_secs: u64,
    /// Applications whose automation permission is tracked
    pub automation_targets: Vec<String>,
    /// Directories cleaned by the cache cleaner; empty means the user cache dir
    pub cache_directories: Vec<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            process_interval_secs: 3,
            memory_interval_secs: 5,
            permission_interval_secs: 60,
            command_timeout_ms: 5_000,
            privileged_timeout_ms: 120_000,
            noise_floor_mb: 10.0,
            process_limit: 50,
            rank_metric: RankMetric::Memory,
            listing_format: ProcessListingFormat::Extended,
            prompt_cooldown_secs: 300,
            automation_targets: Vec::new(),
            cache_directories: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Load from the default location, falling back to defaults when the
    /// file is missing, empty or unreadable as JSON.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let data = fs::read(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if data.is_empty() {
            return Ok(Self::default());
        }

        let config = serde_json::from_slice::<MonitorConfig>(&data).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable config {:?}: {}", path, e);
            Self::default()
        });

        Ok(config.validated())
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let data = serde_json::to_vec_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(path, data)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().with_context(|| "Could not determine config directory")?;

        Ok(config_dir.join("resmon").join("config.json"))
    }

    /// Clamp values that would stall or spin the engine.
    pub fn validated(mut self) -> Self {
        self.process_interval_secs = self.process_interval_secs.max(1);
        self.memory_interval_secs = self.memory_interval_secs.max(1);
        self.permission_interval_secs = self.permission_interval_secs.max(1);
        self.command_timeout_ms = self.command_timeout_ms.max(1);
        self.privileged_timeout_ms = self.privileged_timeout_ms.max(1);
        self.process_limit = self.process_limit.max(1);
        if !self.noise_floor_mb.is_finite() || self.noise_floor_mb < 0.0 {
            self.noise_floor_mb = 0.0;
        }
        self
    }

    pub fn process_interval(&self) -> Duration {
        Duration::from_secs(self.process_interval_secs)
    }

    pub fn memory_interval(&self) -> Duration {
        Duration::from_secs(self.memory_interval_secs)
    }

    pub fn permission_interval(&self) -> Duration {
        Duration::from_secs(self.permission_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn privileged_timeout(&self) -> Duration {
        Duration::from_millis(self.privileged_timeout_ms)
    }

    pub fn prompt_cooldown(&self) -> Duration {
        Duration::from_secs(self.prompt_cooldown_secs)
    }

    /// Capabilities the permission gate should track
    pub fn tracked_capabilities(&self) -> Vec<Capability> {
        let mut capabilities = vec![
            Capability::Accessibility,
            Capability::FullDiskAccess,
            Capability::ElevatedExecution,
        ];
        capabilities.extend(
            self.automation_targets
                .iter()
                .map(|target| Capability::Automation(target.clone())),
        );
        capabilities
    }

    /// Cache directories, defaulting to the user cache dir
    pub fn cache_directories(&self) -> Vec<PathBuf> {
        if !self.cache_directories.is_empty() {
            return self.cache_directories.clone();
        }
        dirs::cache_dir().into_iter().collect()
    }
}
