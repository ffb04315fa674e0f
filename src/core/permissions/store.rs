//! Persistence of permission states across restarts.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use super::state::PermissionState;

pub trait PermissionStore: Send + Sync {
    fn load(&self) -> Result<Vec<PermissionState>>;
    fn save(&self, states: &[PermissionState]) -> Result<()>;
}

/// Stores states as a JSON array on disk
#[derive(Debug, Clone)]
pub struct JsonPermissionStore {
    path: PathBuf,
}

impl JsonPermissionStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/resmon/permissions.json`
    pub fn default_location() -> Result<Self> {
        let config_dir =
            dirs::config_dir().with_context(|| "Could not determine config directory")?;
        Ok(Self::new(config_dir.join("resmon").join("permissions.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PermissionStore for JsonPermissionStore {
    fn load(&self) -> Result<Vec<PermissionState>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let data = fs::read(&self.path)
            .with_context(|| format!("Failed to read permission store: {:?}", self.path))?;

        if data.is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&data)
            .with_context(|| format!("Corrupt permission store: {:?}", self.path))
    }

    fn save(&self, states: &[PermissionState]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let data = serde_json::to_vec_pretty(states)
            .with_context(|| "Failed to serialize permission states")?;

        // Write-then-rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data).with_context(|| format!("Failed to write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {:?}", self.path))?;

        Ok(())
    }
}

/// Keeps states in memory only
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    states: Mutex<Vec<PermissionState>>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_states(states: Vec<PermissionState>) -> Self {
        Self {
            states: Mutex::new(states),
        }
    }
}

impl PermissionStore for MemoryPermissionStore {
    fn load(&self) -> Result<Vec<PermissionState>> {
        Ok(self.states.lock().clone())
    }

    fn save(&self, states: &[PermissionState]) -> Result<()> {
        *self.states.lock() = states.to_vec();
        Ok(())
    }
}
