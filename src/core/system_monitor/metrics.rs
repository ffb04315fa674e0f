use serde::{Deserialize, Serialize};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One OS process as observed by a single sampling cycle.
///
/// Built fresh every cycle and never mutated afterwards. The process may
/// already be gone by the time a consumer reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub user: Option<String>,
    pub cpu_percent: f32,
    pub memory_mb: f64,
    /// Full command as reported by the listing tool; empty when inaccessible
    pub command: String,
    pub parent_pid: Option<u32>,
    /// Reserved. No `ps` layout read here reports threads or Mach ports,
    /// so the parsers leave these `None`; consumers must treat `None` as
    /// "unknown", not zero.
    pub thread_count: Option<u32>,
    pub port_count: Option<u32>,
}

impl ProcessRecord {
    pub fn memory_bytes(&self) -> u64 {
        (self.memory_mb * 1024.0 * 1024.0).max(0.0) as u64
    }
}

/// Coarse classification of how close the system is to reclaiming memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryPressure {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl MemoryPressure {
    pub const WARNING_PERCENT: f64 = 50.0;
    pub const CRITICAL_PERCENT: f64 = 75.0;

    /// Step function over used percentage: `< 50` normal, `< 75` warning,
    /// anything else critical.
    pub fn from_used_percentage(percent: f64) -> Self {
        if percent >= Self::CRITICAL_PERCENT {
            MemoryPressure::Critical
        } else if percent >= Self::WARNING_PERCENT {
            MemoryPressure::Warning
        } else {
            MemoryPressure::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MemoryPressure::Normal => "normal",
            MemoryPressure::Warning => "warning",
            MemoryPressure::Critical => "critical",
        }
    }
}

/// Whole-system memory state at one instant. All sizes in GB.
///
/// `used + available` can exceed `total`: inactive pages count towards both,
/// matching how the OS itself reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
    pub free_gb: f64,
    pub active_gb: f64,
    pub inactive_gb: f64,
    pub wired_gb: f64,
    pub compressed_gb: f64,
    pub used_percentage: f64,
    pub pressure: MemoryPressure,
}

pub(crate) fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB
}
