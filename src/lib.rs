// Resmon Library - Public API

// Re-export error types
pub mod error;
pub use error::{ActionError, ExecutionError, MonitorError, PermissionError, Result};

// Module declarations
pub mod core;
pub mod platform;

// Re-export commonly used types
pub use crate::core::config::MonitorConfig;
pub use crate::core::permissions::{Capability, PermissionGate, PermissionState, PermissionStatus};
pub use crate::core::system_monitor::{
    MemoryPressure, MemorySnapshot, MonitorDeps, ProcessRecord, ResourceMonitor,
};
pub use crate::core::{ActionExecutor, Confirmation, TerminateMode};

// Initialize logging
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}
