// Core engine module

pub mod actions;
pub mod cleaner;
pub mod config;
pub mod permissions;
pub mod system_monitor;

// Re-export commonly used items
pub use actions::{ActionExecutor, Confirmation, RefreshHooks, TerminateMode};
pub use cleaner::{CacheCleaner, CleanupStats};
pub use config::MonitorConfig;
