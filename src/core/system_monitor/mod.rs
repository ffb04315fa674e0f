//! Process and memory monitoring core.
//!
//! Read path: gateway -> parsers -> ranker -> snapshot store -> consumers,
//! driven by one polling scheduler per data kind.

mod metrics;
pub mod parsers;
mod ranker;
mod runtime;
mod samplers;
mod scheduler;
mod store;

pub use metrics::{MemoryPressure, MemorySnapshot, ProcessRecord};
pub use parsers::{
    parse_memory_statistics, parse_process_listing, parse_process_listing_with,
    ProcessListingFormat,
};
pub use ranker::{rank, RankMetric};
pub use runtime::{MonitorDeps, ResourceMonitor};
pub use samplers::{MemorySampler, PermissionSampler, ProcessSampler};
pub use scheduler::{spawn_scheduler, Sampler, SchedulerHandle, SchedulerStats};
pub use store::{snapshot_channel, Snapshot, SnapshotPublisher, SnapshotReader};
