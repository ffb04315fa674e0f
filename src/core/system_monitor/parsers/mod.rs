//! Adapters from OS tool output to typed records.
//!
//! Parsers are pure and never fail: malformed input is skipped line by line.

pub mod memory;
pub mod process;

pub use memory::{
    parse_memory_statistics, parse_vm_stat_counters, snapshot_from_counters, VmStatCounters,
    DEFAULT_PAGE_SIZE,
};
pub use process::{parse_process_listing, parse_process_listing_with, ProcessListingFormat};
