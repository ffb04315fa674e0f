//! `vm_stat` adapter.
//!
//! Expected format (macOS 10.x through 15.x):
//!
//! ```text
//! Mach Virtual Memory Statistics: (page size of 16384 bytes)
//! Pages free:                               12345.
//! Pages active:                            234567.
//! Pages inactive:                          123456.
//! Pages wired down:                         98765.
//! Pages occupied by compressor:             45678.
//! ```
//!
//! Whitespace and trailing punctuation have drifted between releases, so
//! values are taken as the first integer after a recognized label rather
//! than from a fixed column. Unknown lines are ignored. Missing labels leave
//! the corresponding counter at zero; a missing page size falls back to
//! [`DEFAULT_PAGE_SIZE`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::system_monitor::metrics::{bytes_to_gb, MemoryPressure, MemorySnapshot};

pub const DEFAULT_PAGE_SIZE: u64 = 4096;

const PAGE_SIZE_MARKER: &str = "page size of";
const LABEL_FREE: &str = "Pages free:";
const LABEL_ACTIVE: &str = "Pages active:";
const LABEL_INACTIVE: &str = "Pages inactive:";
const LABEL_WIRED: &str = "Pages wired down:";
const LABEL_COMPRESSED: &str = "Pages occupied by compressor:";

static FIRST_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex"));

/// Raw page counters extracted from one `vm_stat` run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmStatCounters {
    pub page_size: u64,
    pub free: u64,
    pub active: u64,
    pub inactive: u64,
    pub wired: u64,
    pub compressed: u64,
}

impl Default for VmStatCounters {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            free: 0,
            active: 0,
            inactive: 0,
            wired: 0,
            compressed: 0,
        }
    }
}

impl VmStatCounters {
    fn bytes(&self, pages: u64) -> u64 {
        pages.saturating_mul(self.page_size)
    }

    pub fn used_bytes(&self) -> u64 {
        self.bytes(self.active)
            .saturating_add(self.bytes(self.inactive))
            .saturating_add(self.bytes(self.wired))
            .saturating_add(self.bytes(self.compressed))
    }

    pub fn available_bytes(&self) -> u64 {
        self.bytes(self.free).saturating_add(self.bytes(self.inactive))
    }
}

/// Scan `vm_stat` output once and pull out the counters we know about.
pub fn parse_vm_stat_counters(raw: &str) -> VmStatCounters {
    let mut counters = VmStatCounters::default();

    for line in raw.lines() {
        let line = line.trim();

        if let Some(pos) = line.find(PAGE_SIZE_MARKER) {
            match first_integer(&line[pos + PAGE_SIZE_MARKER.len()..]) {
                Some(size) if size > 0 => counters.page_size = size,
                _ => log::debug!("unparseable page size line, using {}", DEFAULT_PAGE_SIZE),
            }
            continue;
        }

        let slot = if let Some(rest) = line.strip_prefix(LABEL_FREE) {
            Some((&mut counters.free, rest))
        } else if let Some(rest) = line.strip_prefix(LABEL_ACTIVE) {
            Some((&mut counters.active, rest))
        } else if let Some(rest) = line.strip_prefix(LABEL_INACTIVE) {
            Some((&mut counters.inactive, rest))
        } else if let Some(rest) = line.strip_prefix(LABEL_WIRED) {
            Some((&mut counters.wired, rest))
        } else if let Some(rest) = line.strip_prefix(LABEL_COMPRESSED) {
            Some((&mut counters.compressed, rest))
        } else {
            None
        };

        if let Some((field, rest)) = slot {
            if let Some(value) = first_integer(rest) {
                *field = value;
            }
        }
    }

    counters
}

/// Parse `vm_stat` output into a snapshot. Never fails; an unrecognizable
/// input produces an all-zero snapshot.
pub fn parse_memory_statistics(raw: &str, physical_memory_bytes: u64) -> MemorySnapshot {
    snapshot_from_counters(&parse_vm_stat_counters(raw), physical_memory_bytes)
}

pub fn snapshot_from_counters(counters: &VmStatCounters, physical_memory_bytes: u64) -> MemorySnapshot {
    let used_bytes = counters.used_bytes();
    let used_percentage = if physical_memory_bytes > 0 {
        used_bytes as f64 / physical_memory_bytes as f64 * 100.0
    } else {
        0.0
    };

    MemorySnapshot {
        total_gb: bytes_to_gb(physical_memory_bytes),
        used_gb: bytes_to_gb(used_bytes),
        available_gb: bytes_to_gb(counters.available_bytes()),
        free_gb: bytes_to_gb(counters.bytes(counters.free)),
        active_gb: bytes_to_gb(counters.bytes(counters.active)),
        inactive_gb: bytes_to_gb(counters.bytes(counters.inactive)),
        wired_gb: bytes_to_gb(counters.bytes(counters.wired)),
        compressed_gb: bytes_to_gb(counters.bytes(counters.compressed)),
        used_percentage,
        pressure: MemoryPressure::from_used_percentage(used_percentage),
    }
}

fn first_integer(text: &str) -> Option<u64> {
    FIRST_INTEGER
        .find(text)
        .and_then(|m| m.as_str().parse::<u64>().ok())
}
