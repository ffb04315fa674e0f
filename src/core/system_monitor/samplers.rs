//! Samplers for each data kind.
//!
//! A sampler turns one gateway round-trip into one value for the
//! scheduler to publish. Each runs on its own schedule.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use once_cell::sync::OnceCell;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use super::metrics::{MemorySnapshot, ProcessRecord};
use super::parsers::{parse_memory_statistics, parse_process_listing_with, ProcessListingFormat};
use super::ranker::{rank, RankMetric};
use super::scheduler::Sampler;
use crate::core::permissions::{PermissionGate, PermissionState};
use crate::error::{MonitorError, Result};
use crate::platform::command::CommandRunner;
use crate::platform::macos::{PS, SYSCTL, VM_STAT};

/// Lists processes, folds per-thread rows and keeps the top N.
pub struct ProcessSampler {
    runner: Arc<dyn CommandRunner>,
    program: String,
    format: ProcessListingFormat,
    metric: RankMetric,
    noise_floor: f64,
    limit: usize,
    timeout: Duration,
}

impl ProcessSampler {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            runner,
            program: PS.to_string(),
            format: ProcessListingFormat::default(),
            metric: RankMetric::Memory,
            noise_floor: 10.0,
            limit: 50,
            timeout,
        }
    }

    pub fn with_format(mut self, format: ProcessListingFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_ranking(mut self, metric: RankMetric, noise_floor: f64, limit: usize) -> Self {
        self.metric = metric;
        self.noise_floor = noise_floor;
        self.limit = limit;
        self
    }

    pub fn with_program<S: Into<String>>(mut self, program: S) -> Self {
        self.program = program.into();
        self
    }
}

impl Sampler for ProcessSampler {
    type Output = Vec<ProcessRecord>;

    fn name(&self) -> &'static str {
        "processes"
    }

    fn sample(&self) -> BoxFuture<'static, Result<Vec<ProcessRecord>>> {
        let runner = Arc::clone(&self.runner);
        let program = self.program.clone();
        let args = self.format.ps_args();
        let (format, metric, floor, limit, timeout) =
            (self.format, self.metric, self.noise_floor, self.limit, self.timeout);

        Box::pin(async move {
            let output = runner.run(&program, &args, timeout).await?;
            let records = parse_process_listing_with(&output.stdout, format);
            log::trace!("parsed {} processes", records.len());
            // A header alone is fine; rows that all fail to parse are not
            let rows = output.stdout.lines().filter(|l| !l.trim().is_empty()).count();
            if records.is_empty() && rows > 1 {
                return Err(MonitorError::sampling(format!(
                    "{} produced {} rows in an unrecognised layout",
                    program, rows
                )));
            }
            Ok(rank(&records, metric, floor, limit))
        })
    }
}

/// Reads `vm_stat` and classifies memory pressure.
pub struct MemorySampler {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    physical_memory: Arc<OnceCell<u64>>,
}

impl MemorySampler {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            runner,
            timeout,
            physical_memory: Arc::new(OnceCell::new()),
        }
    }

    /// Skip the `sysctl` lookup and use a known physical memory size.
    pub fn with_physical_memory(self, bytes: u64) -> Self {
        let _ = self.physical_memory.set(bytes);
        self
    }
}

impl Sampler for MemorySampler {
    type Output = MemorySnapshot;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn sample(&self) -> BoxFuture<'static, Result<MemorySnapshot>> {
        let runner = Arc::clone(&self.runner);
        let timeout = self.timeout;
        let physical = Arc::clone(&self.physical_memory);

        Box::pin(async move {
            let total = match physical.get() {
                Some(bytes) => *bytes,
                None => {
                    let bytes = physical_memory_bytes(runner.as_ref(), timeout).await;
                    if bytes > 0 {
                        let _ = physical.set(bytes);
                    }
                    bytes
                }
            };

            let output = runner.run(VM_STAT, &[], timeout).await?;
            Ok(parse_memory_statistics(&output.stdout, total))
        })
    }
}

/// Total RAM from `sysctl hw.memsize`, or from sysinfo if that fails.
async fn physical_memory_bytes(runner: &dyn CommandRunner, timeout: Duration) -> u64 {
    let args = vec!["-n".to_string(), "hw.memsize".to_string()];
    match runner.run(SYSCTL, &args, timeout).await {
        Ok(output) => match output.stdout.trim().parse::<u64>() {
            Ok(bytes) if bytes > 0 => return bytes,
            _ => log::warn!("unexpected hw.memsize output: {:?}", output.stdout.trim()),
        },
        Err(e) => log::warn!("sysctl hw.memsize failed: {}", e),
    }

    let system = System::new_with_specifics(
        RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
    );
    system.total_memory()
}

/// Re-checks every tracked capability without prompting.
pub struct PermissionSampler {
    gate: Arc<PermissionGate>,
}

impl PermissionSampler {
    pub fn new(gate: Arc<PermissionGate>) -> Self {
        Self { gate }
    }
}

impl Sampler for PermissionSampler {
    type Output = Vec<PermissionState>;

    fn name(&self) -> &'static str {
        "permissions"
    }

    fn sample(&self) -> BoxFuture<'static, Result<Vec<PermissionState>>> {
        let gate = Arc::clone(&self.gate);
        Box::pin(async move { Ok(gate.refresh_all().await) })
    }
}
