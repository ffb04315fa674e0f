//! Ranking of aggregated process records.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::metrics::ProcessRecord;

/// Metric processes are ranked by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMetric {
    /// Resident memory in MB
    #[default]
    Memory,
    /// CPU percentage
    Cpu,
}

impl RankMetric {
    pub fn value(&self, record: &ProcessRecord) -> f64 {
        match self {
            RankMetric::Memory => record.memory_mb,
            RankMetric::Cpu => record.cpu_percent as f64,
        }
    }
}

/// Drop records below `noise_floor`, sort descending by `metric` (pid
/// ascending on ties) and keep at most `limit`.
///
/// The floor is in the metric's own unit: MB for memory, percent for CPU.
pub fn rank(
    records: &[ProcessRecord],
    metric: RankMetric,
    noise_floor: f64,
    limit: usize,
) -> Vec<ProcessRecord> {
    let mut ranked: Vec<ProcessRecord> = records
        .iter()
        .filter(|record| metric.value(record) >= noise_floor)
        .cloned()
        .collect();

    ranked.sort_by(|a, b| compare(metric, a, b));
    ranked.truncate(limit);
    ranked
}

fn compare(metric: RankMetric, a: &ProcessRecord, b: &ProcessRecord) -> Ordering {
    metric
        .value(b)
        .total_cmp(&metric.value(a))
        .then_with(|| a.pid.cmp(&b.pid))
}
