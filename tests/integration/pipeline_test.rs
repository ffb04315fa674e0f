use std::sync::Arc;
use std::time::Duration;

use resmon::core::system_monitor::{
    parse_memory_statistics, parse_process_listing, parse_process_listing_with, rank,
    snapshot_channel, spawn_scheduler, MemorySampler, ProcessListingFormat, ProcessSampler,
    RankMetric, Sampler,
};
use resmon::platform::macos::{PS, SYSCTL, VM_STAT};
use resmon::{MemoryPressure, MonitorError};
use tokio::sync::broadcast;

use super::common::{
    FakeRunner, Reply, EXTENDED_PS_SAMPLE, PHYSICAL_BYTES, PS_SAMPLE, VM_STAT_SAMPLE,
};

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn test_listing_with_10mb_floor_ranks_nothing() {
    let records = parse_process_listing(PS_SAMPLE);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].memory_mb, 3.0);

    let ranked = rank(&records, RankMetric::Memory, 10.0, 50);
    assert!(ranked.is_empty());
}

#[test]
fn test_listing_with_low_floor_passes_both() {
    let records = parse_process_listing(PS_SAMPLE);
    let ranked = rank(&records, RankMetric::Memory, 0.01, 50);

    let pids: Vec<u32> = ranked.iter().map(|r| r.pid).collect();
    assert_eq!(pids, vec![100, 200]);
    assert!((ranked[1].memory_mb - 0.05).abs() < 0.01);
}

#[test]
fn test_vm_stat_sample_is_critical_at_exactly_75() {
    let snapshot = parse_memory_statistics(VM_STAT_SAMPLE, PHYSICAL_BYTES);
    assert_eq!(snapshot.used_percentage, 75.0);
    assert_eq!(snapshot.pressure, MemoryPressure::Critical);
}

#[test]
fn test_extended_listing_ranks_by_cpu() {
    let records = parse_process_listing_with(EXTENDED_PS_SAMPLE, ProcessListingFormat::Extended);
    assert_eq!(records.len(), 4);

    let ranked = rank(&records, RankMetric::Cpu, 1.0, 10);
    let names: Vec<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["some tool", "Safari"]);
    assert_eq!(ranked[1].user.as_deref(), Some("alice"));
    assert_eq!(ranked[1].parent_pid, Some(1));
}

#[tokio::test]
async fn test_process_sampler_runs_ps_and_ranks() {
    let runner = Arc::new(FakeRunner::new().reply(PS, Reply::Stdout(PS_SAMPLE.to_string())));
    let sampler = ProcessSampler::new(runner.clone(), TIMEOUT)
        .with_format(ProcessListingFormat::Basic)
        .with_ranking(RankMetric::Memory, 0.01, 1);

    let ranked = sampler.sample().await.unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].pid, 100);

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, PS);
    assert_eq!(calls[0].1, ProcessListingFormat::Basic.ps_args());
}

#[tokio::test]
async fn test_memory_sampler_caches_physical_memory() {
    let runner = Arc::new(
        FakeRunner::new()
            .reply(SYSCTL, Reply::Stdout(format!("{}\n", PHYSICAL_BYTES)))
            .reply(VM_STAT, Reply::Stdout(VM_STAT_SAMPLE.to_string())),
    );
    let sampler = MemorySampler::new(runner.clone(), TIMEOUT);

    let first = sampler.sample().await.unwrap();
    let second = sampler.sample().await.unwrap();

    assert_eq!(first.pressure, MemoryPressure::Critical);
    assert_eq!(first, second);
    assert_eq!(runner.calls_matching(SYSCTL), 1);
    assert_eq!(runner.calls_matching(VM_STAT), 2);
}

#[tokio::test]
async fn test_gateway_failure_fails_the_cycle() {
    let runner = Arc::new(FakeRunner::new().reply(PS, Reply::TimedOut));
    let sampler = ProcessSampler::new(runner, TIMEOUT);

    assert!(sampler.sample().await.is_err());
}

#[tokio::test]
async fn test_unrecognised_listing_fails_the_cycle() {
    let garbage = "  PID  RSS COMM\n  abc  xyz Safari\n  ???\n";
    let runner = Arc::new(FakeRunner::new().reply(PS, Reply::Stdout(garbage.to_string())));
    let sampler = ProcessSampler::new(runner, TIMEOUT).with_format(ProcessListingFormat::Basic);

    let err = sampler.sample().await.unwrap_err();
    assert!(matches!(err, MonitorError::Sampling(_)));
}

#[tokio::test]
async fn test_header_only_listing_is_empty() {
    let runner = Arc::new(FakeRunner::new().reply(PS, Reply::Stdout("  PID  RSS COMM\n".to_string())));
    let sampler = ProcessSampler::new(runner, TIMEOUT).with_format(ProcessListingFormat::Basic);

    assert!(sampler.sample().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stale_snapshot_survives_failed_cycles() {
    let runner = Arc::new(FakeRunner::new().reply(PS, Reply::Stdout(PS_SAMPLE.to_string())));
    let sampler = ProcessSampler::new(runner.clone(), TIMEOUT)
        .with_format(ProcessListingFormat::Basic)
        .with_ranking(RankMetric::Memory, 0.01, 50);

    let (publisher, mut reader) = snapshot_channel();
    let (tx, _) = broadcast::channel(1);
    let (handle, task) = spawn_scheduler(sampler, Duration::from_secs(3), publisher, tx.subscribe());

    let first = reader.changed().await.unwrap();
    assert_eq!(first.data.len(), 2);

    runner.set_reply(
        PS,
        Reply::Failed {
            code: 1,
            stderr: "ps: broken".to_string(),
        },
    );
    tokio::time::sleep(Duration::from_secs(10)).await;

    let current = reader.current().unwrap();
    assert_eq!(current.sequence, first.sequence);
    assert_eq!(current.data, first.data);
    assert!(handle.stats().cycles_failed >= 3);

    tx.send(()).unwrap();
    task.await.unwrap();
}
