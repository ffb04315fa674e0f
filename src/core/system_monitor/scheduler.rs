//! Recurring sampling with at most one cycle in flight.
//!
//! A scheduler owns one [`Sampler`] and the publisher of one snapshot slot.
//! Each timer tick starts a cycle unless one is already running, in which
//! case the tick is dropped. Out-of-cycle refresh requests arriving during
//! a cycle collapse into a single follow-up cycle. Failed cycles are logged
//! and left for the next tick; the previous snapshot stays current.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::store::SnapshotPublisher;
use crate::error::Result;

/// One kind of data that can be sampled on a schedule.
pub trait Sampler: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    fn name(&self) -> &'static str;

    /// Produce one fresh value. The returned future must own everything
    /// it needs; it is dropped (and any child process killed) on shutdown.
    fn sample(&self) -> BoxFuture<'static, Result<Self::Output>>;
}

#[derive(Debug, Default)]
struct Counters {
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    ticks_dropped: AtomicU64,
    sampling: AtomicBool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub ticks_dropped: u64,
}

/// Control surface for a running scheduler
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    name: &'static str,
    counters: Arc<Counters>,
    refresh: Arc<Notify>,
}

impl SchedulerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ask for a cycle now instead of waiting for the next tick.
    pub fn request_refresh(&self) {
        log::debug!("{}: out-of-cycle refresh requested", self.name);
        self.refresh.notify_one();
    }

    pub fn is_sampling(&self) -> bool {
        self.counters.sampling.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            cycles_completed: self.counters.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.counters.cycles_failed.load(Ordering::Relaxed),
            ticks_dropped: self.counters.ticks_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Spawn a scheduler task on the current tokio runtime.
///
/// The first cycle starts immediately. The task ends when `shutdown`
/// fires or its sender is dropped.
pub fn spawn_scheduler<S: Sampler>(
    sampler: S,
    period: Duration,
    publisher: SnapshotPublisher<S::Output>,
    shutdown: broadcast::Receiver<()>,
) -> (SchedulerHandle, JoinHandle<()>) {
    let handle = SchedulerHandle {
        name: sampler.name(),
        counters: Arc::new(Counters::default()),
        refresh: Arc::new(Notify::new()),
    };

    let task = tokio::spawn(run_scheduler(
        sampler,
        period,
        publisher,
        handle.clone(),
        shutdown,
    ));

    (handle, task)
}

type Cycle<T> = Option<BoxFuture<'static, Result<T>>>;

async fn run_scheduler<S: Sampler>(
    sampler: S,
    period: Duration,
    mut publisher: SnapshotPublisher<S::Output>,
    handle: SchedulerHandle,
    mut shutdown: broadcast::Receiver<()>,
) {
    log::info!("{} scheduler started ({:?} interval)", handle.name, period);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut cycle: Cycle<S::Output> = None;
    let mut refresh_pending = false;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                break;
            }
            result = drive(&mut cycle), if cycle.is_some() => {
                cycle = None;
                handle.counters.sampling.store(false, Ordering::Release);
                finish_cycle(&handle, &mut publisher, result);

                if refresh_pending {
                    refresh_pending = false;
                    begin_cycle(&sampler, &mut cycle, &handle);
                }
            }
            _ = ticker.tick() => {
                if !begin_cycle(&sampler, &mut cycle, &handle) {
                    handle.counters.ticks_dropped.fetch_add(1, Ordering::Relaxed);
                    log::debug!("{}: tick dropped, cycle still in flight", handle.name);
                }
            }
            _ = handle.refresh.notified() => {
                if !begin_cycle(&sampler, &mut cycle, &handle) {
                    refresh_pending = true;
                }
            }
        }
    }

    if cycle.take().is_some() {
        log::debug!("{}: abandoning in-flight cycle", handle.name);
    }
    handle.counters.sampling.store(false, Ordering::Release);
    log::info!("{} scheduler stopped", handle.name);
}

/// Start a cycle unless one is running. Returns whether one was started.
fn begin_cycle<S: Sampler>(sampler: &S, cycle: &mut Cycle<S::Output>, handle: &SchedulerHandle) -> bool {
    if cycle.is_some() {
        return false;
    }
    handle.counters.sampling.store(true, Ordering::Release);
    *cycle = Some(sampler.sample());
    true
}

fn finish_cycle<T>(handle: &SchedulerHandle, publisher: &mut SnapshotPublisher<T>, result: Result<T>) {
    match result {
        Ok(value) => {
            let snapshot = publisher.publish(value);
            handle.counters.cycles_completed.fetch_add(1, Ordering::Relaxed);
            log::trace!("{}: published snapshot #{}", handle.name, snapshot.sequence);
        }
        Err(e) => {
            handle.counters.cycles_failed.fetch_add(1, Ordering::Relaxed);
            log::warn!("{}: sampling failed, keeping previous snapshot: {}", handle.name, e);
        }
    }
}

async fn drive<T>(cycle: &mut Cycle<T>) -> Result<T> {
    match cycle {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}
