//! Single-writer snapshot slots.
//!
//! Each data kind gets one slot backed by a `watch` channel holding an
//! `Arc` to an immutable snapshot. Publishing swaps the whole `Arc`, so a
//! reader sees either the old snapshot or the new one, never a mix. The
//! publisher is not `Clone`; whoever owns it is the only writer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// An immutable value produced by one sampling cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    /// 1 for the first publish, +1 for each publish after
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,
    pub data: T,
}

type Slot<T> = Option<Arc<Snapshot<T>>>;

/// Create an empty slot, returning its writer and a reader.
pub fn snapshot_channel<T>() -> (SnapshotPublisher<T>, SnapshotReader<T>) {
    let (tx, rx) = watch::channel(None);
    (SnapshotPublisher { tx, sequence: 0 }, SnapshotReader { rx })
}

/// Write side of a slot
#[derive(Debug)]
pub struct SnapshotPublisher<T> {
    tx: watch::Sender<Slot<T>>,
    sequence: u64,
}

impl<T> SnapshotPublisher<T> {
    /// Replace the current snapshot wholesale.
    pub fn publish(&mut self, data: T) -> Arc<Snapshot<T>> {
        self.sequence += 1;
        let snapshot = Arc::new(Snapshot {
            sequence: self.sequence,
            taken_at: Utc::now(),
            data,
        });
        // Succeeds even with no receivers
        self.tx.send_replace(Some(Arc::clone(&snapshot)));
        snapshot
    }

    pub fn reader(&self) -> SnapshotReader<T> {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }

    pub fn published(&self) -> u64 {
        self.sequence
    }
}

/// Read side of a slot. Cheap to clone; reads never block on the writer.
#[derive(Debug)]
pub struct SnapshotReader<T> {
    rx: watch::Receiver<Slot<T>>,
}

impl<T> Clone for SnapshotReader<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> SnapshotReader<T> {
    /// Latest published snapshot, or `None` before the first publish.
    /// Stale snapshots stay readable until replaced.
    pub fn current(&self) -> Option<Arc<Snapshot<T>>> {
        self.rx.borrow().clone()
    }

    /// Wait for the next publish. Returns `None` once the writer is gone.
    pub async fn changed(&mut self) -> Option<Arc<Snapshot<T>>> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }

    /// Raw watch receiver for callers that want to `select!` on it.
    pub fn subscribe(&self) -> watch::Receiver<Slot<T>> {
        self.rx.clone()
    }
}
