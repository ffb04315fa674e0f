use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::future::join_all;
use parking_lot::Mutex;

use resmon::core::permissions::{
    GateDecision, JsonPermissionStore, MemoryPermissionStore, PermissionGate, PermissionState,
    PermissionStore, PromptTrigger, RequestOutcome,
};
use resmon::{Capability, PermissionStatus};
use tempfile::TempDir;

use super::common::FakeProbe;

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )))
    }

    fn advance(&self, secs: i64) {
        *self.0.lock() += chrono::Duration::seconds(secs);
    }

    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

fn gate(
    probe: Arc<FakeProbe>,
    store: Arc<dyn PermissionStore>,
    clock: &Arc<ManualClock>,
) -> PermissionGate {
    let clock = Arc::clone(clock);
    PermissionGate::new(
        probe,
        store,
        Duration::from_secs(300),
        [Capability::ElevatedExecution, Capability::Accessibility],
    )
    .with_clock(Arc::new(move || clock.now()))
}

#[tokio::test]
async fn test_denied_prompt_defers_until_cooldown_elapses() {
    let clock = ManualClock::new();
    let probe = Arc::new(FakeProbe::new(None, PermissionStatus::Denied));
    let gate = gate(probe.clone(), Arc::new(MemoryPermissionStore::new()), &clock);
    let cap = Capability::Accessibility;

    let first = gate.request(&cap, PromptTrigger::Ambient).await.unwrap();
    assert_eq!(first, RequestOutcome::Prompted(PermissionStatus::Denied));
    assert_eq!(gate.state(&cap).status, PermissionStatus::Denied);

    clock.advance(60);
    let deferred = gate.request(&cap, PromptTrigger::Ambient).await.unwrap();
    assert!(matches!(deferred, RequestOutcome::Deferred { .. }));
    assert_eq!(probe.requests(), 1);

    clock.advance(241);
    let state = gate.refresh(&cap).await;
    assert_eq!(state.status, PermissionStatus::NotDetermined);
    assert_eq!(gate.decide(&cap, PromptTrigger::Ambient), GateDecision::Prompt);
}

#[tokio::test]
async fn test_explicit_request_bypasses_cooldown() {
    let clock = ManualClock::new();
    let probe = Arc::new(FakeProbe::new(None, PermissionStatus::Denied));
    let gate = gate(probe.clone(), Arc::new(MemoryPermissionStore::new()), &clock);
    let cap = Capability::Accessibility;

    gate.request(&cap, PromptTrigger::Ambient).await.unwrap();
    *probe.answer.lock() = PermissionStatus::Granted;
    clock.advance(10);

    let outcome = gate.request(&cap, PromptTrigger::Explicit).await.unwrap();
    assert_eq!(outcome, RequestOutcome::Prompted(PermissionStatus::Granted));
    assert!(gate.is_granted(&cap));
    assert_eq!(probe.requests(), 2);
}

#[tokio::test]
async fn test_dont_ask_again_suppresses_prompts() {
    let clock = ManualClock::new();
    let probe = Arc::new(FakeProbe::new(None, PermissionStatus::Denied));
    let gate = gate(probe.clone(), Arc::new(MemoryPermissionStore::new()), &clock);
    let cap = Capability::ElevatedExecution;

    gate.request(&cap, PromptTrigger::Ambient).await.unwrap();
    gate.set_dont_ask_again(&cap, true).await;
    clock.advance(10_000);

    let outcome = gate.request(&cap, PromptTrigger::Explicit).await.unwrap();
    assert_eq!(outcome, RequestOutcome::Suppressed);
    assert_eq!(probe.requests(), 1);

    gate.set_dont_ask_again(&cap, false).await;
    let outcome = gate.request(&cap, PromptTrigger::Explicit).await.unwrap();
    assert_eq!(outcome, RequestOutcome::Prompted(PermissionStatus::Denied));
}

#[tokio::test]
async fn test_revocation_is_detected_by_check() {
    let clock = ManualClock::new();
    let probe = Arc::new(FakeProbe::new(
        Some(PermissionStatus::Granted),
        PermissionStatus::Granted,
    ));
    let gate = gate(probe.clone(), Arc::new(MemoryPermissionStore::new()), &clock);
    let cap = Capability::Accessibility;

    assert!(gate.refresh(&cap).await.is_granted());

    *probe.check.lock() = Some(PermissionStatus::NotDetermined);
    let state = gate.refresh(&cap).await;
    assert_eq!(state.status, PermissionStatus::Denied);
    assert_eq!(probe.requests(), 0);
}

#[tokio::test]
async fn test_revoked_prompted_grant_stays_denied_after_cooldown() {
    let clock = ManualClock::new();
    let probe = Arc::new(FakeProbe::new(None, PermissionStatus::Granted));
    let gate = gate(probe.clone(), Arc::new(MemoryPermissionStore::new()), &clock);
    let cap = Capability::Accessibility;

    let outcome = gate.request(&cap, PromptTrigger::Explicit).await.unwrap();
    assert_eq!(outcome, RequestOutcome::Prompted(PermissionStatus::Granted));

    clock.advance(600);
    *probe.check.lock() = Some(PermissionStatus::NotDetermined);
    let state = gate.refresh(&cap).await;
    assert_eq!(state.status, PermissionStatus::Denied);
    assert!(state.revoked);

    clock.advance(600);
    let state = gate.refresh(&cap).await;
    assert_eq!(state.status, PermissionStatus::Denied);
    assert_eq!(probe.requests(), 1);
}

#[tokio::test]
async fn test_declined_action_prompt_starts_cooldown() {
    let clock = ManualClock::new();
    let probe = Arc::new(FakeProbe::new(None, PermissionStatus::Granted));
    let gate = gate(probe.clone(), Arc::new(MemoryPermissionStore::new()), &clock);
    let cap = Capability::ElevatedExecution;

    gate.record_declined(&cap).await;
    let state = gate.state(&cap);
    assert_eq!(state.status, PermissionStatus::Denied);
    assert_eq!(state.last_prompted_at, Some(clock.now()));

    clock.advance(60);
    let outcome = gate.request(&cap, PromptTrigger::Ambient).await.unwrap();
    assert!(matches!(outcome, RequestOutcome::Deferred { .. }));
    assert_eq!(probe.requests(), 0);

    clock.advance(240);
    assert_eq!(gate.refresh(&cap).await.status, PermissionStatus::NotDetermined);
}

/// Keeps every snapshot it is handed, slowly enough for writes to overlap
#[derive(Default)]
struct RecordingStore {
    saved: Mutex<Vec<Vec<PermissionState>>>,
}

impl PermissionStore for RecordingStore {
    fn load(&self) -> anyhow::Result<Vec<PermissionState>> {
        Ok(Vec::new())
    }

    fn save(&self, states: &[PermissionState]) -> anyhow::Result<()> {
        std::thread::sleep(Duration::from_millis(2));
        self.saved.lock().push(states.to_vec());
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_persist_latest_state() {
    let clock = ManualClock::new();
    let probe = Arc::new(FakeProbe::new(None, PermissionStatus::Denied));
    let store = Arc::new(RecordingStore::default());
    let gate = Arc::new(gate(probe, store.clone(), &clock));

    let updates = (0..16).map(|i| {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            let cap = if i % 2 == 0 {
                Capability::Accessibility
            } else {
                Capability::ElevatedExecution
            };
            gate.set_dont_ask_again(&cap, i % 3 == 0).await;
        })
    });
    for joined in join_all(updates).await {
        joined.unwrap();
    }

    let saved = store.saved.lock();
    assert!(!saved.is_empty());
    assert_eq!(saved.last().unwrap(), &gate.states());
}

#[tokio::test]
async fn test_states_survive_restart_through_json_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("permissions.json");
    let clock = ManualClock::new();

    {
        let probe = Arc::new(FakeProbe::new(None, PermissionStatus::Denied));
        let store = Arc::new(JsonPermissionStore::new(&path));
        let gate = gate(probe, store, &clock);
        gate.request(&Capability::Accessibility, PromptTrigger::Explicit)
            .await
            .unwrap();
        gate.set_dont_ask_again(&Capability::Accessibility, true).await;
    }
    assert!(path.exists());

    let probe = Arc::new(FakeProbe::new(None, PermissionStatus::Granted));
    let gate = gate(probe.clone(), Arc::new(JsonPermissionStore::new(&path)), &clock);
    let state = gate.state(&Capability::Accessibility);

    assert_eq!(state.status, PermissionStatus::Denied);
    assert!(state.dont_ask_again);
    assert_eq!(state.last_prompted_at, Some(clock.now()));
    assert_eq!(
        gate.decide(&Capability::Accessibility, PromptTrigger::Explicit),
        GateDecision::Suppressed
    );
}

#[tokio::test]
async fn test_corrupt_store_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("permissions.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let clock = ManualClock::new();
    let probe = Arc::new(FakeProbe::new(None, PermissionStatus::Granted));
    let gate = gate(probe, Arc::new(JsonPermissionStore::new(&path)), &clock);

    assert_eq!(gate.states().len(), 2);
    assert!(gate
        .states()
        .iter()
        .all(|s| s.status == PermissionStatus::NotDetermined));
}
