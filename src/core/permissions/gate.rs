//! Permission gate: decides whether a privileged action may proceed, must
//! prompt first, or has to wait out a cooldown.
//!
//! Every transition to `Granted` comes from the [`PermissionProbe`], i.e.
//! from the OS. The gate itself never grants anything.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use super::state::{Capability, GateDecision, PermissionState, PermissionStatus, PromptTrigger};
use super::store::PermissionStore;
use crate::error::PermissionError;

/// OS side of the gate
pub trait PermissionProbe: Send + Sync {
    /// Read-only check that never shows UI. `Ok(None)` when the OS offers
    /// no way to tell without prompting.
    fn check<'a>(
        &'a self,
        capability: &'a Capability,
    ) -> BoxFuture<'a, Result<Option<PermissionStatus>, PermissionError>>;

    /// Show the native consent UI. `NotDetermined` means the OS did not
    /// give an answer yet (e.g. it opened a settings pane).
    fn request<'a>(
        &'a self,
        capability: &'a Capability,
    ) -> BoxFuture<'a, Result<PermissionStatus, PermissionError>>;
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Result of [`PermissionGate::request`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    AlreadyGranted,
    /// The consent UI was shown and answered (or left undetermined)
    Prompted(PermissionStatus),
    Deferred { retry_at: DateTime<Utc> },
    Suppressed,
    /// Another prompt for this capability is on screen
    InProgress,
}

pub struct PermissionGate {
    probe: Arc<dyn PermissionProbe>,
    store: Arc<dyn PermissionStore>,
    states: Mutex<BTreeMap<Capability, PermissionState>>,
    prompting: Mutex<BTreeSet<Capability>>,
    cooldown: chrono::Duration,
    clock: Clock,
    /// Bumped for every state snapshot handed to the store
    generation: AtomicU64,
    /// Generation of the snapshot last written; older ones are skipped
    saved_generation: Arc<Mutex<u64>>,
}

impl PermissionGate {
    /// Build a gate tracking `capabilities`, seeded from `store`.
    pub fn new(
        probe: Arc<dyn PermissionProbe>,
        store: Arc<dyn PermissionStore>,
        cooldown: Duration,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        let mut states: BTreeMap<Capability, PermissionState> = match store.load() {
            Ok(saved) => saved
                .into_iter()
                .map(|state| (state.capability.clone(), state))
                .collect(),
            Err(e) => {
                log::warn!("ignoring unreadable permission store: {:#}", e);
                BTreeMap::new()
            }
        };

        for capability in capabilities {
            states
                .entry(capability.clone())
                .or_insert_with(|| PermissionState::new(capability));
        }

        Self {
            probe,
            store,
            states: Mutex::new(states),
            prompting: Mutex::new(BTreeSet::new()),
            cooldown: chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX),
            clock: Arc::new(Utc::now),
            generation: AtomicU64::new(0),
            saved_generation: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn state(&self, capability: &Capability) -> PermissionState {
        self.states
            .lock()
            .get(capability)
            .cloned()
            .unwrap_or_else(|| PermissionState::new(capability.clone()))
    }

    pub fn states(&self) -> Vec<PermissionState> {
        self.states.lock().values().cloned().collect()
    }

    pub fn is_granted(&self, capability: &Capability) -> bool {
        self.state(capability).is_granted()
    }

    pub fn decide(&self, capability: &Capability, trigger: PromptTrigger) -> GateDecision {
        self.state(capability).decide(trigger, self.cooldown, self.now())
    }

    /// Run the non-prompting OS check for one capability and fold it in.
    pub async fn refresh(&self, capability: &Capability) -> PermissionState {
        let observed = match self.probe.check(capability).await {
            Ok(observed) => observed,
            Err(e) => {
                log::warn!("permission check for {} failed: {}", capability, e);
                None
            }
        };

        let now = self.now();
        let (state, changed) = {
            let mut states = self.states.lock();
            let state = states
                .entry(capability.clone())
                .or_insert_with(|| PermissionState::new(capability.clone()));
            let before = state.status;
            let checked = state.apply_check(observed);
            let expired = state.expire_cooldown(self.cooldown, now);
            if checked || expired {
                log::info!("{}: {:?} -> {:?}", capability, before, state.status);
            }
            (state.clone(), checked || expired)
        };

        if changed {
            self.persist().await;
        }
        state
    }

    /// Refresh every tracked capability, returning the resulting states.
    pub async fn refresh_all(&self) -> Vec<PermissionState> {
        let capabilities: Vec<Capability> = self.states.lock().keys().cloned().collect();
        for capability in &capabilities {
            self.refresh(capability).await;
        }
        self.states()
    }

    /// Ask for `capability`, showing the OS consent UI if the gate allows it.
    pub async fn request(
        &self,
        capability: &Capability,
        trigger: PromptTrigger,
    ) -> Result<RequestOutcome, PermissionError> {
        capability.validate()?;

        match self.decide(capability, trigger) {
            GateDecision::Proceed => return Ok(RequestOutcome::AlreadyGranted),
            GateDecision::Deferred { retry_at } => return Ok(RequestOutcome::Deferred { retry_at }),
            GateDecision::Suppressed => return Ok(RequestOutcome::Suppressed),
            GateDecision::Prompt => {}
        }

        if !self.prompting.lock().insert(capability.clone()) {
            return Ok(RequestOutcome::InProgress);
        }

        log::info!("prompting for {} ({:?})", capability, trigger);
        let answer = self.probe.request(capability).await;
        self.prompting.lock().remove(capability);
        let answer = answer?;

        let now = self.now();
        {
            let mut states = self.states.lock();
            let state = states
                .entry(capability.clone())
                .or_insert_with(|| PermissionState::new(capability.clone()));
            state.record_prompt(answer, now);
            log::info!("{}: prompt answered {:?}, now {:?}", capability, answer, state.status);
        }
        self.persist().await;

        Ok(RequestOutcome::Prompted(answer))
    }

    /// Set or clear the user's "don't ask again" override.
    pub async fn set_dont_ask_again(&self, capability: &Capability, value: bool) {
        {
            let mut states = self.states.lock();
            let state = states
                .entry(capability.clone())
                .or_insert_with(|| PermissionState::new(capability.clone()));
            state.dont_ask_again = value;
        }
        self.persist().await;
    }

    /// Record that the user dismissed a consent dialog shown by an action
    /// (e.g. the administrator prompt behind a purge). The capability
    /// becomes denied and ambient prompts wait out the cooldown.
    pub async fn record_declined(&self, capability: &Capability) {
        let now = self.now();
        {
            let mut states = self.states.lock();
            let state = states
                .entry(capability.clone())
                .or_insert_with(|| PermissionState::new(capability.clone()));
            state.record_prompt(PermissionStatus::Denied, now);
            log::info!("{}: declined at an action prompt, now {:?}", capability, state.status);
        }
        self.persist().await;
    }

    /// Write the current states off the async workers. Snapshots are
    /// numbered under the states lock, so a slower write of an older
    /// snapshot never replaces a newer one.
    async fn persist(&self) {
        let (generation, states) = {
            let states = self.states.lock();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (generation, states.values().cloned().collect::<Vec<_>>())
        };

        let store = Arc::clone(&self.store);
        let saved = Arc::clone(&self.saved_generation);
        let task = tokio::task::spawn_blocking(move || {
            let mut saved = saved.lock();
            if generation <= *saved {
                return;
            }
            match store.save(&states) {
                Ok(()) => *saved = generation,
                Err(e) => log::warn!("failed to persist permission states: {:#}", e),
            }
        });
        if let Err(e) = task.await {
            log::warn!("permission store writer ended abnormally: {}", e);
        }
    }
}
