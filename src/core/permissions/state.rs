//! Per-capability consent state and its transitions.
//!
//! ```text
//! NotDetermined --request--> Granted
//! NotDetermined --request--> Denied --cooldown elapsed--> NotDetermined
//! Denied --don't ask again--> (no further prompting)
//! Granted --OS check reports revoked--> Denied
//! ```

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PermissionError;

const MAX_TARGET_LEN: usize = 128;

/// A privileged capability the engine may need
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum Capability {
    Accessibility,
    FullDiskAccess,
    /// Scripting control of one target application, by name
    Automation(String),
    ElevatedExecution,
}

impl Capability {
    /// Reject automation targets that could break out of a script literal.
    pub fn validate(&self) -> Result<(), PermissionError> {
        if let Capability::Automation(target) = self {
            let ok = !target.trim().is_empty()
                && target.len() <= MAX_TARGET_LEN
                && target
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_'));
            if !ok {
                return Err(PermissionError::InvalidTarget(target.clone()));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Accessibility => write!(f, "accessibility"),
            Capability::FullDiskAccess => write!(f, "full disk access"),
            Capability::Automation(target) => write!(f, "automation of {}", target),
            Capability::ElevatedExecution => write!(f, "elevated execution"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    #[default]
    NotDetermined,
}

/// What triggered a prompt attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTrigger {
    /// Background reminder; subject to the cooldown
    Ambient,
    /// The user clicked something; bypasses the cooldown
    Explicit,
}

/// Gate verdict for a capability at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Already granted; act now
    Proceed,
    /// Show the OS consent UI
    Prompt,
    /// Denied recently; try again no earlier than `retry_at`
    Deferred { retry_at: DateTime<Utc> },
    /// The user asked not to be prompted again
    Suppressed,
}

/// Consent status of one capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionState {
    pub capability: Capability,
    pub status: PermissionStatus,
    #[serde(default)]
    pub last_prompted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dont_ask_again: bool,
    /// Denied because a check found a previous grant withdrawn, not
    /// because the user answered a prompt
    #[serde(default)]
    pub revoked: bool,
}

impl PermissionState {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            status: PermissionStatus::NotDetermined,
            last_prompted_at: None,
            dont_ask_again: false,
            revoked: false,
        }
    }

    pub fn is_granted(&self) -> bool {
        self.status == PermissionStatus::Granted
    }

    pub fn decide(&self, trigger: PromptTrigger, cooldown: Duration, now: DateTime<Utc>) -> GateDecision {
        match self.status {
            PermissionStatus::Granted => GateDecision::Proceed,
            _ if self.dont_ask_again => GateDecision::Suppressed,
            PermissionStatus::NotDetermined => GateDecision::Prompt,
            PermissionStatus::Denied => match (trigger, self.cooldown_ends(cooldown)) {
                (PromptTrigger::Ambient, Some(retry_at)) if now < retry_at => {
                    GateDecision::Deferred { retry_at }
                }
                _ => GateDecision::Prompt,
            },
        }
    }

    /// Record the answer from an OS consent prompt. An undetermined answer
    /// (the OS only opened its settings pane) leaves the status alone.
    pub fn record_prompt(&mut self, answer: PermissionStatus, now: DateTime<Utc>) {
        self.last_prompted_at = Some(now);
        if answer != PermissionStatus::NotDetermined {
            self.status = answer;
            self.revoked = false;
        }
    }

    /// Fold in a non-prompting OS check. Returns whether the status changed.
    ///
    /// A check can confirm a grant or detect a revoked one. It cannot turn
    /// an undetermined capability into a denial; only a prompt can.
    pub fn apply_check(&mut self, observed: Option<PermissionStatus>) -> bool {
        let next = match (self.status, observed) {
            (_, Some(PermissionStatus::Granted)) => PermissionStatus::Granted,
            (PermissionStatus::Granted, Some(_)) => PermissionStatus::Denied,
            (current, _) => current,
        };
        let changed = next != self.status;
        if changed {
            self.revoked = next == PermissionStatus::Denied;
        }
        self.status = next;
        changed
    }

    /// Move a prompted-and-denied capability back to undetermined once its
    /// cooldown has passed, unless the user opted out. A revoked grant
    /// stays denied until the next prompt answers it.
    /// Returns whether it moved.
    pub fn expire_cooldown(&mut self, cooldown: Duration, now: DateTime<Utc>) -> bool {
        if self.status != PermissionStatus::Denied || self.dont_ask_again || self.revoked {
            return false;
        }
        match self.cooldown_ends(cooldown) {
            Some(retry_at) if now >= retry_at => {
                self.status = PermissionStatus::NotDetermined;
                true
            }
            _ => false,
        }
    }

    fn cooldown_ends(&self, cooldown: Duration) -> Option<DateTime<Utc>> {
        self.last_prompted_at.map(|at| at + cooldown)
    }
}
