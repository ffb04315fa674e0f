//! Consent tracking for privileged capabilities.

mod gate;
mod state;
mod store;

pub use gate::{Clock, PermissionGate, PermissionProbe, RequestOutcome};
pub use state::{Capability, GateDecision, PermissionState, PermissionStatus, PromptTrigger};
pub use store::{JsonPermissionStore, MemoryPermissionStore, PermissionStore};
