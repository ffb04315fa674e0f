//! State-mutating actions: process termination, memory purge, cache cleaning.
//!
//! Errors here always reach the caller, who is waiting on a definite answer.
//! A successful action asks the matching scheduler for an out-of-cycle
//! refresh so the snapshot reflects it without waiting a full interval.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::cleaner::{CacheCleaner, CleanupStats};
use crate::core::permissions::{Capability, PermissionGate};
use crate::core::system_monitor::SchedulerHandle;
use crate::error::{ActionError, ExecutionError};
use crate::platform::command::CommandRunner;
use crate::platform::elevation::{is_user_cancelled, privileged_command};
use crate::platform::macos::{KILL, PURGE};

const NO_SUCH_PROCESS: &str = "No such process";
const NOT_PERMITTED: &str = "Operation not permitted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminateMode {
    /// SIGTERM: the process may handle or ignore it
    Graceful,
    /// SIGKILL: cannot be caught
    Forced,
}

impl TerminateMode {
    fn signal_flag(&self) -> &'static str {
        match self {
            TerminateMode::Graceful => "-TERM",
            TerminateMode::Forced => "-KILL",
        }
    }
}

/// Successful outcome of an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Terminated { pid: u32, mode: TerminateMode },
    /// The process was already gone, which is what the caller wanted
    TargetNotFound { pid: u32 },
    MemoryPurged,
    CachesCleaned(CleanupStats),
}

impl Confirmation {
    pub fn is_soft_success(&self) -> bool {
        matches!(self, Confirmation::TargetNotFound { .. })
    }
}

/// Schedulers to poke after an action
#[derive(Debug, Clone, Default)]
pub struct RefreshHooks {
    pub processes: Option<SchedulerHandle>,
    pub memory: Option<SchedulerHandle>,
}

#[derive(Clone)]
pub struct ActionExecutor {
    runner: Arc<dyn CommandRunner>,
    gate: Arc<PermissionGate>,
    cleaner: CacheCleaner,
    hooks: RefreshHooks,
    timeout: Duration,
    privileged_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        gate: Arc<PermissionGate>,
        cleaner: CacheCleaner,
        timeout: Duration,
        privileged_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            gate,
            cleaner,
            hooks: RefreshHooks::default(),
            timeout,
            privileged_timeout,
        }
    }

    pub fn with_refresh_hooks(mut self, hooks: RefreshHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Send a termination signal to `pid`.
    ///
    /// A pid that no longer exists is reported as
    /// [`Confirmation::TargetNotFound`], not as an error. When the signal
    /// is refused and elevated execution is granted, the signal is sent
    /// again with administrator rights.
    pub async fn terminate(&self, pid: u32, mode: TerminateMode) -> Result<Confirmation, ActionError> {
        if pid == 0 {
            return Err(ActionError::InvalidPid(pid));
        }
        if pid == 1 || pid == std::process::id() {
            return Err(ActionError::Protected(pid));
        }

        let args = vec![mode.signal_flag().to_string(), pid.to_string()];
        let confirmation = match self.runner.run(KILL, &args, self.timeout).await {
            Ok(_) => Confirmation::Terminated { pid, mode },
            Err(ExecutionError::Failed { stderr, .. }) if stderr.contains(NO_SUCH_PROCESS) => {
                Confirmation::TargetNotFound { pid }
            }
            Err(ExecutionError::Failed { stderr, .. }) if stderr.contains(NOT_PERMITTED) => {
                let capability = Capability::ElevatedExecution;
                if !self.gate.is_granted(&capability) {
                    log::warn!("not permitted to signal {}: {}", pid, stderr);
                    return Err(ActionError::PermissionDenied(capability));
                }
                log::info!("not permitted to signal {}, retrying elevated", pid);
                self.terminate_elevated(pid, mode).await?
            }
            Err(e) => {
                log::warn!("terminate {} ({:?}) failed: {}", pid, mode, e);
                return Err(e.into());
            }
        };

        log::info!("terminate {} ({:?}): {:?}", pid, mode, confirmation);
        refresh(&self.hooks.processes);
        Ok(confirmation)
    }

    async fn terminate_elevated(&self, pid: u32, mode: TerminateMode) -> Result<Confirmation, ActionError> {
        let command = format!("{} {} {}", KILL, mode.signal_flag(), pid);
        match self.run_privileged(&command).await {
            Ok(()) => Ok(Confirmation::Terminated { pid, mode }),
            Err(ActionError::Execution(ExecutionError::Failed { stderr, .. }))
                if stderr.contains(NO_SUCH_PROCESS) =>
            {
                Ok(Confirmation::TargetNotFound { pid })
            }
            Err(e) => {
                log::warn!("elevated terminate {} ({:?}) failed: {}", pid, mode, e);
                Err(e)
            }
        }
    }

    /// Reclaim inactive memory with `purge`.
    ///
    /// Requires elevated execution to be granted in the permission gate;
    /// otherwise nothing is run.
    pub async fn purge_memory(&self) -> Result<Confirmation, ActionError> {
        let capability = Capability::ElevatedExecution;
        if !self.gate.is_granted(&capability) {
            return Err(ActionError::PermissionDenied(capability));
        }

        if let Err(e) = self.run_privileged(PURGE).await {
            log::warn!("memory purge failed: {}", e);
            return Err(e);
        }

        log::info!("memory purged");
        refresh(&self.hooks.memory);
        Ok(Confirmation::MemoryPurged)
    }

    /// Run `command` with administrator rights. A dismissed password
    /// dialog is recorded in the gate as a denial.
    async fn run_privileged(&self, command: &str) -> Result<(), ActionError> {
        let (program, args) = privileged_command(command);
        match self.runner.run(&program, &args, self.privileged_timeout).await {
            Ok(_) => Ok(()),
            Err(ExecutionError::Failed { stderr, .. }) if is_user_cancelled(&stderr) => {
                log::info!("declined at the administrator prompt: {}", command);
                self.gate.record_declined(&Capability::ElevatedExecution).await;
                Err(ActionError::UserDeclinedElevation)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete (or with `dry_run`, measure) files in the cache directories.
    pub async fn clean_caches(&self, dry_run: bool) -> Result<Confirmation, ActionError> {
        let cleaner = self.cleaner.clone();
        let stats = tokio::task::spawn_blocking(move || cleaner.clean(dry_run, |_, _| {}))
            .await
            .map_err(|e| ActionError::Cleanup(e.to_string()))?;

        if !dry_run {
            refresh(&self.hooks.memory);
        }
        Ok(Confirmation::CachesCleaned(stats))
    }
}

fn refresh(hook: &Option<SchedulerHandle>) {
    if let Some(handle) = hook {
        handle.request_refresh();
    }
}
