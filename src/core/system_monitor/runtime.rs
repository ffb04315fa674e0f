//! Top-level owner of the monitoring engine.
//!
//! [`ResourceMonitor`] wires the gateway, samplers, schedulers, permission
//! gate and action executor together and owns their lifecycle. Construct
//! one per application and pass it (or its readers) to whatever needs it.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::metrics::{MemorySnapshot, ProcessRecord};
use super::samplers::{MemorySampler, PermissionSampler, ProcessSampler};
use super::scheduler::{spawn_scheduler, SchedulerHandle};
use super::store::{snapshot_channel, SnapshotReader};
use crate::core::actions::{ActionExecutor, RefreshHooks};
use crate::core::cleaner::CacheCleaner;
use crate::core::config::MonitorConfig;
use crate::core::permissions::{
    Capability, JsonPermissionStore, PermissionGate, PermissionProbe, PermissionState,
    PermissionStore, PromptTrigger, RequestOutcome,
};
use crate::error::{MonitorError, PermissionError, Result};
use crate::platform::command::{CommandRunner, SystemCommandRunner};
use crate::platform::macos::SystemPermissionProbe;

/// External collaborators the engine talks through
pub struct MonitorDeps {
    pub runner: Arc<dyn CommandRunner>,
    pub probe: Arc<dyn PermissionProbe>,
    pub store: Arc<dyn PermissionStore>,
}

impl MonitorDeps {
    /// Real subprocesses, the macOS probe and the on-disk permission store.
    pub fn system(config: &MonitorConfig) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        let probe = Arc::new(SystemPermissionProbe::new(
            Arc::clone(&runner),
            config.command_timeout(),
            config.privileged_timeout(),
        ));
        let store = JsonPermissionStore::default_location()
            .map_err(|e| MonitorError::config(format!("{:#}", e)))?;
        let store = Arc::new(store);
        Ok(Self { runner, probe, store })
    }
}

pub struct ResourceMonitor {
    processes: SnapshotReader<Vec<ProcessRecord>>,
    memory: SnapshotReader<MemorySnapshot>,
    permissions: SnapshotReader<Vec<PermissionState>>,
    process_scheduler: SchedulerHandle,
    memory_scheduler: SchedulerHandle,
    permission_scheduler: SchedulerHandle,
    gate: Arc<PermissionGate>,
    executor: ActionExecutor,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl ResourceMonitor {
    /// Spawn all background tasks on the current tokio runtime.
    pub fn start(config: &MonitorConfig, deps: MonitorDeps) -> Self {
        log::info!("Starting resource monitor");

        let config = config.clone().validated();
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let gate = Arc::new(PermissionGate::new(
            deps.probe,
            deps.store,
            config.prompt_cooldown(),
            config.tracked_capabilities(),
        ));

        let (process_tx, processes) = snapshot_channel();
        let (memory_tx, memory) = snapshot_channel();
        let (permission_tx, permissions) = snapshot_channel();

        let process_sampler = ProcessSampler::new(Arc::clone(&deps.runner), config.command_timeout())
            .with_format(config.listing_format)
            .with_ranking(config.rank_metric, config.noise_floor_mb, config.process_limit);
        let memory_sampler = MemorySampler::new(Arc::clone(&deps.runner), config.command_timeout());
        let permission_sampler = PermissionSampler::new(Arc::clone(&gate));

        let (process_scheduler, process_task) = spawn_scheduler(
            process_sampler,
            config.process_interval(),
            process_tx,
            shutdown_tx.subscribe(),
        );
        let (memory_scheduler, memory_task) = spawn_scheduler(
            memory_sampler,
            config.memory_interval(),
            memory_tx,
            shutdown_tx.subscribe(),
        );
        let (permission_scheduler, permission_task) = spawn_scheduler(
            permission_sampler,
            config.permission_interval(),
            permission_tx,
            shutdown_tx.subscribe(),
        );

        let executor = ActionExecutor::new(
            Arc::clone(&deps.runner),
            Arc::clone(&gate),
            CacheCleaner::new(config.cache_directories()),
            config.command_timeout(),
            config.privileged_timeout(),
        )
        .with_refresh_hooks(RefreshHooks {
            processes: Some(process_scheduler.clone()),
            memory: Some(memory_scheduler.clone()),
        });

        Self {
            processes,
            memory,
            permissions,
            process_scheduler,
            memory_scheduler,
            permission_scheduler,
            gate,
            executor,
            shutdown_tx,
            tasks: vec![process_task, memory_task, permission_task],
        }
    }

    pub fn processes(&self) -> SnapshotReader<Vec<ProcessRecord>> {
        self.processes.clone()
    }

    pub fn memory(&self) -> SnapshotReader<MemorySnapshot> {
        self.memory.clone()
    }

    pub fn permissions(&self) -> SnapshotReader<Vec<PermissionState>> {
        self.permissions.clone()
    }

    pub fn permission_state(&self, capability: &Capability) -> PermissionState {
        self.gate.state(capability)
    }

    pub fn gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    pub fn process_scheduler(&self) -> &SchedulerHandle {
        &self.process_scheduler
    }

    pub fn memory_scheduler(&self) -> &SchedulerHandle {
        &self.memory_scheduler
    }

    pub fn permission_scheduler(&self) -> &SchedulerHandle {
        &self.permission_scheduler
    }

    /// User-initiated permission request. Bypasses the ambient cooldown.
    pub async fn request_permission(
        &self,
        capability: &Capability,
    ) -> std::result::Result<RequestOutcome, PermissionError> {
        let outcome = self.gate.request(capability, PromptTrigger::Explicit).await?;
        self.permission_scheduler.request_refresh();
        Ok(outcome)
    }

    /// Stop every scheduler and wait for them to exit. In-flight commands
    /// are dropped, which kills their child processes.
    pub async fn shutdown(self) {
        log::info!("Shutting down resource monitor");
        // Only fails when every task already exited
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            if let Err(e) = task.await {
                log::warn!("monitor task ended abnormally: {}", e);
            }
        }
    }
}
