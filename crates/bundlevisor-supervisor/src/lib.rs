pub mod config;
pub mod fleet;
pub mod layout;
pub mod log_store;
pub mod resolver;

pub use config::SupervisorConfig;
pub use fleet::{FleetExecutor, FleetOutcome, FleetReport, FleetResult};
pub use layout::BundleLayout;
pub use log_store::LogStore;
pub use resolver::{EntryPointResolver, ResolverConfig};

use bundlevisor_core::{
    owner_of, CoreError, ExecutionEventRecorder, InstanceMetadata, InstanceStatus, OwnerId,
    Result, RunSpec,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

/// Live OS process for one instance. Owned exclusively by the supervisor.
struct ProcessHandle {
    child: Child,
    pid: u32,
    run_spec: RunSpec,
    working_directory: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

/// Process Supervisor: maps instance ids to live child processes.
///
/// All methods take `&mut self`; the control loop owns the supervisor and
/// is its only caller, so no locking is involved.
pub struct Supervisor {
    layout: BundleLayout,
    logs: LogStore,
    resolver: EntryPointResolver,
    fleet: FleetExecutor,
    fleet_output_limit: usize,
    stop_grace: Duration,
    instances: HashMap<String, ProcessHandle>,
    launch_failures: HashMap<String, String>,
    event_recorder: ExecutionEventRecorder,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        let layout = BundleLayout::new(config.bundles_dir);
        layout.ensure()?;
        let logs = LogStore::new(config.logs_dir);
        std::fs::create_dir_all(logs.root())?;

        Ok(Self {
            layout,
            logs,
            resolver: EntryPointResolver::new(config.resolver),
            fleet: FleetExecutor::new(config.fleet_timeout),
            fleet_output_limit: config.fleet_output_limit,
            stop_grace: config.stop_grace,
            instances: HashMap::new(),
            launch_failures: HashMap::new(),
            event_recorder: ExecutionEventRecorder::new(),
        })
    }

    pub fn layout(&self) -> &BundleLayout {
        &self.layout
    }

    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    pub fn resolver(&self) -> &EntryPointResolver {
        &self.resolver
    }

    pub fn fleet(&self) -> &FleetExecutor {
        &self.fleet
    }

    pub fn fleet_output_limit(&self) -> usize {
        self.fleet_output_limit
    }

    pub fn events(&self) -> &ExecutionEventRecorder {
        &self.event_recorder
    }

    /// Resolve and launch the bundle in `working_directory`.
    ///
    /// Returns as soon as the child is spawned; stdout and stderr are
    /// appended to the instance log.
    pub async fn start(&mut self, instance_id: &str, working_directory: &Path) -> Result<u32> {
        if self.status(instance_id) == InstanceStatus::Running {
            return Err(CoreError::AlreadyRunning(instance_id.to_string()));
        }

        let run_spec = self.resolver.resolve(working_directory).ok_or_else(|| {
            CoreError::ResolutionError(working_directory.display().to_string())
        })?;

        let stdout = self.logs.open_append(instance_id)?;
        let stderr = stdout.try_clone()?;

        let argv = run_spec.argv();
        let mut command = Command::new(run_spec.program());
        command
            .args(&argv[1..])
            .current_dir(working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // Own session so stop() can signal the whole process group.
        new_session(&mut command);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let reason = format!("{}: {}", run_spec, e);
                error!(instance_id = %instance_id, error = %reason, "Failed to launch instance");
                self.event_recorder
                    .record_launch_failure(instance_id, &reason);
                self.launch_failures
                    .insert(instance_id.to_string(), reason.clone());
                return Err(CoreError::LaunchError(reason));
            }
        };

        let pid = child.id().unwrap_or_default();
        info!(
            instance_id = %instance_id,
            pid,
            command = %run_spec,
            working_directory = %working_directory.display(),
            "Instance started"
        );

        self.launch_failures.remove(instance_id);
        self.event_recorder.record_start(instance_id, pid);
        self.instances.insert(
            instance_id.to_string(),
            ProcessHandle {
                child,
                pid,
                run_spec,
                working_directory: working_directory.to_path_buf(),
            },
        );

        Ok(pid)
    }

    /// Terminate gracefully, escalating to a forced kill after the grace
    /// period. The handle leaves the live set before any signal is sent.
    pub async fn stop(&mut self, instance_id: &str) -> Result<StopOutcome> {
        let Some(mut handle) = self.instances.remove(instance_id) else {
            return Ok(StopOutcome::NotRunning);
        };

        if let Ok(Some(status)) = handle.child.try_wait() {
            info!(instance_id = %instance_id, %status, "Instance had already exited");
            self.event_recorder.record_exit(instance_id, status.code());
            return Ok(StopOutcome::NotRunning);
        }

        request_termination(&mut handle);

        match tokio::time::timeout(self.stop_grace, handle.child.wait()).await {
            Ok(Ok(status)) => {
                info!(instance_id = %instance_id, %status, "Instance stopped");
                self.event_recorder.record_stop(instance_id);
                Ok(StopOutcome::Stopped)
            }
            Ok(Err(e)) => {
                warn!(instance_id = %instance_id, error = %e, "Waiting for instance failed, forcing kill");
                self.force_kill(instance_id, handle).await
            }
            Err(_) => {
                warn!(
                    instance_id = %instance_id,
                    grace_secs = self.stop_grace.as_secs_f64(),
                    "Instance ignored termination request, forcing kill"
                );
                self.force_kill(instance_id, handle).await
            }
        }
    }

    async fn force_kill(
        &mut self,
        instance_id: &str,
        mut handle: ProcessHandle,
    ) -> Result<StopOutcome> {
        #[cfg(unix)]
        signal_group(handle.pid, libc::SIGKILL);

        match handle.child.kill().await {
            Ok(()) => {}
            Err(e) => {
                if !matches!(handle.child.try_wait(), Ok(Some(_))) {
                    error!(instance_id = %instance_id, pid = handle.pid, error = %e, "Failed to kill instance");
                    return Err(CoreError::StopTimeout(instance_id.to_string()));
                }
            }
        }

        info!(instance_id = %instance_id, pid = handle.pid, "Instance killed");
        self.event_recorder.record_kill(instance_id);
        Ok(StopOutcome::Stopped)
    }

    /// Stop (ignoring "not running") and start again from the on-disk
    /// bundle directory, which is the durable record of the instance.
    pub async fn restart(&mut self, instance_id: &str) -> Result<u32> {
        if !self.layout.exists(instance_id) {
            return Err(CoreError::InstanceNotFound(instance_id.to_string()));
        }

        self.stop(instance_id).await?;
        self.event_recorder.record_restart(instance_id);
        let working_directory = self.layout.bundle_dir(instance_id);
        self.start(instance_id, &working_directory).await
    }

    /// Non-blocking status poll; an exited child is reaped and reported
    /// as stopped.
    pub fn status(&mut self, instance_id: &str) -> InstanceStatus {
        let Some(handle) = self.instances.get_mut(instance_id) else {
            return if self.launch_failures.contains_key(instance_id) {
                InstanceStatus::FailedToStart
            } else {
                InstanceStatus::Stopped
            };
        };

        match handle.child.try_wait() {
            Ok(None) => InstanceStatus::Running,
            Ok(Some(status)) => {
                info!(instance_id = %instance_id, %status, "Instance exited");
                self.instances.remove(instance_id);
                self.event_recorder.record_exit(instance_id, status.code());
                InstanceStatus::Stopped
            }
            Err(e) => {
                warn!(instance_id = %instance_id, error = %e, "Failed to poll instance, dropping handle");
                self.instances.remove(instance_id);
                InstanceStatus::Stopped
            }
        }
    }

    pub fn describe(&mut self, instance_id: &str) -> Option<InstanceMetadata> {
        if !self.layout.exists(instance_id) && !self.instances.contains_key(instance_id) {
            return None;
        }

        let status = self.status(instance_id);
        let handle = self.instances.get(instance_id);
        let working_directory = handle
            .map(|h| h.working_directory.clone())
            .unwrap_or_else(|| self.layout.bundle_dir(instance_id));
        let run_spec = match handle {
            Some(h) => Some(h.run_spec.clone()),
            None => self.resolver.resolve(&working_directory),
        };

        Some(InstanceMetadata {
            instance_id: instance_id.to_string(),
            owner_id: owner_of(instance_id),
            log_path: self.logs.log_path(instance_id),
            working_directory,
            run_spec,
            status,
            pid: handle.map(|h| h.pid),
        })
    }

    /// Every known bundle, or only those of `owner`, in directory order.
    pub fn list(&mut self, owner: Option<OwnerId>) -> Result<Vec<InstanceMetadata>> {
        let ids = match owner {
            Some(owner_id) => self.layout.owned_by(owner_id)?,
            None => self.layout.list()?,
        };
        Ok(ids.iter().filter_map(|id| self.describe(id)).collect())
    }

    /// Ids of instances whose process is alive, sorted.
    pub fn running(&mut self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.keys().cloned().collect();
        ids.sort();
        ids.retain(|id| self.status(id) == InstanceStatus::Running);
        ids
    }

    pub async fn kill_all(&mut self) -> Vec<(String, Result<StopOutcome>)> {
        let mut outcomes = Vec::new();
        for instance_id in self.running() {
            let outcome = self.stop(&instance_id).await;
            outcomes.push((instance_id, outcome));
        }
        info!(count = outcomes.len(), "Stopped all running instances");
        outcomes
    }

    /// Run `command` in every bundle directory plus any live instance whose
    /// directory is no longer listed on disk.
    pub async fn run_fleet_command(&mut self, command: &str) -> Result<FleetReport> {
        let mut targets: Vec<(String, PathBuf)> = self
            .layout
            .list()?
            .into_iter()
            .map(|id| {
                let dir = self.layout.bundle_dir(&id);
                (id, dir)
            })
            .collect();

        let mut live: Vec<(String, PathBuf)> = self
            .instances
            .iter()
            .filter(|(id, _)| !self.layout.exists(id))
            .map(|(id, handle)| (id.clone(), handle.working_directory.clone()))
            .collect();
        live.sort();
        targets.extend(live);

        info!(command = %command, targets = targets.len(), "Running fleet command");
        Ok(self.fleet.run_across(&targets, command).await)
    }
}

fn request_termination(handle: &mut ProcessHandle) {
    #[cfg(unix)]
    signal_group(handle.pid, libc::SIGTERM);
    #[cfg(not(unix))]
    {
        let _ = handle.child.start_kill();
    }
}

/// Signal the child's process group, falling back to the pid itself.
/// Make the spawned child lead a new session and process group.
pub(crate) fn new_session(command: &mut Command) {
    #[cfg(unix)]
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
    #[cfg(not(unix))]
    let _ = command;
}

#[cfg(unix)]
pub(crate) fn signal_group(pid: u32, signal: libc::c_int) -> bool {
    if pid == 0 {
        return false;
    }
    let pid = pid as libc::pid_t;
    unsafe { libc::kill(-pid, signal) == 0 || libc::kill(pid, signal) == 0 }
}
