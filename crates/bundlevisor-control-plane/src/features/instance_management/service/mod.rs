use crate::features::instance_management::repo::extract_archive;
use crate::features::quota::service::QuotaEnforcer;
use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use bundlevisor_core::{
    instance_id_for, owner_of, CoreError, InstanceMetadata, OwnerId, RunSpec, Tier,
};
use bundlevisor_supervisor::layout::is_valid_instance_id;
use bundlevisor_supervisor::{FleetOutcome, FleetReport, StopOutcome, Supervisor};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const DIGEST_LEN: usize = 16;

/// An unpacked, resolvable bundle that has passed the quota gate.
#[derive(Debug, Clone)]
pub struct PreparedBundle {
    pub instance_id: String,
    pub directory: PathBuf,
    pub run_spec: RunSpec,
    pub replaced: bool,
}

/// Instance operations on behalf of a tenant or the operator.
///
/// Owns the supervisor; tenants may act only on instances whose id carries
/// their owner id, the operator may act on any.
pub struct InstanceService {
    supervisor: Supervisor,
    quota: QuotaEnforcer,
    operator_id: OwnerId,
}

impl InstanceService {
    pub fn new(supervisor: Supervisor, operator_id: OwnerId) -> Self {
        Self {
            supervisor,
            quota: QuotaEnforcer::new(),
            operator_id,
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut Supervisor {
        &mut self.supervisor
    }

    /// Content-derived id: re-uploading the same bytes targets the same
    /// instance.
    pub fn instance_id_for_upload(owner_id: OwnerId, content: &[u8]) -> String {
        let digest = format!("{:x}", md5::compute(content));
        instance_id_for(owner_id, &digest[..DIGEST_LEN])
    }

    /// Validate, gate on quota, unpack and resolve an uploaded archive.
    ///
    /// Nothing is written to the bundle tree unless the quota allows it. A
    /// bundle without an entry point is removed again.
    pub async fn prepare_upload(
        &mut self,
        owner_id: OwnerId,
        tier: Tier,
        filename: &str,
        content: Vec<u8>,
    ) -> ControlPlaneResult<PreparedBundle> {
        if !filename.to_ascii_lowercase().ends_with(".zip") {
            return Err(ControlPlaneError::MalformedInput(
                "Please upload a ZIP file.".to_string(),
            ));
        }

        let instance_id = Self::instance_id_for_upload(owner_id, &content);
        let replaced = self.supervisor.layout().exists(&instance_id);
        self.quota.enforce(
            self.supervisor.layout(),
            owner_id,
            tier,
            replaced.then_some(instance_id.as_str()),
        )?;

        if replaced {
            info!(instance_id = %instance_id, "Re-upload replaces existing bundle");
            self.supervisor.stop(&instance_id).await?;
            self.supervisor.layout().remove(&instance_id)?;
        }

        let directory = self.supervisor.layout().bundle_dir(&instance_id);
        let files = extract_archive(content, directory.clone()).await?;

        let Some(run_spec) = self.supervisor.resolver().resolve(&directory) else {
            warn!(instance_id = %instance_id, "Uploaded bundle has no entry point, discarding");
            self.supervisor.layout().remove(&instance_id)?;
            return Err(CoreError::ResolutionError(directory.display().to_string()).into());
        };

        info!(
            instance_id = %instance_id,
            owner_id,
            files,
            command = %run_spec,
            replaced,
            "Bundle accepted"
        );

        Ok(PreparedBundle {
            instance_id,
            directory,
            run_spec,
            replaced,
        })
    }

    pub async fn launch(&mut self, bundle: &PreparedBundle) -> ControlPlaneResult<u32> {
        Ok(self
            .supervisor
            .start(&bundle.instance_id, &bundle.directory)
            .await?)
    }

    pub async fn stop(&mut self, actor: OwnerId, instance_id: &str) -> ControlPlaneResult<StopOutcome> {
        self.authorize(actor, instance_id)?;
        Ok(self.supervisor.stop(instance_id).await?)
    }

    pub async fn restart(&mut self, actor: OwnerId, instance_id: &str) -> ControlPlaneResult<u32> {
        self.authorize(actor, instance_id)?;
        Ok(self.supervisor.restart(instance_id).await?)
    }

    pub async fn tail_log(
        &self,
        actor: OwnerId,
        instance_id: &str,
        lines: usize,
    ) -> ControlPlaneResult<Vec<String>> {
        self.authorize(actor, instance_id)?;
        Ok(self.supervisor.logs().tail(instance_id, lines).await?)
    }

    pub fn full_log_path(&self, actor: OwnerId, instance_id: &str) -> ControlPlaneResult<PathBuf> {
        self.authorize(actor, instance_id)?;
        Ok(self.supervisor.logs().existing_log_path(instance_id)?)
    }

    pub fn list_owned(&mut self, owner_id: OwnerId) -> ControlPlaneResult<Vec<InstanceMetadata>> {
        Ok(self.supervisor.list(Some(owner_id))?)
    }

    pub fn list_all(&mut self) -> ControlPlaneResult<Vec<InstanceMetadata>> {
        Ok(self.supervisor.list(None)?)
    }

    pub fn running_count(&mut self) -> usize {
        self.supervisor.running().len()
    }

    /// Stop every running instance. Returns how many were stopped.
    pub async fn kill_all(&mut self) -> usize {
        let outcomes = self.supervisor.kill_all().await;
        let mut stopped = 0;
        for (instance_id, outcome) in outcomes {
            match outcome {
                Ok(StopOutcome::Stopped) => stopped += 1,
                Ok(StopOutcome::NotRunning) => {}
                Err(e) => warn!(instance_id = %instance_id, error = %e, "Failed to stop instance"),
            }
        }
        stopped
    }

    pub async fn run_command(&self, working_dir: &Path, command: &str) -> FleetOutcome {
        info!(command = %command, working_dir = %working_dir.display(), "Running operator command");
        self.supervisor.fleet().run_single(working_dir, command).await
    }

    pub async fn run_fleet_command(&mut self, command: &str) -> ControlPlaneResult<FleetReport> {
        Ok(self.supervisor.run_fleet_command(command).await?)
    }

    fn authorize(&self, actor: OwnerId, instance_id: &str) -> ControlPlaneResult<()> {
        if !is_valid_instance_id(instance_id) {
            return Err(ControlPlaneError::MalformedInput(format!(
                "Invalid bot id: {instance_id}"
            )));
        }
        if actor == self.operator_id || owner_of(instance_id) == Some(actor) {
            Ok(())
        } else {
            warn!(actor, instance_id = %instance_id, "Rejected action on foreign instance");
            Err(ControlPlaneError::PermissionDenied(format!(
                "{actor} does not own {instance_id}"
            )))
        }
    }
}
