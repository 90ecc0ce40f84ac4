//! The Control Loop: single consumer of inbound events and sole owner of
//! the supervisor, interaction states and tenant plans.

use crate::config::ControlPlaneConfig;
use crate::features::instance_management::service::InstanceService;
use crate::features::interaction::service::InteractionMachine;
use crate::features::observability::repo::ObservabilityRepository;
use crate::features::observability::service::ObservabilityService;
use crate::features::tenant_plans::repo::{JsonFilePlanRepository, PlanRepository};
use crate::features::tenant_plans::service::TenantPlanService;
use crate::features::transport::repo::cursor::CursorStore;
use crate::features::transport::repo::Notifier;
use crate::features::transport::service::DeliveryService;
use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use crate::shared::types::InboundEnvelope;
use bundlevisor_core::{
    Action, CoreError, DocumentEvent, DocumentFailedEvent, InboundEvent, InstanceMetadata,
    InteractionState, OwnerId, PendingText, PlanOp, Tier,
};
use bundlevisor_supervisor::{StopOutcome, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct ControlLoop {
    operator_id: OwnerId,
    data_dir: PathBuf,
    log_tail_lines: usize,
    instances: InstanceService,
    plans: TenantPlanService,
    interactions: InteractionMachine,
    delivery: DeliveryService,
    metrics: ObservabilityService,
    cursor: Option<CursorStore>,
}

impl ControlLoop {
    /// Build a loop persisting plans to `plans.json` in the data directory.
    pub async fn new(
        config: ControlPlaneConfig,
        notifier: Arc<dyn Notifier>,
    ) -> ControlPlaneResult<Self> {
        let plans_repo = Arc::new(JsonFilePlanRepository::new(config.plans_path()));
        Self::with_plan_repository(config, notifier, plans_repo).await
    }

    pub async fn with_plan_repository(
        config: ControlPlaneConfig,
        notifier: Arc<dyn Notifier>,
        plans_repo: Arc<dyn PlanRepository>,
    ) -> ControlPlaneResult<Self> {
        let supervisor = Supervisor::new(config.supervisor.clone())?;
        let plans = TenantPlanService::load(plans_repo).await?;
        let metrics_repo = ObservabilityRepository::new().map_err(ControlPlaneError::StorageError)?;

        info!(
            operator_id = config.operator_id,
            data_dir = %config.data_dir.display(),
            "Control loop initialized"
        );

        Ok(Self {
            operator_id: config.operator_id,
            log_tail_lines: config.log_tail_lines,
            instances: InstanceService::new(supervisor, config.operator_id),
            plans,
            interactions: InteractionMachine::new(),
            delivery: DeliveryService::new(
                notifier,
                config.outbox_dir(),
                config.inline_text_limit,
            ),
            metrics: ObservabilityService::new(Arc::new(metrics_repo)),
            cursor: None,
            data_dir: config.data_dir,
        })
    }

    /// Persist `sequence + 1` to `cursor` after every handled event.
    pub fn with_cursor(mut self, cursor: CursorStore) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn interaction_state(&self, owner_id: OwnerId) -> InteractionState {
        self.interactions.state(owner_id)
    }

    pub fn tier_of(&self, owner_id: OwnerId) -> Tier {
        self.plans.tier_of(owner_id)
    }

    pub fn supervisor_mut(&mut self) -> &mut Supervisor {
        self.instances.supervisor_mut()
    }

    /// Consume events one at a time until the channel closes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<InboundEnvelope>) -> Self {
        info!("Control loop running");
        while let Some(envelope) = rx.recv().await {
            let sequence = envelope.sequence;
            self.handle(envelope.event).await;

            if let Some(cursor) = &self.cursor {
                if let Err(e) = cursor.save(sequence + 1).await {
                    warn!(sequence, error = %e, "Failed to persist resume cursor");
                }
            }
        }
        info!("Inbound channel closed, control loop stopping");
        self
    }

    /// Handle one event to completion. Failures are reported to the
    /// originating owner and never escape.
    pub async fn handle(&mut self, event: InboundEvent) {
        let owner_id = event.owner_id();
        debug!(owner_id, kind = event.kind(), "Handling inbound event");

        let result = match event {
            InboundEvent::Text(text) => self.handle_text(text.owner_id, &text.text).await,
            InboundEvent::Document(doc) => self.handle_document(doc).await,
            InboundEvent::DocumentFailed(failed) => self.handle_document_failed(failed).await,
            InboundEvent::Action(action) => {
                self.handle_action(action.owner_id, action.action).await
            }
        };

        if let Err(e) = result {
            match &e {
                ControlPlaneError::QuotaExceeded { .. } => {
                    info!(owner_id, error = %e, "Upload denied by quota");
                    self.metrics.record_quota_denied();
                }
                ControlPlaneError::StorageError(_) | ControlPlaneError::Core(_) => {
                    error!(owner_id, code = e.error_code(), error = %e, "Event handling failed")
                }
                _ => warn!(owner_id, code = e.error_code(), error = %e, "Event rejected"),
            }
            self.delivery.send(owner_id, &e.user_message()).await;
        }

        let running = self.instances.running_count();
        self.metrics.set_running_instances(running);
        debug!(
            running,
            pending_interactions = self.interactions.pending_count(),
            "Event handled"
        );
    }

    fn is_operator(&self, owner_id: OwnerId) -> bool {
        owner_id == self.operator_id
    }

    fn require_operator(&self, owner_id: OwnerId, what: &str) -> ControlPlaneResult<()> {
        if self.is_operator(owner_id) {
            Ok(())
        } else {
            Err(ControlPlaneError::PermissionDenied(format!(
                "{what} requested by {owner_id}"
            )))
        }
    }

    async fn handle_text(&mut self, owner_id: OwnerId, text: &str) -> ControlPlaneResult<()> {
        if let Some(pending) = self.interactions.take_pending_text(owner_id) {
            self.require_operator(owner_id, "pending operator action")?;
            return self.complete_pending_text(owner_id, pending, text).await;
        }

        let text = text.trim();
        let (command, argument) = match text.split_once(char::is_whitespace) {
            Some((command, argument)) => (command, argument.trim()),
            None => (text, ""),
        };

        match command {
            "/start" | "/panel" => self.show_panel(owner_id).await,
            "/cmd" => {
                self.require_operator(owner_id, "/cmd")?;
                self.run_operator_command(owner_id, argument).await
            }
            "/allcmd" => {
                self.require_operator(owner_id, "/allcmd")?;
                self.run_fleet_command(owner_id, argument).await
            }
            "/metrics" => {
                self.require_operator(owner_id, "/metrics")?;
                let rendered = self.metrics.render_metrics()?;
                self.delivery
                    .send_long_text_or_file(owner_id, "Metrics", &rendered)
                    .await;
                Ok(())
            }
            _ => {
                debug!(owner_id, "Ignoring unrecognized text");
                Ok(())
            }
        }
    }

    async fn complete_pending_text(
        &mut self,
        owner_id: OwnerId,
        pending: PendingText,
        text: &str,
    ) -> ControlPlaneResult<()> {
        match pending {
            PendingText::Broadcast => {
                let tenants = self.plans.tenants();
                let message = format!("📢 Broadcast:\n\n{text}");
                for (tenant, _) in &tenants {
                    self.delivery.send(*tenant, &message).await;
                }
                info!(recipients = tenants.len(), "Broadcast sent");
                self.delivery
                    .send(
                        owner_id,
                        &format!("✅ Broadcast sent to {} tenants.", tenants.len()),
                    )
                    .await;
                Ok(())
            }
            PendingText::PlanChange { op, tier } => {
                let target = text.trim().parse::<OwnerId>().map_err(|_| {
                    ControlPlaneError::MalformedInput("Invalid user id.".to_string())
                })?;
                let applied = self.plans.apply(op, tier, target).await?;
                let reply = match op {
                    PlanOp::Grant => format!("✅ Granted {applied} to {target}"),
                    PlanOp::Revoke => format!("✅ Revoked {tier} for {target} (now {applied})"),
                };
                self.delivery.send(owner_id, &reply).await;
                Ok(())
            }
        }
    }

    async fn handle_document(&mut self, doc: DocumentEvent) -> ControlPlaneResult<()> {
        let owner_id = doc.owner_id;
        if !self.interactions.take_upload(owner_id) {
            self.delivery
                .send(
                    owner_id,
                    "📂 Choose Upload Bot from the panel before sending a file.",
                )
                .await;
            return Ok(());
        }

        let tier = self.plans.tier_of(owner_id);
        let prepared = self
            .instances
            .prepare_upload(owner_id, tier, &doc.filename, doc.content)
            .await?;

        self.delivery
            .send(
                owner_id,
                &format!("✅ Uploaded as {}, starting...", prepared.instance_id),
            )
            .await;

        let launched = self.instances.launch(&prepared).await;
        if let Err(e) = self.plans.register(owner_id).await {
            warn!(owner_id, error = %e, "Failed to persist new tenant");
        }

        match launched {
            Ok(pid) => {
                self.metrics.record_start(true);
                self.delivery
                    .send(
                        owner_id,
                        &format!("🚀 {} is running (pid {pid})", prepared.instance_id),
                    )
                    .await;
                Ok(())
            }
            Err(e) => {
                self.metrics.record_start(false);
                Err(e)
            }
        }
    }

    async fn handle_document_failed(&mut self, failed: DocumentFailedEvent) -> ControlPlaneResult<()> {
        let owner_id = failed.owner_id;
        if self.interactions.take_upload(owner_id) {
            warn!(
                owner_id,
                filename = %failed.filename,
                reason = %failed.reason,
                "Upload could not be fetched"
            );
            self.delivery
                .send(owner_id, "❌ Failed to download file.")
                .await;
        }
        Ok(())
    }

    async fn handle_action(&mut self, owner_id: OwnerId, action: Action) -> ControlPlaneResult<()> {
        if action.requires_operator() {
            self.require_operator(owner_id, &action.tag())?;
        }

        match action {
            Action::ShowPanel => self.show_panel(owner_id).await,
            Action::InitiateUpload => {
                self.interactions.begin_upload(owner_id);
                self.delivery
                    .send(owner_id, "📂 Please send me a ZIP file (upload document now).")
                    .await;
                Ok(())
            }
            Action::ListInstances => {
                let owned = self.instances.list_owned(owner_id)?;
                let text = if owned.is_empty() {
                    "❌ You have no hosted bots.".to_string()
                } else {
                    render_instances("📋 Your bots:", &owned, true)
                };
                self.delivery.send(owner_id, &text).await;
                Ok(())
            }
            Action::ListAllInstances => {
                let all = self.instances.list_all()?;
                if all.is_empty() {
                    self.delivery.send(owner_id, "No bots uploaded yet.").await;
                } else {
                    let text = render_instances("🛠 All bots:", &all, false);
                    self.delivery
                        .send_long_text_or_file(owner_id, "All Bots", &text)
                        .await;
                }
                Ok(())
            }
            Action::Stop(instance_id) => {
                let reply = match self.instances.stop(owner_id, &instance_id).await? {
                    StopOutcome::Stopped => format!("⛔ Stopped {instance_id}"),
                    StopOutcome::NotRunning => format!("ℹ️ {instance_id} was not running"),
                };
                self.delivery.send(owner_id, &reply).await;
                Ok(())
            }
            Action::Restart(instance_id) => {
                match self.instances.restart(owner_id, &instance_id).await {
                    Ok(pid) => {
                        self.metrics.record_start(true);
                        self.delivery
                            .send(owner_id, &format!("🔄 Restarted {instance_id} (pid {pid})"))
                            .await;
                        Ok(())
                    }
                    Err(e) => {
                        if matches!(e, ControlPlaneError::Core(CoreError::LaunchError(_))) {
                            self.metrics.record_start(false);
                        }
                        Err(e)
                    }
                }
            }
            Action::ViewLogs(instance_id) => {
                let lines = match self
                    .instances
                    .tail_log(owner_id, &instance_id, self.log_tail_lines)
                    .await
                {
                    Ok(lines) => lines,
                    Err(ControlPlaneError::Core(CoreError::InstanceNotFound(_))) => {
                        self.delivery.send(owner_id, "❌ No logs found.").await;
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };
                let title = format!("📜 Last {} lines of {instance_id}:", self.log_tail_lines);
                let body = format!(
                    "{}\n\n(full log: logfile:{instance_id})",
                    lines.join("\n")
                );
                self.delivery
                    .send_long_text_or_file(owner_id, &title, &body)
                    .await;
                Ok(())
            }
            Action::FullLog(instance_id) => {
                match self.instances.full_log_path(owner_id, &instance_id) {
                    Ok(path) => {
                        self.delivery
                            .send_file(owner_id, &path, &format!("{instance_id}.log"))
                            .await;
                        Ok(())
                    }
                    Err(ControlPlaneError::Core(CoreError::InstanceNotFound(_))) => {
                        self.delivery.send(owner_id, "❌ No logs found.").await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Action::KillAll => {
                let stopped = self.instances.kill_all().await;
                self.delivery
                    .send(owner_id, &format!("💀 Stopped {stopped} running bots."))
                    .await;
                Ok(())
            }
            Action::ListTenants => {
                let tenants = self.plans.tenants();
                let text = if tenants.is_empty() {
                    "No users with plans yet.".to_string()
                } else {
                    let lines: Vec<String> = tenants
                        .iter()
                        .map(|(owner, tier)| format!("{owner} -> {tier}"))
                        .collect();
                    format!("All users:\n{}", lines.join("\n"))
                };
                self.delivery
                    .send_long_text_or_file(owner_id, "All Users", &text)
                    .await;
                Ok(())
            }
            Action::InitiateBroadcast => {
                self.interactions
                    .begin_text(owner_id, PendingText::Broadcast);
                self.delivery
                    .send(owner_id, "📢 Now send the broadcast message as text.")
                    .await;
                Ok(())
            }
            Action::PlanMenu => {
                let mut entries = Vec::new();
                for op in [PlanOp::Grant, PlanOp::Revoke] {
                    for tier in [Tier::Premium, Tier::Vip] {
                        let action = Action::InitiatePlanChange { op, tier };
                        entries.push((format!("{op} {tier}"), action.tag()));
                    }
                }
                self.delivery
                    .send(owner_id, &render_menu("👑 Manage Plans", &entries))
                    .await;
                Ok(())
            }
            Action::InitiatePlanChange { op, tier } => {
                self.interactions
                    .begin_text(owner_id, PendingText::PlanChange { op, tier });
                self.delivery
                    .send(
                        owner_id,
                        &format!("📌 Reply with the user ID to {op} {tier}."),
                    )
                    .await;
                Ok(())
            }
            Action::Noop => Ok(()),
        }
    }

    async fn show_panel(&mut self, owner_id: OwnerId) -> ControlPlaneResult<()> {
        let text = if self.is_operator(owner_id) {
            let entries: Vec<(String, String)> = [
                ("📋 All Users", Action::ListTenants),
                ("🛠 All Bots", Action::ListAllInstances),
                ("💀 Kill All", Action::KillAll),
                ("📢 Broadcast", Action::InitiateBroadcast),
                ("👑 Manage Plans", Action::PlanMenu),
            ]
            .into_iter()
            .map(|(label, action)| (label.to_string(), action.tag()))
            .collect();
            render_menu("👑 Operator Panel", &entries)
        } else {
            let tier = self.plans.tier_of(owner_id);
            let entries = vec![
                ("📂 Upload Bot".to_string(), Action::InitiateUpload.tag()),
                ("📋 My Bots".to_string(), Action::ListInstances.tag()),
                (
                    format!("⭐ Plan: {}", tier.as_str().to_uppercase()),
                    Action::Noop.tag(),
                ),
            ];
            render_menu("🛠 User Panel", &entries)
        };
        self.delivery.send(owner_id, &text).await;
        Ok(())
    }

    async fn run_operator_command(
        &mut self,
        owner_id: OwnerId,
        command: &str,
    ) -> ControlPlaneResult<()> {
        if command.is_empty() {
            self.delivery
                .send(owner_id, "❌ Usage: /cmd <command>")
                .await;
            return Ok(());
        }

        let outcome = self.instances.run_command(&self.data_dir, command).await;
        let timeout = self.instances.supervisor().fleet().timeout();
        self.delivery
            .send_long_text_or_file(owner_id, "CMD Output", &outcome.render(timeout))
            .await;
        Ok(())
    }

    async fn run_fleet_command(&mut self, owner_id: OwnerId, command: &str) -> ControlPlaneResult<()> {
        if command.is_empty() {
            self.delivery
                .send(owner_id, "❌ Usage: /allcmd <command>")
                .await;
            return Ok(());
        }

        let report = self.instances.run_fleet_command(command).await?;
        self.metrics.record_fleet_report(&report);
        let limit = self.instances.supervisor().fleet_output_limit();
        self.delivery
            .send_long_text_or_file(owner_id, "ALLCMD Output", &report.render(limit))
            .await;
        Ok(())
    }
}

fn render_menu(title: &str, entries: &[(String, String)]) -> String {
    let mut text = format!("{title}\n");
    for (label, tag) in entries {
        text.push_str(&format!("\n{label} [{tag}]"));
    }
    text
}

fn render_instances(title: &str, instances: &[InstanceMetadata], with_actions: bool) -> String {
    let mut text = title.to_string();
    for instance in instances {
        text.push_str(&format!("\n• {} ({})", instance.instance_id, instance.status));
        if with_actions {
            let id = &instance.instance_id;
            text.push_str(&format!(
                "\n  [{}] [{}] [{}]",
                Action::Restart(id.clone()).tag(),
                Action::Stop(id.clone()).tag(),
                Action::ViewLogs(id.clone()).tag()
            ));
        }
    }
    text
}
