pub mod event;
pub mod interaction;
pub mod run_spec;
pub mod tenant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

pub use event::{
    Action, ActionEvent, DocumentEvent, DocumentFailedEvent, InboundEvent, TextEvent,
};
pub use interaction::{InteractionState, PendingText, PlanOp};
pub use run_spec::{ExecutionMode, RunSpec};
pub use tenant::{instance_id_for, owner_of, OwnerId, QuotaDecision, Tier};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("No runnable entry point found in {0}")]
    ResolutionError(String),
    #[error("Failed to launch instance: {0}")]
    LaunchError(String),
    #[error("Instance already running: {0}")]
    AlreadyRunning(String),
    #[error("Instance did not stop and could not be killed: {0}")]
    StopTimeout(String),
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::ResolutionError(_) => "RESOLUTION_ERROR",
            CoreError::LaunchError(_) => "LAUNCH_ERROR",
            CoreError::AlreadyRunning(_) => "ALREADY_RUNNING",
            CoreError::StopTimeout(_) => "STOP_TIMEOUT",
            CoreError::InstanceNotFound(_) => "INSTANCE_NOT_FOUND",
            CoreError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Stopped,
    FailedToStart,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            InstanceStatus::Running => "running",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::FailedToStart => "failed to start",
        };
        f.write_str(label)
    }
}

/// Snapshot of one supervised bundle as seen by the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceMetadata {
    pub instance_id: String,
    pub owner_id: Option<OwnerId>,
    pub working_directory: PathBuf,
    pub log_path: PathBuf,
    pub run_spec: Option<RunSpec>,
    pub status: InstanceStatus,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub event_type: String,
    pub instance_id: String,
    pub timestamp: DateTime<Utc>,
    pub details: Option<HashMap<String, String>>,
}

impl ExecutionEvent {
    pub fn new(event_type: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            instance_id: instance_id.into(),
            timestamp: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.details = Some(details);
        self
    }

    fn with_detail(self, key: &str, value: impl Into<String>) -> Self {
        let mut details = HashMap::new();
        details.insert(key.to_string(), value.into());
        self.with_details(details)
    }
}

/// Execution event recorder for tracking instance lifecycle facts
#[derive(Debug, Default)]
pub struct ExecutionEventRecorder {
    events: Vec<ExecutionEvent>,
}

impl ExecutionEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, event: ExecutionEvent) {
        self.events.push(event);
    }

    pub fn record_start(&mut self, instance_id: &str, pid: u32) {
        self.record_event(
            ExecutionEvent::new("instance_started", instance_id).with_detail("pid", pid.to_string()),
        );
    }

    pub fn record_launch_failure(&mut self, instance_id: &str, error: &str) {
        self.record_event(
            ExecutionEvent::new("instance_launch_failed", instance_id).with_detail("error", error),
        );
    }

    pub fn record_stop(&mut self, instance_id: &str) {
        self.record_event(ExecutionEvent::new("instance_stopped", instance_id));
    }

    pub fn record_kill(&mut self, instance_id: &str) {
        self.record_event(ExecutionEvent::new("instance_killed", instance_id));
    }

    pub fn record_exit(&mut self, instance_id: &str, exit_code: Option<i32>) {
        let code = exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        self.record_event(
            ExecutionEvent::new("instance_exited", instance_id).with_detail("exit_code", code),
        );
    }

    pub fn record_restart(&mut self, instance_id: &str) {
        self.record_event(ExecutionEvent::new("instance_restarted", instance_id));
    }

    pub fn get_events(&self) -> &[ExecutionEvent] {
        &self.events
    }

    pub fn get_events_for_instance(&self, instance_id: &str) -> Vec<&ExecutionEvent> {
        self.events
            .iter()
            .filter(|e| e.instance_id == instance_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            CoreError::ResolutionError("b".into()).error_code(),
            "RESOLUTION_ERROR"
        );
        assert_eq!(CoreError::LaunchError("b".into()).error_code(), "LAUNCH_ERROR");
        assert_eq!(
            CoreError::InstanceNotFound("b".into()).error_code(),
            "INSTANCE_NOT_FOUND"
        );
    }

    #[test]
    fn test_error_messages() {
        let err = CoreError::ResolutionError("/srv/bundles/1_ab".to_string());
        assert!(err.to_string().contains("No runnable entry point"));
        let err = CoreError::StopTimeout("1_ab".to_string());
        assert!(err.to_string().contains("could not be killed"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CoreError = io.into();
        assert_eq!(err.error_code(), "IO_ERROR");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(InstanceStatus::Running.to_string(), "running");
        assert_eq!(InstanceStatus::FailedToStart.to_string(), "failed to start");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&InstanceStatus::FailedToStart).unwrap();
        assert_eq!(json, "\"failed_to_start\"");
    }

    #[test]
    fn test_event_recorder_lifecycle_order() {
        let mut recorder = ExecutionEventRecorder::new();
        recorder.record_start("1_a", 42);
        recorder.record_exit("1_a", Some(0));
        recorder.record_start("2_b", 43);
        recorder.record_restart("1_a");

        let events = recorder.get_events_for_instance("1_a");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, "instance_started");
        assert_eq!(
            events[0].details.as_ref().unwrap().get("pid").map(String::as_str),
            Some("42")
        );
        assert_eq!(events[1].event_type, "instance_exited");
        assert_eq!(events[2].event_type, "instance_restarted");
        assert_eq!(recorder.get_events().len(), 4);
    }

    #[test]
    fn test_event_recorder_exit_by_signal() {
        let mut recorder = ExecutionEventRecorder::new();
        recorder.record_exit("1_a", None);
        let details = recorder.get_events()[0].details.clone().unwrap();
        assert_eq!(details.get("exit_code").map(String::as_str), Some("signal"));
    }

    #[test]
    fn test_event_recorder_timestamps_monotonic() {
        let mut recorder = ExecutionEventRecorder::new();
        recorder.record_start("1_a", 1);
        std::thread::sleep(std::time::Duration::from_millis(2));
        recorder.record_stop("1_a");

        let events = recorder.get_events();
        assert!(events[0].timestamp <= events[1].timestamp);
    }
}
