pub use bundlevisor_core::{
    Action, InboundEvent, InstanceMetadata, InstanceStatus, InteractionState, OwnerId,
    PendingText, PlanOp, Tier,
};
use std::path::PathBuf;

/// An inbound event tagged with its position in the transport stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEnvelope {
    pub sequence: u64,
    pub event: InboundEvent,
}

/// Outbound delivery as handed to a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Text {
        recipient: OwnerId,
        content: String,
    },
    File {
        recipient: OwnerId,
        path: PathBuf,
        suggested_name: String,
        content: Vec<u8>,
    },
}

impl Notification {
    pub fn recipient(&self) -> OwnerId {
        match self {
            Notification::Text { recipient, .. } | Notification::File { recipient, .. } => {
                *recipient
            }
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Notification::Text { content, .. } => Some(content),
            Notification::File { .. } => None,
        }
    }
}
