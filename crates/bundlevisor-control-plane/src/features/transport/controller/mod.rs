//! Stdio transport adapter: JSON lines in, normalized events out.

use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use crate::shared::types::InboundEnvelope;
use bundlevisor_core::{
    Action, ActionEvent, DocumentEvent, DocumentFailedEvent, InboundEvent, OwnerId, TextEvent,
};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundLine {
    Text {
        update_id: u64,
        owner_id: OwnerId,
        text: String,
    },
    Document {
        update_id: u64,
        owner_id: OwnerId,
        filename: String,
        path: PathBuf,
    },
    Action {
        update_id: u64,
        owner_id: OwnerId,
        action: String,
    },
}

impl InboundLine {
    fn update_id(&self) -> u64 {
        match self {
            InboundLine::Text { update_id, .. }
            | InboundLine::Document { update_id, .. }
            | InboundLine::Action { update_id, .. } => *update_id,
        }
    }
}

/// Parse one inbound line. Unknown action tags yield `Ok(None)`.
pub async fn parse_line(line: &str) -> ControlPlaneResult<Option<InboundEnvelope>> {
    let record: InboundLine = serde_json::from_str(line)
        .map_err(|e| ControlPlaneError::MalformedInput(format!("bad inbound line: {e}")))?;
    into_envelope(record).await
}

async fn into_envelope(record: InboundLine) -> ControlPlaneResult<Option<InboundEnvelope>> {
    let sequence = record.update_id();
    let event = match record {
        InboundLine::Text { owner_id, text, .. } => {
            InboundEvent::Text(TextEvent { owner_id, text })
        }
        InboundLine::Document {
            owner_id,
            filename,
            path,
            ..
        } => {
            match tokio::fs::read(&path).await {
                Ok(content) => InboundEvent::Document(DocumentEvent {
                    owner_id,
                    filename,
                    content,
                }),
                Err(e) => {
                    warn!(owner_id, path = %path.display(), error = %e, "Cannot fetch uploaded document");
                    InboundEvent::DocumentFailed(DocumentFailedEvent {
                        owner_id,
                        filename,
                        reason: e.to_string(),
                    })
                }
            }
        }
        InboundLine::Action {
            owner_id, action, ..
        } => match action.parse::<Action>() {
            Ok(action) => InboundEvent::Action(ActionEvent { owner_id, action }),
            Err(e) => {
                debug!(owner_id, error = %e, "Ignoring unknown action tag");
                return Ok(None);
            }
        },
    };
    Ok(Some(InboundEnvelope { sequence, event }))
}

/// Forward events from `reader` into `tx`, skipping anything before
/// `resume_from`. Returns the number of events forwarded.
pub async fn read_events<R>(
    reader: R,
    tx: mpsc::Sender<InboundEnvelope>,
    resume_from: u64,
) -> ControlPlaneResult<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ControlPlaneError::Transport(e.to_string()))?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: InboundLine = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Dropping malformed inbound line");
                continue;
            }
        };
        if record.update_id() < resume_from {
            debug!(update_id = record.update_id(), resume_from, "Skipping already processed event");
            continue;
        }

        let envelope = match into_envelope(record).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "Dropping inbound event");
                continue;
            }
        };

        if tx.send(envelope).await.is_err() {
            info!("Control loop closed, stopping inbound reader");
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}
