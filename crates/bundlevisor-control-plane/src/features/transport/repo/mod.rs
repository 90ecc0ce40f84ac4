pub mod cursor;

use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use crate::shared::types::Notification;
use async_trait::async_trait;
use bundlevisor_core::OwnerId;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Outbound port to the messaging transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: OwnerId, content: &str) -> ControlPlaneResult<()>;

    /// Deliver the file at `path`. The file may be removed once this returns.
    async fn notify_file(
        &self,
        recipient: OwnerId,
        path: &Path,
        suggested_name: &str,
    ) -> ControlPlaneResult<()>;
}

/// Keeps every delivery in memory, for tests and dry runs.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// Text messages delivered to `recipient`, oldest first.
    pub fn texts_for(&self, recipient: OwnerId) -> Vec<String> {
        self.notifications()
            .into_iter()
            .filter(|n| n.recipient() == recipient)
            .filter_map(|n| n.text().map(str::to_string))
            .collect()
    }

    pub fn last_text_for(&self, recipient: OwnerId) -> Option<String> {
        self.texts_for(recipient).pop()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }

    fn push(&self, notification: Notification) -> ControlPlaneResult<()> {
        self.sent
            .lock()
            .map_err(|_| ControlPlaneError::Transport("Lock poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: OwnerId, content: &str) -> ControlPlaneResult<()> {
        self.push(Notification::Text {
            recipient,
            content: content.to_string(),
        })
    }

    async fn notify_file(
        &self,
        recipient: OwnerId,
        path: &Path,
        suggested_name: &str,
    ) -> ControlPlaneResult<()> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))?;
        self.push(Notification::File {
            recipient,
            path: path.to_path_buf(),
            suggested_name: suggested_name.to_string(),
            content,
        })
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutboundLine<'a> {
    Text {
        recipient: OwnerId,
        content: &'a str,
    },
    File {
        recipient: OwnerId,
        suggested_name: &'a str,
        content: String,
    },
}

/// Writes one JSON object per delivery. File contents are inlined.
pub struct JsonLinesNotifier<W> {
    writer: tokio::sync::Mutex<W>,
}

impl JsonLinesNotifier<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesNotifier<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    async fn write_line(&self, line: &OutboundLine<'_>) -> ControlPlaneResult<()> {
        let mut json =
            serde_json::to_vec(line).map_err(|e| ControlPlaneError::Transport(e.to_string()))?;
        json.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&json)
            .await
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Notifier for JsonLinesNotifier<W> {
    async fn notify(&self, recipient: OwnerId, content: &str) -> ControlPlaneResult<()> {
        self.write_line(&OutboundLine::Text { recipient, content })
            .await
    }

    async fn notify_file(
        &self,
        recipient: OwnerId,
        path: &Path,
        suggested_name: &str,
    ) -> ControlPlaneResult<()> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))?;
        self.write_line(&OutboundLine::File {
            recipient,
            suggested_name,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.notify(1, "first").await.unwrap();
        notifier.notify(2, "other").await.unwrap();
        notifier.notify(1, "second").await.unwrap();

        assert_eq!(notifier.texts_for(1), vec!["first", "second"]);
        assert_eq!(notifier.last_text_for(2).as_deref(), Some("other"));
        notifier.clear();
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_recording_notifier_captures_file_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "payload").unwrap();

        let notifier = RecordingNotifier::new();
        notifier.notify_file(3, &path, "CMD Output.txt").await.unwrap();
        std::fs::remove_file(&path).unwrap();

        match &notifier.notifications()[0] {
            Notification::File {
                suggested_name,
                content,
                ..
            } => {
                assert_eq!(suggested_name, "CMD Output.txt");
                assert_eq!(content, b"payload");
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_json_lines_notifier_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "line 1\n").unwrap();

        let notifier = JsonLinesNotifier::new(Vec::new());
        notifier.notify(9, "hello").await.unwrap();
        notifier.notify_file(9, &path, "1_a.log").await.unwrap();

        let out = String::from_utf8(notifier.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["type"], "text");
        assert_eq!(lines[0]["recipient"], 9);
        assert_eq!(lines[0]["content"], "hello");
        assert_eq!(lines[1]["type"], "file");
        assert_eq!(lines[1]["suggested_name"], "1_a.log");
        assert_eq!(lines[1]["content"], "line 1\n");
    }

    #[tokio::test]
    async fn test_missing_file_is_transport_error() {
        let notifier = JsonLinesNotifier::new(Vec::new());
        let err = notifier
            .notify_file(1, Path::new("/nonexistent/file.txt"), "x.txt")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "TRANSPORT_ERROR");
    }
}
