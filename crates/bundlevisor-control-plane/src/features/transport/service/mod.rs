use crate::features::transport::repo::Notifier;
use crate::shared::error::ControlPlaneResult;
use bundlevisor_core::OwnerId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Delivers control-plane output. Delivery failures are logged and
/// swallowed; they never reach core state.
pub struct DeliveryService {
    notifier: Arc<dyn Notifier>,
    outbox_dir: PathBuf,
    inline_limit: usize,
}

impl DeliveryService {
    pub fn new(notifier: Arc<dyn Notifier>, outbox_dir: impl Into<PathBuf>, inline_limit: usize) -> Self {
        Self {
            notifier,
            outbox_dir: outbox_dir.into(),
            inline_limit,
        }
    }

    pub async fn send(&self, recipient: OwnerId, content: &str) {
        if let Err(e) = self.notifier.notify(recipient, content).await {
            warn!(recipient, error = %e, "Failed to deliver message");
        }
    }

    pub async fn send_file(&self, recipient: OwnerId, path: &Path, suggested_name: &str) {
        if let Err(e) = self.notifier.notify_file(recipient, path, suggested_name).await {
            warn!(recipient, path = %path.display(), error = %e, "Failed to deliver file");
        }
    }

    /// Inline `text` under `title`, or ship it as `<title>.txt` when it is
    /// longer than the inline limit.
    pub async fn send_long_text_or_file(&self, recipient: OwnerId, title: &str, text: &str) {
        if text.chars().count() <= self.inline_limit {
            self.send(recipient, &format!("{title}\n{text}")).await;
            return;
        }

        match self.write_outbox(text).await {
            Ok(path) => {
                self.send_file(recipient, &path, &format!("{title}.txt"))
                    .await;
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    debug!(path = %path.display(), error = %e, "Failed to remove outbox file");
                }
            }
            Err(e) => {
                warn!(recipient, error = %e, "Failed to stage output file");
                self.send(recipient, &format!("❌ {title} could not be delivered: {e}"))
                    .await;
            }
        }
    }

    async fn write_outbox(&self, text: &str) -> ControlPlaneResult<PathBuf> {
        tokio::fs::create_dir_all(&self.outbox_dir).await?;
        let path = self.outbox_dir.join(format!("{}.txt", Uuid::new_v4()));
        tokio::fs::write(&path, text).await?;
        Ok(path)
    }
}
