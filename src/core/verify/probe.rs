//! Probe submission into the mail queue.
//!
//! A probe is a routing-only message: the queue manager resolves the
//! recipient and reports the outcome back through the verifier's UPDATE
//! request, but the message itself is never delivered. Submission sits
//! behind a trait so the cache policy can be tested without a queue.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("cannot queue probe for {recipient}: {source}")]
    Queue {
        recipient: String,
        #[source]
        source: std::io::Error,
    },
}

/// Synchronous probe submission; `Ok(())` means the probe was queued.
#[async_trait]
pub trait ProbeSubmitter: Send + Sync {
    async fn submit_probe(&self, sender: &str, recipient: &str) -> Result<(), ProbeError>;
}

/// Writes one queue file per probe into `<queue>/incoming`.
///
/// Files carry the envelope plus a `verify` request flag and a no-rewrite
/// marker, and become visible atomically (temp + rename) so the queue
/// manager never reads a partial envelope.
pub struct QueueSubmitter {
    incoming: PathBuf,
}

impl QueueSubmitter {
    pub fn new(queue_directory: &Path) -> Self {
        Self {
            incoming: queue_directory.join("incoming"),
        }
    }
}

#[async_trait]
impl ProbeSubmitter for QueueSubmitter {
    async fn submit_probe(&self, sender: &str, recipient: &str) -> Result<(), ProbeError> {
        let queue_err = |source| ProbeError::Queue {
            recipient: recipient.to_string(),
            source,
        };

        tokio::fs::create_dir_all(&self.incoming)
            .await
            .map_err(queue_err)?;

        // Null sender travels as the literal <>.
        let envelope_sender = if sender.is_empty() { "<>" } else { sender };
        let envelope = format!(
            "sender={envelope_sender}\nrecipient={recipient}\nflags=verify\nrewrite=none\n"
        );

        let id = Uuid::new_v4().simple().to_string();
        let tmp = self.incoming.join(format!(".{id}.tmp"));
        let path = self.incoming.join(id);
        tokio::fs::write(&tmp, envelope.as_bytes())
            .await
            .map_err(queue_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(queue_err)?;
        Ok(())
    }
}
