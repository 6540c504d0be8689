//! Publishes a staged file to the broker as one metadata message followed by
//! its chunks, one acknowledged chunk at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use filestream_broker::{Broker, publish_json};
use filestream_protocol::constants::{CHUNK_TOPIC, METADATA_TOPIC};
use filestream_protocol::{ChunkMessage, MetadataMessage, TransferMetadata};
use filestream_transfer::{Bookmark, ChunkReader, TransferRegistry, calculate_file_digest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PipelineError;

/// Uploads one file per call to [`Uploader::run`].
pub struct Uploader {
    broker: Arc<dyn Broker>,
    registry: Arc<dyn TransferRegistry>,
    chunk_size: usize,
    ack_timeout: Duration,
}

impl Uploader {
    pub fn new(
        broker: Arc<dyn Broker>,
        registry: Arc<dyn TransferRegistry>,
        chunk_size: usize,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            registry,
            chunk_size,
            ack_timeout,
        }
    }

    /// Uploads `source` for `transfer_id` and records the outcome.
    ///
    /// Any failure marks the transfer `failed` with the error message.
    /// Nothing is retried.
    pub async fn run(&self, transfer_id: &str, source: &Path, cancel: CancellationToken) {
        match self.ingest(transfer_id, source, &cancel).await {
            Ok(chunks) => info!(transfer_id, chunks, "upload completed"),
            Err(e) => {
                warn!(transfer_id, error = %e, "upload failed");
                self.registry.fail_upload(transfer_id, e.to_string());
            }
        }
    }

    /// Hashes `source`, publishes its metadata and then every chunk, waiting
    /// for each acknowledgment before reading the next chunk. Returns the
    /// number of chunks published.
    pub async fn ingest(
        &self,
        transfer_id: &str,
        source: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, PipelineError> {
        check_cancelled(cancel)?;
        let filename = self.registry.get(transfer_id)?.filename;

        let md5_hash = tokio::task::spawn_blocking({
            let path = source.to_path_buf();
            move || calculate_file_digest(&path)
        })
        .await
        .map_err(|e| std::io::Error::other(format!("task join error: {e}")))??;

        let mut reader = ChunkReader::open(source, self.chunk_size).await?;
        let total = reader.total_chunks();
        let metadata = TransferMetadata {
            filename,
            file_size: reader.file_size(),
            total_chunks: total,
            chunk_size: reader.chunk_size(),
            md5_hash,
            created_at: Utc::now().to_rfc3339(),
        };
        self.registry.set_metadata(transfer_id, metadata.clone());

        debug!(
            transfer_id,
            file_size = metadata.file_size,
            chunks = total,
            digest = %metadata.md5_hash,
            "publishing metadata"
        );
        let ack = self
            .publish(METADATA_TOPIC, transfer_id, &MetadataMessage::new(transfer_id, &metadata), cancel)
            .await?;
        let mut bookmark = Bookmark {
            metadata_offset: ack.offset,
            first_chunk_offset: None,
        };
        self.registry.set_bookmark(transfer_id, bookmark);

        if total == 0 {
            self.registry.complete_upload(transfer_id);
            return Ok(0);
        }

        loop {
            check_cancelled(cancel)?;
            let Some(chunk) = reader.next_chunk().await? else {
                break;
            };
            let sequence = chunk.sequence;
            let msg = ChunkMessage::new(transfer_id, sequence, total, chunk.data);
            let ack = self.publish(CHUNK_TOPIC, transfer_id, &msg, cancel).await?;

            if sequence == 0 {
                bookmark.first_chunk_offset = Some(ack.offset);
                self.registry.set_bookmark(transfer_id, bookmark);
            }
            if sequence + 1 == total {
                self.registry.complete_upload(transfer_id);
            } else {
                self.registry.increment_progress(transfer_id);
            }
            debug!(transfer_id, sequence, offset = ack.offset, "chunk acknowledged");
        }

        Ok(total)
    }

    async fn publish<T: serde::Serialize>(
        &self,
        topic: &str,
        key: &str,
        message: &T,
        cancel: &CancellationToken,
    ) -> Result<filestream_broker::Ack, PipelineError> {
        Ok(publish_json(self.broker.as_ref(), topic, key, message, self.ack_timeout, cancel).await?)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Removes a staged upload once its task has finished.
pub(crate) async fn discard_staged(path: PathBuf) {
    match tokio::fs::remove_file(&path).await {
        Ok(()) => debug!(path = %path.display(), "staged upload removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staged upload"),
    }
}
