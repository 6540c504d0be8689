//! Rebuilds a transfer's file from the broker's retained messages.
//!
//! The reconstructor reads the metadata topic until it finds the transfer's
//! descriptor, buffers chunk messages by sequence number in whatever order
//! they arrive, writes them out in order and verifies the whole-file digest.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use filestream_broker::{Broker, Record, StartPosition, Subscription};
use filestream_protocol::constants::{CHUNK_TOPIC, METADATA_TOPIC};
use filestream_protocol::{ChunkMessage, MetadataMessage, TransferMetadata, TransferStatus};
use filestream_transfer::{
    ReassemblyBuffer, TransferRegistry, calculate_file_digest, validate_filename,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::storage::StorageLayout;

pub struct Reconstructor {
    broker: Arc<dyn Broker>,
    registry: Arc<dyn TransferRegistry>,
    storage: StorageLayout,
    metadata_timeout: Duration,
    chunk_timeout: Duration,
}

impl Reconstructor {
    pub fn new(
        broker: Arc<dyn Broker>,
        registry: Arc<dyn TransferRegistry>,
        storage: StorageLayout,
        metadata_timeout: Duration,
        chunk_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            registry,
            storage,
            metadata_timeout,
            chunk_timeout,
        }
    }

    /// Reconstructs `transfer_id` and records the outcome.
    ///
    /// Success marks the transfer `download_completed` together with its
    /// output path. Any failure marks it `download_failed`.
    pub async fn run(&self, transfer_id: &str, cancel: CancellationToken) {
        self.registry
            .set_status(transfer_id, TransferStatus::Reconstructing, None);

        match self.reconstruct(transfer_id, &cancel).await {
            Ok(path) => {
                info!(transfer_id, path = %path.display(), "reconstruction completed");
                self.registry.complete_download(transfer_id, path);
            }
            Err(e) => {
                warn!(transfer_id, error = %e, "reconstruction failed");
                self.registry.set_status(
                    transfer_id,
                    TransferStatus::DownloadFailed,
                    Some(e.to_string()),
                );
            }
        }
    }

    /// Reads the transfer back from the broker and writes the verified file.
    /// Returns the output path.
    ///
    /// Both subscriptions are closed before this returns, whatever the outcome.
    pub async fn reconstruct(
        &self,
        transfer_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, PipelineError> {
        let bookmark = self.registry.get(transfer_id)?.bookmark;
        let metadata_start = bookmark.map_or(StartPosition::Earliest, |b| {
            StartPosition::Offset(b.metadata_offset)
        });
        let chunk_start = bookmark
            .and_then(|b| b.first_chunk_offset)
            .map_or(StartPosition::Earliest, StartPosition::Offset);

        let mut metadata_sub = self.broker.subscribe(METADATA_TOPIC, metadata_start).await?;
        let mut chunk_sub = match self.broker.subscribe(CHUNK_TOPIC, chunk_start).await {
            Ok(sub) => sub,
            Err(e) => {
                metadata_sub.close();
                return Err(e.into());
            }
        };

        let result = self
            .collect(transfer_id, metadata_sub.as_mut(), chunk_sub.as_mut(), cancel)
            .await;

        metadata_sub.close();
        chunk_sub.close();
        result
    }

    async fn collect(
        &self,
        transfer_id: &str,
        metadata_sub: &mut dyn Subscription,
        chunk_sub: &mut dyn Subscription,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, PipelineError> {
        let metadata = self.await_metadata(transfer_id, metadata_sub, cancel).await?;
        validate_filename(&metadata.filename)?;

        let mut buffer = ReassemblyBuffer::new(metadata.total_chunks);
        // Only this transfer's chunks extend the wait.
        let mut deadline = Instant::now() + self.chunk_timeout;
        while !buffer.is_complete() {
            let Some(record) = next_before(chunk_sub, deadline, cancel).await? else {
                let missing = buffer.missing();
                return Err(PipelineError::ChunkTimeout {
                    timeout: self.chunk_timeout,
                    received: buffer.received(),
                    total: buffer.total_chunks(),
                    first_missing: missing.first().copied().unwrap_or_default(),
                    missing: missing.len() as u64,
                });
            };
            if !keyed_for(&record, transfer_id) {
                continue;
            }
            let chunk = match ChunkMessage::decode(&record.payload) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(transfer_id, offset = record.offset, error = %e, "discarding undecodable chunk");
                    continue;
                }
            };
            if chunk.file_id != transfer_id {
                continue;
            }
            if let Err(e) = buffer.insert(chunk.chunk_number, chunk.data) {
                warn!(transfer_id, offset = record.offset, error = %e, "discarding chunk");
                continue;
            }
            deadline = Instant::now() + self.chunk_timeout;
            debug!(
                transfer_id,
                sequence = chunk.chunk_number,
                received = buffer.received(),
                total = buffer.total_chunks(),
                "chunk buffered"
            );
        }

        let path = self.storage.output_path(transfer_id, &metadata.filename);
        let written = buffer.write_ordered(&path).await?;
        drop(buffer);

        let digest = tokio::task::spawn_blocking({
            let path = path.clone();
            move || calculate_file_digest(&path)
        })
        .await
        .map_err(|e| std::io::Error::other(format!("task join error: {e}")))??;

        if !digest.eq_ignore_ascii_case(&metadata.md5_hash) {
            warn!(
                transfer_id,
                expected = %metadata.md5_hash,
                actual = %digest,
                "digest mismatch"
            );
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "failed to remove mismatched output");
            }
            return Err(PipelineError::DigestMismatch);
        }

        debug!(transfer_id, bytes = written, "output verified");
        Ok(path)
    }

    /// Scans the metadata topic for `transfer_id`. The whole scan is bounded
    /// by `metadata_timeout`, however many unrelated messages arrive.
    async fn await_metadata(
        &self,
        transfer_id: &str,
        sub: &mut dyn Subscription,
        cancel: &CancellationToken,
    ) -> Result<TransferMetadata, PipelineError> {
        let deadline = Instant::now() + self.metadata_timeout;
        loop {
            let Some(record) = next_before(sub, deadline, cancel).await? else {
                return Err(PipelineError::MetadataTimeout(self.metadata_timeout));
            };
            if !keyed_for(&record, transfer_id) {
                continue;
            }
            match MetadataMessage::decode(&record.payload) {
                Ok(msg) if msg.file_id == transfer_id => {
                    debug!(transfer_id, offset = record.offset, chunks = msg.total_chunks, "metadata found");
                    return Ok(msg.metadata());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(offset = record.offset, error = %e, "discarding undecodable metadata");
                }
            }
        }
    }
}

/// Waits for the next record until `deadline`. Returns `None` on expiry.
async fn next_before(
    sub: &mut dyn Subscription,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<Option<Record>, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = tokio::time::timeout_at(deadline, sub.next()) => match result {
            Ok(record) => Ok(Some(record?)),
            Err(_) => Ok(None),
        }
    }
}

/// Records keyed for another transfer are skipped without decoding.
fn keyed_for(record: &Record, transfer_id: &str) -> bool {
    record.key.as_deref().is_none_or(|k| k == transfer_id)
}
