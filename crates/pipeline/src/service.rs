//! The transfer service: the operations an outer request layer exposes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use filestream_broker::Broker;
use filestream_protocol::TransferStatus;
use filestream_protocol::constants::STATUS_PATH;
use filestream_protocol::types::{MessageResponse, StatusResponse, TransferSummary, UploadResponse};
use filestream_transfer::{TransferError, TransferRegistry, validate_filename};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::reconstructor::Reconstructor;
use crate::retrieval::{self, FetchedFile};
use crate::storage::StorageLayout;
use crate::supervisor::{TaskKind, TaskSupervisor};
use crate::uploader::{Uploader, discard_staged};

/// Uploads, reconstructs, serves and deletes transfers.
///
/// Cloning is cheap; clones share the same registry and background tasks.
#[derive(Clone)]
pub struct TransferService {
    inner: Arc<Inner>,
}

struct Inner {
    config: PipelineConfig,
    broker: Arc<dyn Broker>,
    registry: Arc<dyn TransferRegistry>,
    storage: StorageLayout,
    supervisor: TaskSupervisor,
}

impl TransferService {
    /// Creates the service and both storage areas.
    pub async fn new(
        config: PipelineConfig,
        broker: Arc<dyn Broker>,
        registry: Arc<dyn TransferRegistry>,
    ) -> Result<Self, PipelineError> {
        let storage = StorageLayout::new(&config.upload_dir, &config.download_dir);
        storage.ensure_dirs().await?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                broker,
                registry,
                storage,
                supervisor: TaskSupervisor::new(),
            }),
        })
    }

    pub fn registry(&self) -> Arc<dyn TransferRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn storage(&self) -> &StorageLayout {
        &self.inner.storage
    }

    /// Stages `data` under a new transfer id and starts uploading it in the
    /// background. Returns as soon as the upload task is scheduled.
    pub async fn upload(&self, filename: &str, data: &[u8]) -> Result<UploadResponse, PipelineError> {
        validate_filename(filename)?;
        let transfer_id = uuid::Uuid::new_v4().to_string();
        let staged = self.inner.storage.staged_path(&transfer_id, filename);
        tokio::fs::write(&staged, data).await?;
        self.start_upload(transfer_id, filename, staged).await
    }

    /// Like [`TransferService::upload`], copying the file at `source`.
    pub async fn upload_file(&self, source: &Path) -> Result<UploadResponse, PipelineError> {
        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::InvalidFilename(source.display().to_string()))?;
        validate_filename(filename)?;
        let transfer_id = uuid::Uuid::new_v4().to_string();
        let staged = self.inner.storage.staged_path(&transfer_id, filename);
        tokio::fs::copy(source, &staged).await?;
        self.start_upload(transfer_id, filename, staged).await
    }

    async fn start_upload(
        &self,
        transfer_id: String,
        filename: &str,
        staged: PathBuf,
    ) -> Result<UploadResponse, PipelineError> {
        let inner = &self.inner;
        inner.registry.create(&transfer_id, filename);

        let uploader = Uploader::new(
            Arc::clone(&inner.broker),
            Arc::clone(&inner.registry),
            inner.config.chunk_size,
            inner.config.ack_timeout,
        );
        let keep_staged = inner.config.keep_staged_uploads;
        let id = transfer_id.clone();
        let task_staged = staged.clone();
        let spawned = inner
            .supervisor
            .spawn(&transfer_id, TaskKind::Upload, move |cancel| async move {
                uploader.run(&id, &task_staged, cancel).await;
                if !keep_staged {
                    discard_staged(task_staged).await;
                }
            });

        if !spawned {
            // Only a shut-down supervisor refuses a fresh id.
            discard_staged(staged).await;
            inner.registry.set_status(
                &transfer_id,
                TransferStatus::Failed,
                Some(PipelineError::Cancelled.to_string()),
            );
            return Err(PipelineError::Cancelled);
        }

        info!(transfer_id = %transfer_id, filename, "upload scheduled");
        Ok(UploadResponse {
            status_url: format!("{STATUS_PATH}/{transfer_id}"),
            file_id: transfer_id,
            filename: filename.to_string(),
        })
    }

    pub fn status(&self, transfer_id: &str) -> Result<StatusResponse, PipelineError> {
        let record = self.inner.registry.get(transfer_id)?;
        Ok(StatusResponse {
            status: record.status,
            progress_percent: record.progress_percent(),
            uploaded_chunks: record.uploaded_chunks,
            total_chunks: record.total_chunks,
            metadata: record.metadata,
            error: record.error,
        })
    }

    /// Starts reconstructing `transfer_id` in the background.
    ///
    /// A transfer still uploading is refused with
    /// [`PipelineError::UploadInProgress`]. A request for a transfer that is
    /// already being reconstructed does not start a second task.
    pub fn consume(&self, transfer_id: &str) -> Result<MessageResponse, PipelineError> {
        let inner = &self.inner;
        if inner.registry.get(transfer_id)?.status == TransferStatus::Uploading {
            return Err(PipelineError::UploadInProgress(transfer_id.to_string()));
        }

        let reconstructor = Reconstructor::new(
            Arc::clone(&inner.broker),
            Arc::clone(&inner.registry),
            inner.storage.clone(),
            inner.config.metadata_timeout,
            inner.config.chunk_timeout,
        );
        let id = transfer_id.to_string();
        let spawned = inner
            .supervisor
            .spawn(transfer_id, TaskKind::Reconstruct, move |cancel| async move {
                reconstructor.run(&id, cancel).await;
            });

        if !spawned {
            // Refused either as a duplicate or because the service is stopping.
            if inner.supervisor.is_running(transfer_id, TaskKind::Reconstruct) {
                return Ok(MessageResponse {
                    message: format!("Reconstruction of file {transfer_id} already in progress"),
                });
            }
            return Err(PipelineError::Cancelled);
        }

        info!(transfer_id, "reconstruction scheduled");
        Ok(MessageResponse {
            message: format!("Started consuming file {transfer_id}"),
        })
    }

    /// Opens the verified reconstruction of `transfer_id`.
    pub async fn download(&self, transfer_id: &str) -> Result<FetchedFile, PipelineError> {
        retrieval::fetch(self.inner.registry.as_ref(), transfer_id).await
    }

    /// Summaries of every known transfer, oldest first.
    pub fn list(&self) -> Vec<TransferSummary> {
        self.inner
            .registry
            .list()
            .into_iter()
            .map(|r| TransferSummary {
                progress_percent: r.progress_percent(),
                filename: r.filename,
                status: r.status,
                file_id: r.id,
            })
            .collect()
    }

    /// Stops any task of `transfer_id`, removes its stored files and forgets it.
    pub async fn delete(&self, transfer_id: &str) -> Result<MessageResponse, PipelineError> {
        let inner = &self.inner;
        inner.registry.get(transfer_id)?;

        inner
            .supervisor
            .cancel(transfer_id, inner.config.shutdown_timeout)
            .await;
        retrieval::purge(inner.registry.as_ref(), &inner.storage, transfer_id).await?;

        Ok(MessageResponse {
            message: format!("File {transfer_id} deleted successfully"),
        })
    }

    /// Cancels every background task and waits for them, bounded by the
    /// configured shutdown timeout. Returns `true` if all tasks stopped.
    pub async fn shutdown(&self) -> bool {
        let stopped = self
            .inner
            .supervisor
            .shutdown(self.inner.config.shutdown_timeout)
            .await;
        if stopped {
            info!("transfer service stopped");
        } else {
            warn!(
                remaining = self.inner.supervisor.running(),
                "background tasks still running after shutdown timeout"
            );
        }
        stopped
    }
}
