//! Application orchestrator: wires broker, registry and transfer service
//! together and drives each file through upload and reconstruction.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use filestream_broker::MemoryBroker;
use filestream_pipeline::TransferService;
use filestream_protocol::TransferStatus;
use filestream_protocol::types::StatusResponse;
use filestream_transfer::MemoryRegistry;

use crate::config::Config;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs the agent over `files` until they are all processed or shutdown is
/// requested.
pub async fn run(config: Config, files: Vec<PathBuf>) -> anyhow::Result<()> {
    let broker = Arc::new(MemoryBroker::new());
    let registry = Arc::new(MemoryRegistry::new());
    let service = TransferService::new(config.pipeline_config(), broker, registry).await?;

    if files.is_empty() {
        tracing::info!("no files given, nothing to transfer");
    }

    let failed = tokio::select! {
        n = process_all(&service, &files) => n,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
            0
        }
    };

    let summary = serde_json::to_string_pretty(&service.list())?;
    println!("{summary}");

    if !service.shutdown().await {
        tracing::warn!("some transfers were still running at shutdown");
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} transfers failed", files.len());
    }
    Ok(())
}

/// Processes every file in turn. Returns the number of failures.
async fn process_all(service: &TransferService, files: &[PathBuf]) -> usize {
    let mut failed = 0;
    for path in files {
        match transfer_file(service, path).await {
            Ok(output) => tracing::info!(
                source = %path.display(),
                output = %output.display(),
                "file transferred and verified"
            ),
            Err(e) => {
                tracing::error!(source = %path.display(), error = %e, "transfer failed");
                failed += 1;
            }
        }
    }
    failed
}

/// Uploads `path`, reconstructs it and returns the verified output path.
async fn transfer_file(service: &TransferService, path: &Path) -> anyhow::Result<PathBuf> {
    let upload = service.upload_file(path).await?;
    let file_id = upload.file_id;
    tracing::info!(file_id = %file_id, filename = %upload.filename, "upload started");

    let status = wait_for(service, &file_id, |s| {
        matches!(s, TransferStatus::Completed | TransferStatus::Failed)
    })
    .await?;
    if status.status == TransferStatus::Failed {
        anyhow::bail!(
            "upload failed: {}",
            status.error.unwrap_or_else(|| "unknown error".into())
        );
    }
    tracing::info!(
        file_id = %file_id,
        chunks = status.total_chunks,
        "upload completed"
    );

    service.consume(&file_id)?;
    let status = wait_for(service, &file_id, |s| {
        matches!(
            s,
            TransferStatus::DownloadCompleted | TransferStatus::DownloadFailed
        )
    })
    .await?;
    if status.status == TransferStatus::DownloadFailed {
        anyhow::bail!(
            "reconstruction failed: {}",
            status.error.unwrap_or_else(|| "unknown error".into())
        );
    }

    let fetched = service.download(&file_id).await?;
    Ok(fetched.path)
}

/// Polls the status of `file_id` until `done` accepts it.
async fn wait_for(
    service: &TransferService,
    file_id: &str,
    done: impl Fn(TransferStatus) -> bool,
) -> anyhow::Result<StatusResponse> {
    let mut last_progress = -1.0;
    loop {
        let status = service.status(file_id)?;
        if status.progress_percent != last_progress {
            tracing::debug!(
                file_id,
                status = %status.status,
                progress = status.progress_percent,
                "transfer progress"
            );
            last_progress = status.progress_percent;
        }
        if done(status.status) {
            return Ok(status);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
