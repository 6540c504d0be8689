//! Fetching reconstructed files and purging transfers.

use std::io::ErrorKind;
use std::path::PathBuf;

use filestream_transfer::TransferRegistry;
use tracing::info;

use crate::error::PipelineError;
use crate::storage::StorageLayout;

/// An open reconstructed file, ready to be streamed to a client.
#[derive(Debug)]
pub struct FetchedFile {
    /// Original filename, for the client's download name.
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub file: tokio::fs::File,
}

/// Opens the reconstructed file of `transfer_id`.
///
/// - Unknown id: [`PipelineError::NotFound`]
/// - No verified output yet: [`PipelineError::NotReady`]
/// - Output recorded but missing on disk: [`PipelineError::NotFound`]
pub async fn fetch(
    registry: &dyn TransferRegistry,
    transfer_id: &str,
) -> Result<FetchedFile, PipelineError> {
    let record = registry.get(transfer_id)?;
    let Some(path) = record.output_path else {
        return Err(PipelineError::NotReady(transfer_id.to_string()));
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PipelineError::NotFound(transfer_id.to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let size = file.metadata().await?.len();
    let filename = record.metadata.map_or(record.filename, |m| m.filename);

    Ok(FetchedFile {
        filename,
        path,
        size,
        file,
    })
}

/// Deletes every stored file of `transfer_id` and forgets the transfer.
/// Returns the number of files removed.
///
/// An unknown id is reported as [`PipelineError::NotFound`] and changes nothing.
pub async fn purge(
    registry: &dyn TransferRegistry,
    storage: &StorageLayout,
    transfer_id: &str,
) -> Result<usize, PipelineError> {
    registry.get(transfer_id)?;
    let removed = storage.purge_prefixed(transfer_id).await?;
    registry.remove(transfer_id);
    info!(transfer_id, files = removed, "transfer purged");
    Ok(removed)
}
