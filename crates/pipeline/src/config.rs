use std::path::PathBuf;
use std::time::Duration;

use filestream_protocol::constants::DEFAULT_CHUNK_SIZE;

pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime settings of a [`crate::TransferService`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Staging area for submitted files.
    pub upload_dir: PathBuf,
    /// Output area for reconstructed files.
    pub download_dir: PathBuf,
    pub chunk_size: usize,
    /// How long the uploader waits for each publish acknowledgment.
    pub ack_timeout: Duration,
    /// Upper bound on the reconstructor's search for a transfer's metadata.
    pub metadata_timeout: Duration,
    /// Longest gap the reconstructor tolerates between two chunks.
    pub chunk_timeout: Duration,
    /// Keep staged uploads after their upload task finishes.
    pub keep_staged_uploads: bool,
    /// How long shutdown waits for background tasks.
    pub shutdown_timeout: Duration,
}

impl PipelineConfig {
    /// Settings with default timeouts and chunk size for the given storage areas.
    pub fn new(upload_dir: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            download_dir: download_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
            keep_staged_uploads: false,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}
