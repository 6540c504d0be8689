//! Pipeline error types.

use std::time::Duration;

use filestream_broker::BrokerError;
use filestream_transfer::TransferError;

/// Errors produced by uploads, reconstructions and service requests.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("broker error: {0}")]
    Publish(BrokerError),

    #[error("digest mismatch")]
    DigestMismatch,

    #[error("transfer not found: {0}")]
    NotFound(String),

    #[error("transfer {0} has not been reconstructed")]
    NotReady(String),

    #[error("metadata not found within {0:?}")]
    MetadataTimeout(Duration),

    #[error(
        "no chunk received within {timeout:?} ({received} of {total} chunks, {missing} missing from sequence {first_missing})"
    )]
    ChunkTimeout {
        timeout: Duration,
        received: u64,
        total: u64,
        missing: u64,
        first_missing: u64,
    },

    #[error("transfer {0} is still uploading")]
    UploadInProgress(String),

    #[error("cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transfer error: {0}")]
    Transfer(TransferError),
}

impl PipelineError {
    /// HTTP status an outer request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::NotReady(_) | Self::UploadInProgress(_) => 409,
            Self::Transfer(TransferError::InvalidFilename(_)) => 400,
            _ => 500,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io_failure",
            Self::Publish(_) => "publish_failure",
            Self::DigestMismatch => "digest_mismatch",
            Self::NotFound(_) => "not_found",
            Self::NotReady(_) => "not_ready",
            Self::MetadataTimeout(_) => "metadata_timeout",
            Self::ChunkTimeout { .. } => "chunk_timeout",
            Self::UploadInProgress(_) => "upload_in_progress",
            Self::Cancelled => "cancelled",
            Self::Json(_) => "invalid_message",
            Self::Transfer(TransferError::InvalidFilename(_)) => "invalid_filename",
            Self::Transfer(_) => "transfer_failure",
        }
    }
}

impl From<TransferError> for PipelineError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Io(e) => Self::Io(e),
            TransferError::NotFound(id) => Self::NotFound(id),
            other => Self::Transfer(other),
        }
    }
}

impl From<BrokerError> for PipelineError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::Cancelled => Self::Cancelled,
            BrokerError::Json(e) => Self::Json(e),
            other => Self::Publish(other),
        }
    }
}
