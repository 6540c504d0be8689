use serde::{Deserialize, Serialize};

/// Lifecycle state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Uploading,
    Completed,
    Failed,
    Reconstructing,
    DownloadCompleted,
    DownloadFailed,
}

impl TransferStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Reconstructing => "reconstructing",
            Self::DownloadCompleted => "download_completed",
            Self::DownloadFailed => "download_failed",
        }
    }

    /// Returns `true` once no task will move the transfer further on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::DownloadCompleted | Self::DownloadFailed
        )
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor of a transfer, fixed before the first chunk is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    pub filename: String,
    pub file_size: u64,
    pub total_chunks: u64,
    pub chunk_size: u64,
    /// Hex MD5 of the whole file.
    pub md5_hash: String,
    /// RFC 3339 creation time.
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Service contract
// ---------------------------------------------------------------------------

/// Returned by `upload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub filename: String,
    pub status_url: String,
}

/// Returned by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: TransferStatus,
    pub progress_percent: f64,
    pub uploaded_chunks: u64,
    pub total_chunks: u64,
    pub metadata: Option<TransferMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Returned by `consume` and `delete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// One entry of `list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub file_id: String,
    pub status: TransferStatus,
    pub filename: String,
    pub progress_percent: f64,
}

/// Upload progress as a percentage rounded to two decimals.
///
/// A transfer with no chunks reports 100 once its upload has completed and
/// 0 before that.
pub fn progress_percent(uploaded: u64, total: u64, status: TransferStatus) -> f64 {
    if total == 0 {
        return match status {
            TransferStatus::Uploading | TransferStatus::Failed => 0.0,
            _ => 100.0,
        };
    }
    let pct = uploaded as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}
