use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use filestream_protocol::types::progress_percent;
use filestream_protocol::{TransferMetadata, TransferStatus};
use tracing::debug;

use crate::TransferError;

/// Broker offsets recorded by the uploader so a reconstruction can start
/// reading where the transfer's messages begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bookmark {
    pub metadata_offset: u64,
    /// Unset until the first chunk has been acknowledged.
    pub first_chunk_offset: Option<u64>,
}

/// Snapshot of one transfer's state.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    pub id: String,
    pub filename: String,
    pub status: TransferStatus,
    pub total_chunks: u64,
    pub uploaded_chunks: u64,
    pub metadata: Option<TransferMetadata>,
    pub error: Option<String>,
    /// Set only after a successful, digest-verified reconstruction.
    pub output_path: Option<PathBuf>,
    pub bookmark: Option<Bookmark>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferRecord {
    fn new(id: &str, filename: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            filename: filename.to_string(),
            status: TransferStatus::Uploading,
            total_chunks: 0,
            uploaded_chunks: 0,
            metadata: None,
            error: None,
            output_path: None,
            bookmark: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Upload progress in percent, rounded to two decimals.
    pub fn progress_percent(&self) -> f64 {
        progress_percent(self.uploaded_chunks, self.total_chunks, self.status)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Concurrency-safe store of transfer state.
///
/// Every per-id mutation is atomic. Mutations on an unknown id are no-ops;
/// only [`TransferRegistry::get`] reports a missing id.
///
/// The upload-phase updates (`increment_progress`, `complete_upload`,
/// `fail_upload`) only apply while the transfer is `uploading`, so a late
/// uploader cannot overwrite a later phase.
pub trait TransferRegistry: Send + Sync {
    /// Registers a new transfer in the `uploading` state.
    ///
    /// The chunk count stays 0 until [`TransferRegistry::set_metadata`], so a
    /// fresh record briefly reports `0 of 0` chunks while still `uploading`.
    fn create(&self, id: &str, filename: &str) -> TransferRecord;

    /// Records the transfer's metadata and fixes its chunk count.
    fn set_metadata(&self, id: &str, metadata: TransferMetadata);

    fn set_bookmark(&self, id: &str, bookmark: Bookmark);

    /// Raises the uploaded chunk count to `count`. Never lowers it.
    fn update_progress(&self, id: &str, count: u64);

    /// Adds one acknowledged chunk and returns the new count.
    fn increment_progress(&self, id: &str) -> Option<u64>;

    /// Marks every chunk uploaded and the transfer `completed` in one step.
    fn complete_upload(&self, id: &str);

    /// Marks the upload `failed` with `error`.
    fn fail_upload(&self, id: &str, error: String);

    fn set_status(&self, id: &str, status: TransferStatus, error: Option<String>);

    /// Records the output path. Ignored unless the transfer is already
    /// `download_completed`.
    fn set_output_path(&self, id: &str, path: PathBuf);

    /// Marks the transfer `download_completed` with its output path in one step.
    fn complete_download(&self, id: &str, path: PathBuf);

    fn get(&self, id: &str) -> Result<TransferRecord, TransferError>;

    /// Snapshot of every transfer, oldest first.
    fn list(&self) -> Vec<TransferRecord>;

    /// Removes the transfer. Returns `true` if it existed.
    fn remove(&self, id: &str) -> bool;
}

/// Process-local registry backed by a `RwLock<HashMap>`.
#[derive(Default)]
pub struct MemoryRegistry {
    records: RwLock<HashMap<String, TransferRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, TransferRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, TransferRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<R>(&self, id: &str, f: impl FnOnce(&mut TransferRecord) -> R) -> Option<R> {
        let mut records = self.write();
        let Some(record) = records.get_mut(id) else {
            debug!(transfer_id = id, "registry update for unknown transfer ignored");
            return None;
        };
        let out = f(record);
        record.touch();
        Some(out)
    }
}

impl TransferRegistry for MemoryRegistry {
    fn create(&self, id: &str, filename: &str) -> TransferRecord {
        let record = TransferRecord::new(id, filename);
        self.write().insert(id.to_string(), record.clone());
        record
    }

    fn set_metadata(&self, id: &str, metadata: TransferMetadata) {
        self.update(id, |r| {
            r.total_chunks = metadata.total_chunks;
            r.metadata = Some(metadata);
        });
    }

    fn set_bookmark(&self, id: &str, bookmark: Bookmark) {
        self.update(id, |r| r.bookmark = Some(bookmark));
    }

    fn update_progress(&self, id: &str, count: u64) {
        self.update(id, |r| {
            if count > r.uploaded_chunks {
                r.uploaded_chunks = count;
            }
        });
    }

    fn increment_progress(&self, id: &str) -> Option<u64> {
        self.update(id, |r| {
            if r.status != TransferStatus::Uploading {
                return None;
            }
            r.uploaded_chunks += 1;
            Some(r.uploaded_chunks)
        })
        .flatten()
    }

    fn complete_upload(&self, id: &str) {
        self.update(id, |r| {
            if r.status == TransferStatus::Uploading {
                r.uploaded_chunks = r.uploaded_chunks.max(r.total_chunks);
                r.status = TransferStatus::Completed;
                r.error = None;
            }
        });
    }

    fn fail_upload(&self, id: &str, error: String) {
        self.update(id, |r| {
            if r.status == TransferStatus::Uploading {
                r.status = TransferStatus::Failed;
                r.error = Some(error);
            }
        });
    }

    fn set_status(&self, id: &str, status: TransferStatus, error: Option<String>) {
        self.update(id, |r| {
            r.status = status;
            r.error = error;
        });
    }

    fn set_output_path(&self, id: &str, path: PathBuf) {
        self.update(id, |r| {
            if r.status == TransferStatus::DownloadCompleted {
                r.output_path = Some(path);
            }
        });
    }

    fn complete_download(&self, id: &str, path: PathBuf) {
        self.update(id, |r| {
            r.status = TransferStatus::DownloadCompleted;
            r.error = None;
            r.output_path = Some(path);
        });
    }

    fn get(&self, id: &str) -> Result<TransferRecord, TransferError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| TransferError::NotFound(id.to_string()))
    }

    fn list(&self) -> Vec<TransferRecord> {
        let mut records: Vec<TransferRecord> = self.read().values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }

    fn remove(&self, id: &str) -> bool {
        self.write().remove(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn sample_metadata(total_chunks: u64) -> TransferMetadata {
        TransferMetadata {
            filename: "data.bin".into(),
            file_size: total_chunks * 4,
            total_chunks,
            chunk_size: 4,
            md5_hash: "d41d8cd98f00b204e9800998ecf8427e".into(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn create_and_get() {
        let reg = MemoryRegistry::new();
        let created = reg.create("t1", "data.bin");
        assert_eq!(created.status, TransferStatus::Uploading);
        assert_eq!(created.uploaded_chunks, 0);

        let got = reg.get("t1").unwrap();
        assert_eq!(got.filename, "data.bin");
        assert!(got.metadata.is_none());
        assert!(got.output_path.is_none());
    }

    #[test]
    fn get_unknown_is_not_found() {
        let reg = MemoryRegistry::new();
        assert!(matches!(reg.get("nope"), Err(TransferError::NotFound(id)) if id == "nope"));
    }

    #[test]
    fn mutations_on_unknown_id_are_noops() {
        let reg = MemoryRegistry::new();
        reg.update_progress("nope", 3);
        reg.set_status("nope", TransferStatus::Failed, Some("x".into()));
        assert_eq!(reg.increment_progress("nope"), None);
        assert!(reg.list().is_empty());
    }

    #[test]
    fn set_metadata_fixes_total() {
        let reg = MemoryRegistry::new();
        reg.create("t1", "data.bin");
        reg.set_metadata("t1", sample_metadata(3));
        let rec = reg.get("t1").unwrap();
        assert_eq!(rec.total_chunks, 3);
        assert_eq!(rec.metadata.unwrap().total_chunks, 3);
    }

    #[test]
    fn progress_never_decreases() {
        let reg = MemoryRegistry::new();
        reg.create("t1", "data.bin");
        reg.set_metadata("t1", sample_metadata(5));
        reg.update_progress("t1", 3);
        reg.update_progress("t1", 1);
        assert_eq!(reg.get("t1").unwrap().uploaded_chunks, 3);
        assert_eq!(reg.increment_progress("t1"), Some(4));
    }

    #[test]
    fn complete_upload_sets_count_and_status_together() {
        let reg = MemoryRegistry::new();
        reg.create("t1", "data.bin");
        reg.set_metadata("t1", sample_metadata(3));
        reg.increment_progress("t1");
        reg.increment_progress("t1");
        assert_eq!(reg.get("t1").unwrap().status, TransferStatus::Uploading);

        reg.complete_upload("t1");
        let rec = reg.get("t1").unwrap();
        assert_eq!(rec.status, TransferStatus::Completed);
        assert_eq!(rec.uploaded_chunks, 3);
        assert_eq!(rec.progress_percent(), 100.0);
    }

    #[test]
    fn upload_updates_ignored_after_upload_phase() {
        let reg = MemoryRegistry::new();
        reg.create("t1", "data.bin");
        reg.set_metadata("t1", sample_metadata(2));
        reg.increment_progress("t1");
        reg.complete_download("t1", PathBuf::from("/tmp/t1_data.bin"));

        assert_eq!(reg.increment_progress("t1"), None);
        reg.complete_upload("t1");
        reg.fail_upload("t1", "ack timed out".into());

        let rec = reg.get("t1").unwrap();
        assert_eq!(rec.status, TransferStatus::DownloadCompleted);
        assert_eq!(rec.uploaded_chunks, 1);
        assert!(rec.error.is_none());
        assert!(rec.output_path.is_some());
    }

    #[test]
    fn fail_upload_records_error() {
        let reg = MemoryRegistry::new();
        reg.create("t1", "data.bin");
        reg.fail_upload("t1", "broker unavailable".into());
        let rec = reg.get("t1").unwrap();
        assert_eq!(rec.status, TransferStatus::Failed);
        assert_eq!(rec.error.as_deref(), Some("broker unavailable"));
    }

    #[test]
    fn output_path_requires_download_completed() {
        let reg = MemoryRegistry::new();
        reg.create("t1", "data.bin");
        reg.set_status("t1", TransferStatus::DownloadFailed, Some("digest mismatch".into()));
        reg.set_output_path("t1", PathBuf::from("/tmp/t1_data.bin"));
        assert!(reg.get("t1").unwrap().output_path.is_none());

        reg.complete_download("t1", PathBuf::from("/tmp/t1_data.bin"));
        let rec = reg.get("t1").unwrap();
        assert_eq!(rec.status, TransferStatus::DownloadCompleted);
        assert!(rec.error.is_none());
        assert_eq!(rec.output_path.unwrap(), PathBuf::from("/tmp/t1_data.bin"));
    }

    #[test]
    fn bookmark_roundtrip() {
        let reg = MemoryRegistry::new();
        reg.create("t1", "data.bin");
        let bookmark = Bookmark {
            metadata_offset: 7,
            first_chunk_offset: Some(12),
        };
        reg.set_bookmark("t1", bookmark);
        assert_eq!(reg.get("t1").unwrap().bookmark, Some(bookmark));
    }

    #[test]
    fn list_and_remove() {
        let reg = MemoryRegistry::new();
        reg.create("a", "a.bin");
        reg.create("b", "b.bin");
        assert_eq!(reg.list().len(), 2);

        assert!(reg.remove("a"));
        assert!(!reg.remove("a"));
        let ids: Vec<String> = reg.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["b"]);
    }

    #[test]
    fn concurrent_increments_are_atomic() {
        let reg = Arc::new(MemoryRegistry::new());
        reg.create("t1", "data.bin");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        reg.increment_progress("t1");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(reg.get("t1").unwrap().uploaded_chunks, 800);
    }

    #[test]
    fn usable_as_trait_object() {
        let reg: Arc<dyn TransferRegistry> = Arc::new(MemoryRegistry::new());
        reg.create("t1", "data.bin");
        assert!(reg.get("t1").is_ok());
    }
}
