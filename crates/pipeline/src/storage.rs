use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// The two storage areas and the `{transfer_id}_{filename}` naming scheme.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    upload_dir: PathBuf,
    download_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(upload_dir: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            download_dir: download_dir.into(),
        }
    }

    /// Creates both storage areas if missing.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.download_dir).await?;
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Where a submitted file is staged for upload.
    pub fn staged_path(&self, transfer_id: &str, filename: &str) -> PathBuf {
        self.upload_dir.join(stored_name(transfer_id, filename))
    }

    /// Where a reconstructed file is written.
    pub fn output_path(&self, transfer_id: &str, filename: &str) -> PathBuf {
        self.download_dir.join(stored_name(transfer_id, filename))
    }

    /// Removes every file in both areas whose name starts with
    /// `{transfer_id}_`. Returns the number of files removed.
    ///
    /// A missing storage area counts as empty.
    pub async fn purge_prefixed(&self, transfer_id: &str) -> std::io::Result<usize> {
        let prefix = format!("{transfer_id}_");
        let mut removed = 0;

        for dir in [&self.upload_dir, &self.download_dir] {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if !name.starts_with(&prefix) {
                    continue;
                }
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => {
                        debug!(path = %entry.path().display(), "removed stored file");
                        removed += 1;
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "failed to remove stored file");
                        return Err(e);
                    }
                }
            }
        }

        Ok(removed)
    }
}

/// On-disk name of a transfer's file: `{transfer_id}_{filename}`.
pub fn stored_name(transfer_id: &str, filename: &str) -> String {
    format!("{transfer_id}_{filename}")
}
