use std::collections::BTreeMap;
use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::TransferError;

/// Buffers the chunks of one transfer until every sequence number is present.
///
/// Chunks may be inserted in any order; a repeated sequence number replaces
/// the earlier payload. Payloads are written out in ascending sequence order.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    total_chunks: u64,
    chunks: BTreeMap<u64, Vec<u8>>,
}

impl ReassemblyBuffer {
    pub fn new(total_chunks: u64) -> Self {
        Self {
            total_chunks,
            chunks: BTreeMap::new(),
        }
    }

    /// Stores the payload of chunk `sequence`.
    ///
    /// Returns `true` if the sequence number was not buffered before.
    pub fn insert(&mut self, sequence: u64, data: Vec<u8>) -> Result<bool, TransferError> {
        if sequence >= self.total_chunks {
            return Err(TransferError::SequenceOutOfRange {
                sequence,
                total: self.total_chunks,
            });
        }
        Ok(self.chunks.insert(sequence, data).is_none())
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    /// Number of distinct sequence numbers buffered.
    pub fn received(&self) -> u64 {
        self.chunks.len() as u64
    }

    pub fn is_complete(&self) -> bool {
        self.received() == self.total_chunks
    }

    /// Sequence numbers still missing, ascending.
    pub fn missing(&self) -> Vec<u64> {
        (0..self.total_chunks)
            .filter(|seq| !self.chunks.contains_key(seq))
            .collect()
    }

    /// Writes every payload to `path` in sequence order and returns the number
    /// of bytes written. The file is created or truncated.
    pub async fn write_ordered(&self, path: &Path) -> Result<u64, TransferError> {
        if !self.is_complete() {
            return Err(TransferError::Incomplete {
                received: self.received(),
                total: self.total_chunks,
            });
        }

        let file = tokio::fs::File::create(path).await?;
        let mut writer = tokio::io::BufWriter::new(file);
        let mut written = 0u64;
        for data in self.chunks.values() {
            writer.write_all(data).await?;
            written += data.len() as u64;
        }
        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(written)
    }
}
