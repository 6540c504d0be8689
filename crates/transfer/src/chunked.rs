use std::io::Read;
use std::path::Path;

use filestream_protocol::constants::{DEFAULT_CHUNK_SIZE, HASH_BLOCK_SIZE};
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

use crate::TransferError;

// ---------------------------------------------------------------------------
// Chunk math
// ---------------------------------------------------------------------------

/// Number of chunks needed for `file_size` bytes: `ceil(file_size / chunk_size)`.
pub fn total_chunks(file_size: u64, chunk_size: u64) -> u64 {
    file_size.div_ceil(chunk_size.max(1))
}

/// Length of chunk `sequence`. Every chunk is `chunk_size` long except the
/// last, which carries the remainder. Out-of-range sequences have length 0.
pub fn chunk_len(sequence: u64, file_size: u64, chunk_size: u64) -> u64 {
    let chunk_size = chunk_size.max(1);
    if sequence >= total_chunks(file_size, chunk_size) {
        return 0;
    }
    let start = sequence * chunk_size;
    chunk_size.min(file_size - start)
}

// ---------------------------------------------------------------------------
// Digest helpers
// ---------------------------------------------------------------------------

/// Computes MD5 of `data` and returns the hex-encoded digest.
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes MD5 of an entire file, reading it in small blocks so memory use
/// does not depend on the file size.
pub fn calculate_file_digest(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; HASH_BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// A numbered slice of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk in the file, starting at 0.
    pub sequence: u64,
    /// Raw chunk bytes.
    pub data: Vec<u8>,
}

/// Reads a file in fixed-size windows, one numbered chunk at a time.
pub struct ChunkReader {
    file: tokio::fs::File,
    chunk_size: u64,
    file_size: u64,
    total_chunks: u64,
    next_sequence: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        } as u64;
        Ok(Self {
            file,
            chunk_size,
            file_size,
            total_chunks: total_chunks(file_size, chunk_size),
            next_sequence: 0,
        })
    }

    /// Reads the next chunk. Returns `None` after the last one.
    ///
    /// A file that shrinks while being read surfaces as an
    /// `UnexpectedEof` I/O error rather than a short final chunk.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        if self.next_sequence >= self.total_chunks {
            return Ok(None);
        }

        let len = chunk_len(self.next_sequence, self.file_size, self.chunk_size) as usize;
        let mut data = vec![0u8; len];
        self.file.read_exact(&mut data).await?;

        let chunk = Chunk {
            sequence: self.next_sequence,
            data,
        };
        self.next_sequence += 1;
        Ok(Some(chunk))
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    /// Chunks not yet read.
    pub fn remaining(&self) -> u64 {
        self.total_chunks - self.next_sequence
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::*;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn total_chunks_rounds_up() {
        assert_eq!(total_chunks(2_500_000, 1_048_576), 3);
        assert_eq!(total_chunks(2_097_152, 1_048_576), 2);
        assert_eq!(total_chunks(1, 1_048_576), 1);
        assert_eq!(total_chunks(0, 1_048_576), 0);
    }

    #[test]
    fn chunk_lengths_for_partial_last_chunk() {
        let lens: Vec<u64> = (0..3).map(|i| chunk_len(i, 2_500_000, 1_048_576)).collect();
        assert_eq!(lens, [1_048_576, 1_048_576, 402_848]);
        assert_eq!(chunk_len(3, 2_500_000, 1_048_576), 0);
    }

    #[test]
    fn chunk_lengths_for_exact_multiple() {
        assert_eq!(chunk_len(1, 2_097_152, 1_048_576), 1_048_576);
    }

    #[test]
    fn digest_bytes_known_value() {
        assert_eq!(digest_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(digest_bytes(b"hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn file_digest_matches_bytes_digest() {
        let dir = TempDir::new().unwrap();
        // Spans several hash blocks.
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let path = create_test_file(dir.path(), "test.bin", &data);

        assert_eq!(calculate_file_digest(&path).unwrap(), digest_bytes(&data));
    }

    #[test]
    fn file_digest_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = calculate_file_digest(&dir.path().join("missing.bin"));
        assert!(matches!(result, Err(TransferError::Io(_))));
    }

    #[tokio::test]
    async fn chunk_reader_reads_all() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert_eq!(reader.file_size(), 10);
        assert_eq!(reader.total_chunks(), 3);

        let c0 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c0.sequence, 0);
        assert_eq!(c0.data, b"AABB");

        let c1 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c1.sequence, 1);
        assert_eq!(c1.data, b"CCDD");
        assert_eq!(reader.remaining(), 1);

        let c2 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c2.sequence, 2);
        assert_eq!(c2.data, b"EE");

        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunk_reader_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert_eq!(reader.total_chunks(), 0);
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunk_reader_default_chunk_size() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"x");
        let reader = ChunkReader::open(&path, 0).await.unwrap();
        assert_eq!(reader.chunk_size(), DEFAULT_CHUNK_SIZE as u64);
        assert_eq!(reader.total_chunks(), 1);
    }

    #[tokio::test]
    async fn chunk_reader_detects_truncation() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        std::fs::File::create(&path).unwrap().write_all(b"0123").unwrap();

        assert!(reader.next_chunk().await.unwrap().is_some());
        let err = reader.next_chunk().await.unwrap_err();
        assert!(matches!(err, TransferError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }
}
