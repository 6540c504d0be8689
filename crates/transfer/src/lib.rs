//! Chunked file transfer primitives.
//!
//! Splits files into fixed-size chunks, hashes them, reassembles chunks
//! that arrive in any order and tracks per-transfer state in a registry.

mod chunked;
mod reassembly;
mod registry;
mod validation;

pub use chunked::{
    Chunk, ChunkReader, calculate_file_digest, chunk_len, digest_bytes, total_chunks,
};
pub use reassembly::ReassemblyBuffer;
pub use registry::{Bookmark, MemoryRegistry, TransferRecord, TransferRegistry};
pub use validation::validate_filename;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("sequence number {sequence} out of range (total chunks: {total})")]
    SequenceOutOfRange { sequence: u64, total: u64 },

    #[error("incomplete transfer: {received} of {total} chunks buffered")]
    Incomplete { received: u64, total: u64 },

    #[error("transfer not found: {0}")]
    NotFound(String),
}
