/// Topic carrying one metadata message per transfer.
pub const METADATA_TOPIC: &str = "file-metadata";

/// Topic carrying the chunk messages of every transfer.
pub const CHUNK_TOPIC: &str = "file-chunks";

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Read block used when hashing a whole file, independent of chunk size.
pub const HASH_BLOCK_SIZE: usize = 8 * 1024;

/// Path prefix for the status URL returned by an upload.
pub const STATUS_PATH: &str = "/status";
