//! Wire types shared by the filestream crates.
//!
//! - [`messages`]: the two broker message formats (metadata and chunk).
//! - [`types`]: transfer status, metadata and the request/response shapes
//!   of the service contract consumed by the HTTP layer.
//! - [`constants`]: topic names and size defaults.

pub mod constants;
pub mod messages;
pub mod types;

pub use messages::{ChunkMessage, MetadataMessage};
pub use types::{TransferMetadata, TransferStatus};
