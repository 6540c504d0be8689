//! Chunked file transfer over a message broker.
//!
//! [`TransferService`] is the entry point. Uploads stage the submitted file,
//! then an [`Uploader`] task hashes it, publishes one metadata message and
//! publishes its chunks one acknowledged message at a time. A
//! [`Reconstructor`] task later rebuilds the file from the broker's retained
//! messages, in any arrival order, and verifies its digest before the file
//! becomes downloadable.

pub mod config;
pub mod error;
pub mod reconstructor;
pub mod retrieval;
pub mod service;
pub mod storage;
pub mod supervisor;
pub mod uploader;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use reconstructor::Reconstructor;
pub use retrieval::FetchedFile;
pub use service::TransferService;
pub use storage::StorageLayout;
pub use supervisor::{TaskKind, TaskSupervisor};
pub use uploader::Uploader;
