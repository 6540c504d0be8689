//! Message broker abstraction.
//!
//! Producers publish keyed records to named topics and wait for the broker's
//! acknowledgment. Consumers open a [`Subscription`] at a chosen position and
//! read records in offset order. [`MemoryBroker`] is an in-process
//! implementation that retains every record for the life of the process.

mod memory;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub use memory::MemoryBroker;

/// Boxed future returned by broker operations.
pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrokerError>> + Send + 'a>>;

/// Errors produced by broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("acknowledgment timed out after {0:?}")]
    AckTimeout(Duration),

    #[error("subscription closed")]
    Closed,

    #[error("cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where a new subscription starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// The oldest retained record.
    Earliest,
    /// Only records published after the subscription opens.
    Latest,
    /// The record at this offset and everything after it.
    Offset(u64),
}

/// A record read from a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    /// Position within the topic, starting at 0.
    pub offset: u64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// Broker acknowledgment of a published record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub offset: u64,
}

/// A message broker.
///
/// Implementations must be object-safe so the pipeline can hold an
/// `Arc<dyn Broker>`.
pub trait Broker: Send + Sync {
    /// Appends `payload` to `topic` and resolves once the broker has
    /// acknowledged it.
    fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> BrokerFuture<'_, Ack>;

    /// Opens a subscription on `topic` starting at `start`.
    fn subscribe(&self, topic: &str, start: StartPosition)
    -> BrokerFuture<'_, Box<dyn Subscription>>;
}

/// An open read position on one topic.
///
/// Dropping a subscription closes it.
pub trait Subscription: Send {
    /// Waits for the next record. Returns [`BrokerError::Closed`] once the
    /// subscription has been closed.
    fn next(&mut self) -> BrokerFuture<'_, Record>;

    /// Releases the subscription. Calling it more than once is harmless.
    fn close(&mut self);

    /// Offset of the next record this subscription will return.
    fn position(&self) -> u64;
}

/// Serializes `message` as JSON, publishes it and waits for the
/// acknowledgment, giving up after `ack_timeout` or when `cancel` fires.
pub async fn publish_json<T: Serialize + ?Sized>(
    broker: &dyn Broker,
    topic: &str,
    key: &str,
    message: &T,
    ack_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Ack, BrokerError> {
    let payload = serde_json::to_vec(message)?;

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BrokerError::Cancelled),
        result = tokio::time::timeout(ack_timeout, broker.publish(topic, Some(key), payload)) => {
            match result {
                Ok(ack) => ack,
                Err(_) => Err(BrokerError::AckTimeout(ack_timeout)),
            }
        }
    }
}
