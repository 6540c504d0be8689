use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::{Ack, Broker, BrokerError, BrokerFuture, Record, StartPosition, Subscription};

/// Append-only log of one topic.
struct TopicLog {
    records: RwLock<Vec<Record>>,
    /// Carries the log length; bumped on every append to wake readers.
    appended: watch::Sender<u64>,
}

impl TopicLog {
    fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            records: RwLock::new(Vec::new()),
            appended,
        }
    }

    fn append(&self, topic: &str, key: Option<String>, payload: Vec<u8>) -> u64 {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let offset = records.len() as u64;
        records.push(Record {
            topic: topic.to_string(),
            offset,
            key,
            payload,
        });
        drop(records);
        self.appended.send_replace(offset + 1);
        offset
    }

    fn get(&self, offset: u64) -> Option<Record> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(offset as usize).cloned()
    }

    fn len(&self) -> u64 {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64
    }
}

#[derive(Default)]
struct Shared {
    topics: RwLock<HashMap<String, Arc<TopicLog>>>,
    open_subscriptions: AtomicUsize,
}

impl Shared {
    fn topic(&self, name: &str) -> Arc<TopicLog> {
        if let Some(log) = self
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Arc::clone(log);
        }
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            topics
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(TopicLog::new())),
        )
    }
}

/// In-process broker retaining every record for the life of the process.
///
/// Topics are created on first use. Offsets are per topic and start at 0.
#[derive(Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
    ack_delay: Duration,
    /// Remaining publishes before every publish fails. `None` means unlimited.
    publish_budget: Mutex<Option<usize>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every acknowledgment by `delay` after the record is appended.
    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    /// Lets `limit` more publishes succeed, then rejects the rest.
    /// `None` removes the limit.
    pub fn set_publish_limit(&self, limit: Option<usize>) {
        *self
            .publish_budget
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = limit;
    }

    /// Number of subscriptions not yet closed.
    pub fn open_subscriptions(&self) -> usize {
        self.shared.open_subscriptions.load(Ordering::SeqCst)
    }

    /// Number of records retained on `topic`.
    pub fn topic_len(&self, topic: &str) -> u64 {
        self.shared.topic(topic).len()
    }

    /// Copy of every record retained on `topic`, in offset order.
    pub fn records(&self, topic: &str) -> Vec<Record> {
        let log = self.shared.topic(topic);
        let records = log.records.read().unwrap_or_else(PoisonError::into_inner);
        records.clone()
    }

    fn take_publish_slot(&self) -> Result<(), BrokerError> {
        let mut budget = self
            .publish_budget
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match budget.as_mut() {
            None => Ok(()),
            Some(0) => Err(BrokerError::Publish("broker rejected record".into())),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
        }
    }
}

impl Broker for MemoryBroker {
    fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> BrokerFuture<'_, Ack> {
        let topic = topic.to_string();
        let key = key.map(str::to_string);
        Box::pin(async move {
            self.take_publish_slot()?;
            let len = payload.len();
            let offset = self.shared.topic(&topic).append(&topic, key, payload);
            if !self.ack_delay.is_zero() {
                tokio::time::sleep(self.ack_delay).await;
            }
            trace!(topic = %topic, offset, bytes = len, "record acknowledged");
            Ok(Ack { offset })
        })
    }

    fn subscribe(
        &self,
        topic: &str,
        start: StartPosition,
    ) -> BrokerFuture<'_, Box<dyn Subscription>> {
        let log = self.shared.topic(topic);
        let topic = topic.to_string();
        Box::pin(async move {
            let position = match start {
                StartPosition::Earliest => 0,
                StartPosition::Latest => log.len(),
                StartPosition::Offset(offset) => offset,
            };
            let rx = log.appended.subscribe();
            self.shared.open_subscriptions.fetch_add(1, Ordering::SeqCst);
            debug!(topic = %topic, position, "subscription opened");
            Ok(Box::new(MemorySubscription {
                log,
                shared: Arc::clone(&self.shared),
                rx,
                position,
                closed: false,
            }) as Box<dyn Subscription>)
        })
    }
}

struct MemorySubscription {
    log: Arc<TopicLog>,
    shared: Arc<Shared>,
    rx: watch::Receiver<u64>,
    position: u64,
    closed: bool,
}

impl Subscription for MemorySubscription {
    fn next(&mut self) -> BrokerFuture<'_, Record> {
        Box::pin(async move {
            loop {
                if self.closed {
                    return Err(BrokerError::Closed);
                }
                // Mark the current length seen before reading so an append
                // racing with the lookup still wakes `changed()`.
                let _ = self.rx.borrow_and_update();
                if let Some(record) = self.log.get(self.position) {
                    self.position += 1;
                    return Ok(record);
                }
                if self.rx.changed().await.is_err() {
                    return Err(BrokerError::Closed);
                }
            }
        })
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.open_subscriptions.fetch_sub(1, Ordering::SeqCst);
            debug!(position = self.position, "subscription closed");
        }
    }

    fn position(&self) -> u64 {
        self.position
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.close();
    }
}
