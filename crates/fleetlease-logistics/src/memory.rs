use crate::transport::{RecvError, Subscription, TopicHandle, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::time::Instant;

const DEFAULT_CAPACITY: usize = 1024;

/// In-process broadcast fabric.
///
/// Every clone of a hub shares the same topics, so a set of nodes built on
/// clones of one hub behave like peers on a single gossip mesh. Intended for
/// tests, simulations and single-host fleets.
#[derive(Clone)]
pub struct InMemoryHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    topics: Mutex<HashMap<String, broadcast::Sender<Bytes>>>,
    capacity: usize,
    copies: usize,
}

impl InMemoryHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds how far a subscriber may lag before messages are
    /// skipped.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                topics: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
                copies: 1,
            }),
        }
    }

    /// Delivers every published payload `copies` times, emulating an
    /// at-least-once transport that redelivers.
    pub fn with_redelivery(copies: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                topics: Mutex::new(HashMap::new()),
                capacity: DEFAULT_CAPACITY,
                copies: copies.max(1),
            }),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Bytes> {
        let mut topics = self
            .inner
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .clone()
    }
}

impl Default for InMemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryHub {
    async fn join(&self, topic: &str) -> Result<Arc<dyn TopicHandle>, TransportError> {
        if topic.is_empty() {
            return Err(TransportError::Join {
                topic: topic.to_string(),
                reason: "empty topic name".into(),
            });
        }

        Ok(Arc::new(InMemoryTopic {
            name: topic.to_string(),
            sender: self.sender(topic),
            copies: self.inner.copies,
        }))
    }
}

pub struct InMemoryTopic {
    name: String,
    sender: broadcast::Sender<Bytes>,
    copies: usize,
}

#[async_trait]
impl TopicHandle for InMemoryTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, payload: Bytes) -> Result<(), TransportError> {
        for _ in 0..self.copies {
            // A send error only means nobody is subscribed right now.
            if self.sender.send(payload.clone()).is_err() {
                tracing::trace!(topic = %self.name, "published with no subscribers");
                break;
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> Result<Box<dyn Subscription>, TransportError> {
        Ok(Box::new(InMemorySubscription {
            receiver: self.sender.subscribe(),
        }))
    }
}

pub struct InMemorySubscription {
    receiver: broadcast::Receiver<Bytes>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next(&mut self, deadline: Option<Instant>) -> Result<Bytes, RecvError> {
        let received = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.receiver.recv())
                .await
                .map_err(|_| RecvError::Timeout)?,
            None => self.receiver.recv().await,
        };

        received.map_err(|e| match e {
            broadcast::error::RecvError::Closed => RecvError::Closed,
            broadcast::error::RecvError::Lagged(n) => RecvError::Lagged(n),
        })
    }
}
