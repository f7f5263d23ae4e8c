use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

/// Failures of the publish/subscribe primitive itself.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not join topic {topic}: {reason}")]
    Join { topic: String, reason: String },

    #[error("could not subscribe to topic {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("publish on topic {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}

/// Outcome of waiting on a [`Subscription`] that produced no message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvError {
    /// The deadline passed first.
    #[error("deadline elapsed")]
    Timeout,

    /// The topic is gone; no further messages will arrive.
    #[error("subscription closed")]
    Closed,

    /// The subscriber fell behind and `0` messages were skipped.
    #[error("subscriber lagged, {0} messages skipped")]
    Lagged(u64),
}

/// Abstract broadcast layer.
///
/// Delivery is at-least-once to every current subscriber of a topic. Callers
/// must not assume ordering across senders.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn join(&self, topic: &str) -> Result<Arc<dyn TopicHandle>, TransportError>;
}

/// A joined topic.
#[async_trait]
pub trait TopicHandle: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, payload: Bytes) -> Result<(), TransportError>;

    /// Opens a subscription that sees every message published after this call
    /// returns. Dropping the subscription unsubscribes.
    fn subscribe(&self) -> Result<Box<dyn Subscription>, TransportError>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next payload, or until `deadline` when one is given.
    async fn next(&mut self, deadline: Option<Instant>) -> Result<Bytes, RecvError>;
}
