mod memory;
pub mod transport;

pub use memory::{InMemoryHub, InMemorySubscription, InMemoryTopic};
pub use transport::{RecvError, Subscription, TopicHandle, Transport, TransportError};
