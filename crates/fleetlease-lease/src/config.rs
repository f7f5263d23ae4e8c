use crate::backoff::{BackoffPolicy, FixedBackoff, RandomizedBackoff};
use crate::error::ConfigError;
use crate::wire::millis;
use fleetlease_core::PeerId;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_REQUEST_TOPIC: &str = "GPU_REQUEST";
pub const DEFAULT_FULFILLMENT_TOPIC: &str = "GPU_FULFILLMENT";

/// How long a listener waits before competing for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    Fixed { delay_ms: u64 },
    Randomized { min_ms: u64, max_ms: u64 },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::Randomized {
            min_ms: 10_000,
            max_ms: 20_000,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::Randomized { min_ms, max_ms } if min_ms > max_ms => {
                Err(ConfigError::BackoffRange { min_ms, max_ms })
            }
            _ => Ok(()),
        }
    }

    pub fn build(&self) -> Arc<dyn BackoffPolicy> {
        match *self {
            Self::Fixed { delay_ms } => Arc::new(FixedBackoff(Duration::from_millis(delay_ms))),
            Self::Randomized { min_ms, max_ms } => Arc::new(RandomizedBackoff::new(
                Duration::from_millis(min_ms),
                Duration::from_millis(max_ms),
            )),
        }
    }
}

/// Negotiator settings. Every field has a default, so an empty JSON object is
/// a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NegotiatorConfig {
    pub peer_id: PeerId,
    pub request_topic: String,
    pub fulfillment_topic: String,
    pub backoff: BackoffConfig,
    /// Never compete for requests this node published itself.
    pub ignore_own_requests: bool,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            peer_id: PeerId::random(),
            request_topic: DEFAULT_REQUEST_TOPIC.into(),
            fulfillment_topic: DEFAULT_FULFILLMENT_TOPIC.into(),
            backoff: BackoffConfig::default(),
            ignore_own_requests: true,
        }
    }
}

impl NegotiatorConfig {
    pub fn builder() -> NegotiatorConfigBuilder {
        NegotiatorConfigBuilder::default()
    }

    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peer_id.is_empty() {
            return Err(ConfigError::Empty("peer_id"));
        }
        if self.request_topic.is_empty() {
            return Err(ConfigError::Empty("request_topic"));
        }
        if self.fulfillment_topic.is_empty() {
            return Err(ConfigError::Empty("fulfillment_topic"));
        }
        self.backoff.validate()
    }
}

/// Builder for `NegotiatorConfig`.
#[derive(Default)]
pub struct NegotiatorConfigBuilder {
    config: NegotiatorConfig,
}

impl NegotiatorConfigBuilder {
    pub fn peer_id(mut self, id: impl Into<PeerId>) -> Self {
        self.config.peer_id = id.into();
        self
    }

    pub fn request_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.request_topic = topic.into();
        self
    }

    pub fn fulfillment_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.fulfillment_topic = topic.into();
        self
    }

    /// Sets a fixed backoff delay.
    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffConfig::Fixed {
            delay_ms: millis(delay),
        };
        self
    }

    /// Sets a randomized backoff in `[min, max)`.
    pub fn randomized_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.config.backoff = BackoffConfig::Randomized {
            min_ms: millis(min),
            max_ms: millis(max),
        };
        self
    }

    pub fn ignore_own_requests(mut self, ignore: bool) -> Self {
        self.config.ignore_own_requests = ignore;
        self
    }

    pub fn build(self) -> NegotiatorConfig {
        self.config
    }
}
