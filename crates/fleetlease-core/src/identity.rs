use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a participant, as supplied by the surrounding network layer.
///
/// The protocol only compares identities; it never resolves them to
/// addresses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A random identity, for nodes that are not given one by their host.
    pub fn random() -> Self {
        Self(format!("peer-{:016x}", rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Correlation identifier tying a request to its fulfillments.
///
/// Generated tokens combine a process-wide counter with 96 random bits, so
/// two outstanding requests from the same node never share a token and
/// tokens from different nodes collide with negligible probability.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Token(String);

static TOKEN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

impl Token {
    pub fn generate() -> Self {
        let seq = TOKEN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let salt = rand::random::<u128>() >> 32;
        Self(format!("{seq:016x}-{salt:024x}"))
    }

    /// Wraps a token received from the wire.
    pub fn from_wire(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `(requestor, token)` pair naming one request round on the network.
///
/// Tokens are only unique per requestor, so dedup and matching always use the
/// pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub requestor: PeerId,
    pub token: Token,
}

impl RequestKey {
    pub fn new(requestor: PeerId, token: Token) -> Self {
        Self { requestor, token }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.requestor, self.token)
    }
}
