//! Protobuf encoding of the two protocol messages.
//!
//! Fields are tagged, unknown fields are skipped, and every field a receiver
//! relies on is validated after decoding. Anything that fails is a
//! malformed message and gets dropped by the caller.

use bytes::Bytes;
use fleetlease_core::{Device, PeerId, RequestKey, Token};
use prost::Message;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("undecodable payload: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("missing required field `{0}`")]
    Missing(&'static str),
}

#[derive(Clone, PartialEq, Message)]
struct RequestProto {
    #[prost(string, tag = "1")]
    requestor: String,
    #[prost(string, tag = "2")]
    token: String,
    #[prost(uint64, tag = "3")]
    lease_ms: u64,
}

#[derive(Clone, PartialEq, Message)]
struct DeviceProto {
    #[prost(uint32, tag = "1")]
    id: u32,
    #[prost(string, tag = "2")]
    address: String,
    #[prost(string, tag = "3")]
    name: String,
    #[prost(uint64, tag = "4")]
    clock_rate_hz: u64,
    #[prost(uint64, tag = "5")]
    memory_bytes: u64,
}

#[derive(Clone, PartialEq, Message)]
struct LeaseProto {
    #[prost(string, tag = "1")]
    token: String,
    #[prost(uint64, tag = "2")]
    duration_ms: u64,
    #[prost(uint64, tag = "3")]
    expires_unix_ms: u64,
}

#[derive(Clone, PartialEq, Message)]
struct FulfillmentProto {
    #[prost(string, tag = "1")]
    requestor: String,
    #[prost(string, tag = "2")]
    token: String,
    #[prost(message, optional, tag = "3")]
    device: Option<DeviceProto>,
    #[prost(message, optional, tag = "4")]
    lease: Option<LeaseProto>,
    #[prost(string, tag = "5")]
    granter: String,
}

/// A plea for a device, broadcast on the request topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub requestor: PeerId,
    pub token: Token,
    pub lease: Duration,
}

/// Terms of the lease a granter took out on the requestor's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseTerms {
    pub token: Token,
    pub duration: Duration,
    /// Granter's wall clock.
    pub expires_at: SystemTime,
}

/// A grant answering one request, broadcast on the fulfillment topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfillment {
    pub requestor: PeerId,
    pub token: Token,
    pub granter: PeerId,
    pub device: Device,
    pub lease: Option<LeaseTerms>,
}

pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn required(value: String, field: &'static str) -> Result<String, WireError> {
    if value.is_empty() {
        Err(WireError::Missing(field))
    } else {
        Ok(value)
    }
}

impl Request {
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.requestor.clone(), self.token.clone())
    }

    pub fn encode(&self) -> Bytes {
        RequestProto {
            requestor: self.requestor.as_str().to_string(),
            token: self.token.as_str().to_string(),
            lease_ms: millis(self.lease),
        }
        .encode_to_vec()
        .into()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let proto = RequestProto::decode(payload)?;
        Ok(Self {
            requestor: PeerId::new(required(proto.requestor, "requestor")?),
            token: Token::from_wire(required(proto.token, "token")?),
            lease: Duration::from_millis(proto.lease_ms),
        })
    }
}

impl Fulfillment {
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.requestor.clone(), self.token.clone())
    }

    /// Whether this grant answers the request named by `key`.
    pub fn answers(&self, key: &RequestKey) -> bool {
        self.requestor == key.requestor && self.token == key.token
    }

    pub fn encode(&self) -> Bytes {
        let device = &self.device;
        FulfillmentProto {
            requestor: self.requestor.as_str().to_string(),
            token: self.token.as_str().to_string(),
            device: Some(DeviceProto {
                id: device.id,
                address: device.address.clone(),
                name: device.name.clone(),
                clock_rate_hz: device.clock_rate_hz,
                memory_bytes: device.memory_bytes,
            }),
            lease: self.lease.as_ref().map(|l| LeaseProto {
                token: l.token.as_str().to_string(),
                duration_ms: millis(l.duration),
                expires_unix_ms: l
                    .expires_at
                    .duration_since(UNIX_EPOCH)
                    .map(millis)
                    .unwrap_or(0),
            }),
            granter: self.granter.as_str().to_string(),
        }
        .encode_to_vec()
        .into()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let proto = FulfillmentProto::decode(payload)?;
        let device = proto.device.ok_or(WireError::Missing("device"))?;

        Ok(Self {
            requestor: PeerId::new(required(proto.requestor, "requestor")?),
            token: Token::from_wire(required(proto.token, "token")?),
            // Older granters did not name themselves.
            granter: PeerId::new(proto.granter),
            device: Device {
                id: device.id,
                address: device.address,
                name: device.name,
                clock_rate_hz: device.clock_rate_hz,
                memory_bytes: device.memory_bytes,
            },
            lease: proto.lease.map(|l| LeaseTerms {
                token: Token::from_wire(l.token),
                duration: Duration::from_millis(l.duration_ms),
                expires_at: UNIX_EPOCH + Duration::from_millis(l.expires_unix_ms),
            }),
        })
    }
}
