use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single value read from or written to a device tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// Per-tag outcome reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCode {
    Ok,
    NotFound,
    AccessDenied,
    InvalidAddress,
    InvalidData,
    InternalError,
}

/// Tag name -> device specific tag address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub tags: BTreeMap<String, String>,
}

impl ReadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.tags.insert(name.into(), address.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadItem {
    pub code: ResponseCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<TagValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub items: BTreeMap<String, ReadItem>,
}

impl ReadResponse {
    pub fn value(&self, name: &str) -> Option<&TagValue> {
        self.items.get(name).and_then(|item| item.value.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteItem {
    pub address: String,
    pub value: TagValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub tags: BTreeMap<String, WriteItem>,
}

impl WriteRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(
        mut self,
        name: impl Into<String>,
        address: impl Into<String>,
        value: TagValue,
    ) -> Self {
        self.tags.insert(
            name.into(),
            WriteItem {
                address: address.into(),
                value,
            },
        );
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub codes: BTreeMap<String, ResponseCode>,
}

/// Query name -> browse expression understood by the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowseRequest {
    pub queries: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowseResponse {
    pub results: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub cycle_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    /// Tag name -> subscription handle id.
    pub handles: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnsubscriptionRequest {
    pub handles: Vec<String>,
}

/// Capabilities advertised by a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    pub can_read: bool,
    pub can_write: bool,
    pub can_subscribe: bool,
    pub can_browse: bool,
}

impl ConnectionMetadata {
    pub const NONE: ConnectionMetadata = ConnectionMetadata {
        can_read: false,
        can_write: false,
        can_subscribe: false,
        can_browse: false,
    };

    pub const ALL: ConnectionMetadata = ConnectionMetadata {
        can_read: true,
        can_write: true,
        can_subscribe: true,
        can_browse: true,
    };
}
