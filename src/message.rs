use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sender id used for messages the coordinator itself originates.
pub const SYSTEM_SENDER: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Task,
    Response,
    #[default]
    Info,
    Query,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Task => "task",
            MessageType::Response => "response",
            MessageType::Info => "info",
            MessageType::Query => "query",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of one agent addressing others.
///
/// Recording a message in a swarm ledger does not deliver it anywhere; an
/// empty recipient list marks it as a broadcast to everyone but the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    sender_id: String,
    #[serde(default)]
    recipient_ids: Vec<String>,
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(rename = "type", default)]
    kind: MessageType,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

impl Message {
    /// Build an `info` message with no metadata.
    pub fn new<I, S>(sender: impl Into<String>, recipients: I, content: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder(sender, content).recipients(recipients).build()
    }

    /// Build an `info` message addressed to nobody in particular.
    pub fn broadcast(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::builder(sender, content).build()
    }

    pub fn builder(sender: impl Into<String>, content: impl Into<String>) -> MessageBuilder {
        MessageBuilder {
            sender_id: sender.into(),
            recipient_ids: Vec::new(),
            content: content.into(),
            kind: MessageType::default(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn recipient_ids(&self) -> &[String] {
        &self.recipient_ids
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient_ids.is_empty()
    }
}

/// Collects the parts of a [`Message`]; `build` stamps the id and timestamp.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    sender_id: String,
    recipient_ids: Vec<String>,
    content: String,
    kind: MessageType,
    metadata: BTreeMap<String, Value>,
}

impl MessageBuilder {
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipient_ids.push(recipient.into());
        self
    }

    pub fn recipients<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipient_ids
            .extend(recipients.into_iter().map(Into::into));
        self
    }

    pub fn kind(mut self, kind: MessageType) -> Self {
        self.kind = kind;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Message {
        Message {
            id: new_message_id(),
            sender_id: self.sender_id,
            recipient_ids: self.recipient_ids,
            content: self.content,
            timestamp: Utc::now(),
            kind: self.kind,
            metadata: self.metadata,
        }
    }
}

/// 128 bits from the OS CSPRNG, hex encoded.
pub fn new_message_id() -> String {
    let mut bytes = [0_u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
