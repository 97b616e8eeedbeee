use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::DomainError;

const MAX_ID_LEN: usize = 255;

fn validate_identifier(kind: &'static str, value: &str) -> Result<(), DomainError> {
    let reason = if value.is_empty() {
        "cannot be empty"
    } else if value.len() > MAX_ID_LEN {
        "too long (max 255 characters)"
    } else if value.chars().any(char::is_whitespace) {
        "cannot contain whitespace"
    } else {
        return Ok(());
    };
    Err(DomainError::InvalidIdentifier {
        kind,
        value: value.to_string(),
        reason,
    })
}

/// Declares a string-backed identifier with validated and unchecked
/// constructors.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Build the identifier, rejecting empty, overlong or whitespace-bearing values.
            pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
                let id = id.into();
                validate_identifier($kind, &id)?;
                Ok($name(id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }
    };
}

string_id!(
    /// Globally unique name of a topic
    TopicId,
    "topic"
);
string_id!(
    /// Name of a partition, unique within its topic
    PartitionId,
    "partition"
);
string_id!(
    /// Globally unique name of a producer
    ProducerId,
    "producer"
);
string_id!(
    /// Name of a consumer group, unique across the broker
    ConsumerGroupId,
    "consumer group"
);
string_id!(
    /// Name of a consumer, unique across the broker
    ConsumerId,
    "consumer"
);
string_id!(
    /// Caller-supplied message identifier. Not unique: the same id may be
    /// produced any number of times.
    MessageId,
    "message"
);

/// Position of a message within a partition log
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Offset(pub u64);

impl Offset {
    pub fn new(value: u64) -> Self {
        Offset(value)
    }

    pub fn next(&self) -> Self {
        Offset(self.0 + 1)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Offset(value)
    }
}

/// How a producer chooses the partition for its messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// The caller names the partition on every produce
    Manual,
    /// The topic picks a partition uniformly at random
    Random,
}

impl fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationPolicy::Manual => write!(f, "manual"),
            AllocationPolicy::Random => write!(f, "random"),
        }
    }
}

impl FromStr for AllocationPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(AllocationPolicy::Manual),
            "random" => Ok(AllocationPolicy::Random),
            _ => Err(DomainError::InvalidPolicy(s.to_string())),
        }
    }
}

/// How a consumer group spreads its topic's partitions over its consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalancePolicy {
    /// Contiguous runs of partitions per consumer
    Range,
    /// Partitions dealt out to consumers in turn
    RoundRobin,
}

impl fmt::Display for RebalancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalancePolicy::Range => write!(f, "range"),
            RebalancePolicy::RoundRobin => write!(f, "roundrobin"),
        }
    }
}

impl FromStr for RebalancePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "range" => Ok(RebalancePolicy::Range),
            "roundrobin" | "round_robin" | "round-robin" => Ok(RebalancePolicy::RoundRobin),
            _ => Err(DomainError::InvalidPolicy(s.to_string())),
        }
    }
}

/// Shape of a message payload, recorded in the message header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl From<&serde_json::Value> for PayloadKind {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => PayloadKind::Null,
            serde_json::Value::Bool(_) => PayloadKind::Bool,
            serde_json::Value::Number(_) => PayloadKind::Number,
            serde_json::Value::String(_) => PayloadKind::String,
            serde_json::Value::Array(_) => PayloadKind::Array,
            serde_json::Value::Object(_) => PayloadKind::Object,
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadKind::Null => "null",
            PayloadKind::Bool => "bool",
            PayloadKind::Number => "number",
            PayloadKind::String => "string",
            PayloadKind::Array => "array",
            PayloadKind::Object => "object",
        };
        write!(f, "{}", name)
    }
}

/// A single produce call, as used by bulk produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProduceRequest {
    pub producer: ProducerId,
    pub topic: TopicId,
    pub payload: serde_json::Value,
    pub message_id: MessageId,
    pub key: Option<PartitionId>,
}

impl ProduceRequest {
    pub fn new(
        producer: impl Into<ProducerId>,
        topic: impl Into<TopicId>,
        payload: serde_json::Value,
        message_id: impl Into<MessageId>,
    ) -> Self {
        Self {
            producer: producer.into(),
            topic: topic.into(),
            payload,
            message_id: message_id.into(),
            key: None,
        }
    }

    /// Route to a named partition (required for manual producers)
    pub fn with_key(mut self, key: impl Into<PartitionId>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// A single consume call, as used by bulk consume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeRequest {
    pub consumer: ConsumerId,
    pub partition: PartitionId,
}

impl ConsumeRequest {
    pub fn new(consumer: impl Into<ConsumerId>, partition: impl Into<PartitionId>) -> Self {
        Self {
            consumer: consumer.into(),
            partition: partition.into(),
        }
    }
}
