use thiserror::Error;

use super::value_objects::*;

pub type Result<T> = std::result::Result<T, DomainError>;

/// Broad failure classes callers can branch on without matching every variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DuplicateIdentifier,
    MissingReference,
    PolicyViolation,
    AssignmentViolation,
    InvalidInput,
}

#[derive(Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("Topic '{0}' already exists")]
    TopicAlreadyExists(TopicId),

    #[error("Producer '{0}' already exists")]
    ProducerAlreadyExists(ProducerId),

    #[error("Partition '{partition}' already exists on topic '{topic}'")]
    PartitionAlreadyExists {
        topic: TopicId,
        partition: PartitionId,
    },

    #[error("Consumer group '{0}' already exists")]
    ConsumerGroupAlreadyExists(ConsumerGroupId),

    #[error("Consumer '{0}' already exists")]
    ConsumerAlreadyExists(ConsumerId),

    #[error("Topic '{0}' not found")]
    TopicNotFound(TopicId),

    #[error("Producer '{0}' not found")]
    ProducerNotFound(ProducerId),

    #[error("Partition '{partition}' does not exist on topic '{topic}'")]
    PartitionNotFound {
        topic: TopicId,
        partition: PartitionId,
    },

    #[error("Consumer group '{0}' not found")]
    ConsumerGroupNotFound(ConsumerGroupId),

    #[error("Consumer '{0}' not found")]
    ConsumerNotFound(ConsumerId),

    #[error("Topic '{0}' has no partitions to allocate to")]
    NoPartitions(TopicId),

    #[error("Producer '{0}' uses manual allocation but no partition was provided")]
    MissingRoutingKey(ProducerId),

    #[error("Producer '{producer}' uses random allocation but partition '{key}' was provided")]
    UnexpectedRoutingKey {
        producer: ProducerId,
        key: PartitionId,
    },

    #[error("Partition '{partition}' is not assigned to consumer '{consumer}'")]
    PartitionNotAssigned {
        consumer: ConsumerId,
        partition: PartitionId,
    },

    #[error("Invalid {kind} id '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Unknown policy: {0}")]
    InvalidPolicy(String),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::TopicAlreadyExists(_)
            | DomainError::ProducerAlreadyExists(_)
            | DomainError::PartitionAlreadyExists { .. }
            | DomainError::ConsumerGroupAlreadyExists(_)
            | DomainError::ConsumerAlreadyExists(_) => ErrorKind::DuplicateIdentifier,
            DomainError::TopicNotFound(_)
            | DomainError::ProducerNotFound(_)
            | DomainError::PartitionNotFound { .. }
            | DomainError::ConsumerGroupNotFound(_)
            | DomainError::ConsumerNotFound(_)
            | DomainError::NoPartitions(_) => ErrorKind::MissingReference,
            DomainError::MissingRoutingKey(_) | DomainError::UnexpectedRoutingKey { .. } => {
                ErrorKind::PolicyViolation
            }
            DomainError::PartitionNotAssigned { .. } => ErrorKind::AssignmentViolation,
            DomainError::InvalidIdentifier { .. } | DomainError::InvalidPolicy(_) => {
                ErrorKind::InvalidInput
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}
