use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::entities::Message;
use super::value_objects::*;

/// Emitted when a message is appended to a partition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageProduced {
    pub topic: TopicId,
    pub partition: PartitionId,
    pub offset: Offset,
    pub message_id: MessageId,
    pub producer_id: ProducerId,
    pub timestamp: DateTime<Utc>,
}

impl MessageProduced {
    pub fn new(
        topic: TopicId,
        partition: PartitionId,
        offset: Offset,
        message_id: MessageId,
        producer_id: ProducerId,
    ) -> Self {
        Self {
            topic,
            partition,
            offset,
            message_id,
            producer_id,
            timestamp: Utc::now(),
        }
    }
}

/// Emitted when a consumer is handed a message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageConsumed {
    pub topic: TopicId,
    pub partition: PartitionId,
    pub offset: Offset,
    pub consumer_id: ConsumerId,
    pub message: Message,
    pub timestamp: DateTime<Utc>,
}

impl MessageConsumed {
    pub fn new(
        topic: TopicId,
        partition: PartitionId,
        offset: Offset,
        consumer_id: ConsumerId,
        message: Message,
    ) -> Self {
        Self {
            topic,
            partition,
            offset,
            consumer_id,
            message,
            timestamp: Utc::now(),
        }
    }

    pub fn message_id(&self) -> &MessageId {
        self.message.id()
    }
}

/// Result of recomputing one consumer group's assignment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRebalanced {
    pub topic: TopicId,
    pub group: ConsumerGroupId,
    pub policy: RebalancePolicy,
    /// Every consumer of the group with its partitions, in join order
    pub assignments: Vec<(ConsumerId, Vec<PartitionId>)>,
    pub timestamp: DateTime<Utc>,
}

impl GroupRebalanced {
    pub fn new(
        topic: TopicId,
        group: ConsumerGroupId,
        policy: RebalancePolicy,
        assignments: Vec<(ConsumerId, Vec<PartitionId>)>,
    ) -> Self {
        Self {
            topic,
            group,
            policy,
            assignments,
            timestamp: Utc::now(),
        }
    }

    /// Partitions assigned to `consumer`, empty if it is not in the group
    pub fn partitions_of(&self, consumer: &ConsumerId) -> &[PartitionId] {
        self.assignments
            .iter()
            .find(|(c, _)| c == consumer)
            .map(|(_, partitions)| partitions.as_slice())
            .unwrap_or(&[])
    }
}

impl fmt::Display for GroupRebalanced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({}):", self.topic, self.group, self.policy)?;
        if self.assignments.is_empty() {
            return write!(f, " no consumers");
        }
        for (consumer, partitions) in &self.assignments {
            let names: Vec<&str> = partitions.iter().map(PartitionId::as_str).collect();
            write!(f, " {}=[{}]", consumer, names.join(","))?;
        }
        Ok(())
    }
}
