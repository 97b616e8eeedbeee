use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::entities::{Consumer, ConsumerGroup, Message, Partition, Topic};

/// Read-only view of a topic, its partitions and their messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMetadata {
    pub id: String,
    pub partitions: Vec<PartitionMetadata>,
    pub consumer_groups: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionMetadata {
    pub id: String,
    pub messages: Vec<MessageMetadata>,
    /// Consumer group id -> consumer currently assigned in that group
    pub assignments: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub offset: u64,
    pub id: String,
    pub key: Option<String>,
    pub producer: String,
    pub produced_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Read-only view of a consumer group and its consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerGroupMetadata {
    pub id: String,
    pub topic: String,
    pub rebalance_policy: String,
    pub consumers: Vec<ConsumerMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerMetadata {
    pub id: String,
    pub partitions: Vec<String>,
    pub consumed: Vec<String>,
}

impl From<&Topic> for TopicMetadata {
    fn from(topic: &Topic) -> Self {
        Self {
            id: topic.id.0.clone(),
            partitions: topic.partitions.iter().map(PartitionMetadata::from).collect(),
            consumer_groups: topic.consumer_groups.iter().map(|g| g.id.0.clone()).collect(),
            created_at: topic.created_at,
        }
    }
}

impl From<&Partition> for PartitionMetadata {
    fn from(partition: &Partition) -> Self {
        Self {
            id: partition.id.0.clone(),
            messages: partition
                .messages
                .iter()
                .enumerate()
                .map(|(offset, message)| MessageMetadata::new(offset as u64, message))
                .collect(),
            assignments: partition
                .assignments
                .iter()
                .map(|(group, consumer)| (group.0.clone(), consumer.0.clone()))
                .collect(),
        }
    }
}

impl MessageMetadata {
    fn new(offset: u64, message: &Message) -> Self {
        Self {
            offset,
            id: message.id().0.clone(),
            key: message.key().map(|k| k.0.clone()),
            producer: message.produced_by().0.clone(),
            produced_at: message.produced_at(),
            payload: message.payload.clone(),
        }
    }
}

impl From<&ConsumerGroup> for ConsumerGroupMetadata {
    fn from(group: &ConsumerGroup) -> Self {
        Self {
            id: group.id.0.clone(),
            topic: group.topic_id.0.clone(),
            rebalance_policy: group.rebalance_policy.to_string(),
            consumers: group.consumers.iter().map(ConsumerMetadata::from).collect(),
        }
    }
}

impl From<&Consumer> for ConsumerMetadata {
    fn from(consumer: &Consumer) -> Self {
        Self {
            id: consumer.id.0.clone(),
            partitions: consumer.partitions.iter().map(|p| p.0.clone()).collect(),
            consumed: consumer.consumed_ids().iter().map(|m| m.0.clone()).collect(),
        }
    }
}

impl fmt::Display for TopicMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Topic: {}", self.id)?;
        for partition in &self.partitions {
            writeln!(f, "\tPartition: {}", partition.id)?;
            for message in &partition.messages {
                writeln!(
                    f,
                    "\t\tMessage: {} (offset {}, from {})",
                    message.id, message.offset, message.producer
                )?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConsumerGroupMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ConsumerGroup: {} (topic {}, {})",
            self.id, self.topic, self.rebalance_policy
        )?;
        for consumer in &self.consumers {
            writeln!(f, "\tConsumer: {}", consumer.id)?;
            for partition in &consumer.partitions {
                writeln!(f, "\t\tPartition: {}", partition)?;
            }
        }
        Ok(())
    }
}
