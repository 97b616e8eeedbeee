use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::errors::{DomainError, Result};
use super::events::{GroupRebalanced, MessageConsumed};
use super::services::{MessageRoutingService, PartitionAssignor};
use super::value_objects::*;

/// A topic owns its partitions and the consumer groups reading from them
#[derive(Debug, Clone, Serialize)]
pub struct Topic {
    pub id: TopicId,
    pub partitions: Vec<Partition>,
    pub consumer_groups: Vec<ConsumerGroup>,
    pub created_at: DateTime<Utc>,
}

impl Topic {
    /// Create a topic with no partitions and no consumer groups
    pub fn new(id: TopicId) -> Self {
        Self {
            id,
            partitions: Vec::new(),
            consumer_groups: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn has_partition(&self, partition_id: &PartitionId) -> bool {
        self.get_partition(partition_id).is_some()
    }

    pub fn get_partition(&self, partition_id: &PartitionId) -> Option<&Partition> {
        self.partitions.iter().find(|p| &p.id == partition_id)
    }

    /// Partition ids in creation order
    pub fn partition_ids(&self) -> Vec<PartitionId> {
        self.partitions.iter().map(|p| p.id.clone()).collect()
    }

    /// Append a new empty partition. Callers are expected to rebalance afterwards.
    pub fn create_partition(&mut self, partition_id: PartitionId) -> Result<()> {
        if self.has_partition(&partition_id) {
            return Err(DomainError::PartitionAlreadyExists {
                topic: self.id.clone(),
                partition: partition_id,
            });
        }
        self.partitions.push(Partition::new(partition_id));
        Ok(())
    }

    pub fn get_consumer_group(&self, group_id: &ConsumerGroupId) -> Option<&ConsumerGroup> {
        self.consumer_groups.iter().find(|g| &g.id == group_id)
    }

    pub fn get_consumer_group_mut(&mut self, group_id: &ConsumerGroupId) -> Option<&mut ConsumerGroup> {
        self.consumer_groups.iter_mut().find(|g| &g.id == group_id)
    }

    pub fn add_consumer_group(&mut self, group_id: ConsumerGroupId, policy: RebalancePolicy) {
        self.consumer_groups
            .push(ConsumerGroup::new(group_id, self.id.clone(), policy));
    }

    /// Route a message to one of this topic's partitions and append it.
    ///
    /// Messages without a key get the id of the partition picked by the
    /// router as their key. Nothing is mutated if routing fails.
    pub fn add_message(
        &mut self,
        mut message: Message,
        router: &mut MessageRoutingService,
    ) -> Result<(PartitionId, Offset)> {
        let partition_id = router.route_message(&message, self)?;
        let partition = self
            .partitions
            .iter_mut()
            .find(|p| p.id == partition_id)
            .ok_or_else(|| DomainError::PartitionNotFound {
                topic: self.id.clone(),
                partition: partition_id.clone(),
            })?;

        if message.key.is_none() {
            message.assign_key(partition_id.clone());
        }
        let offset = partition.append_message(message);
        Ok((partition_id, offset))
    }

    /// Discard every assignment on this topic and recompute them group by group.
    pub fn rebalance(&mut self) -> Vec<GroupRebalanced> {
        let partition_ids = self.partition_ids();
        let mut outcomes = Vec::with_capacity(self.consumer_groups.len());

        for group in self.consumer_groups.iter_mut() {
            for partition in self.partitions.iter_mut() {
                partition.revoke_group(&group.id);
            }
            group.reset_assignments();

            let consumer_ids = group.consumer_ids();
            let plan = PartitionAssignor::assign(group.rebalance_policy, &partition_ids, &consumer_ids);

            for (partition_id, consumer_id) in &plan {
                if let Some(partition) = self.partitions.iter_mut().find(|p| &p.id == partition_id) {
                    partition.assign(group.id.clone(), consumer_id.clone());
                }
                if let Some(consumer) = group.consumer_mut(consumer_id) {
                    consumer.assign_partition(partition_id.clone());
                }
            }

            let outcome = GroupRebalanced::new(
                self.id.clone(),
                group.id.clone(),
                group.rebalance_policy,
                group
                    .consumers
                    .iter()
                    .map(|c| (c.id.clone(), c.partitions.clone()))
                    .collect(),
            );
            debug!("Rebalanced {}", outcome);
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Deliver the next message of `partition_id` that `consumer_id` has not seen yet.
    ///
    /// Returns `Ok(None)` when the consumer has already seen every message
    /// in the partition.
    pub fn consume(
        &mut self,
        group_id: &ConsumerGroupId,
        consumer_id: &ConsumerId,
        partition_id: &PartitionId,
    ) -> Result<Option<MessageConsumed>> {
        let partition = self
            .partitions
            .iter()
            .find(|p| &p.id == partition_id)
            .ok_or_else(|| DomainError::PartitionNotFound {
                topic: self.id.clone(),
                partition: partition_id.clone(),
            })?;

        if !partition.is_assigned_to(group_id, consumer_id) {
            return Err(DomainError::PartitionNotAssigned {
                consumer: consumer_id.clone(),
                partition: partition_id.clone(),
            });
        }

        let consumer = self
            .consumer_groups
            .iter_mut()
            .find(|g| &g.id == group_id)
            .and_then(|g| g.consumer_mut(consumer_id))
            .ok_or_else(|| DomainError::ConsumerNotFound(consumer_id.clone()))?;

        let Some((offset, message)) = partition.next_unconsumed(consumer) else {
            return Ok(None);
        };
        consumer.record_consumed(message.id().clone());

        Ok(Some(MessageConsumed::new(
            self.id.clone(),
            partition_id.clone(),
            offset,
            consumer_id.clone(),
            message.clone(),
        )))
    }

    /// Total number of messages across all partitions
    pub fn message_count(&self) -> usize {
        self.partitions.iter().map(|p| p.message_count()).sum()
    }
}

/// An append-only log of messages plus, per consumer group, the consumer
/// currently entitled to read it
#[derive(Debug, Clone, Serialize)]
pub struct Partition {
    pub id: PartitionId,
    pub messages: Vec<Message>,
    pub assignments: HashMap<ConsumerGroupId, ConsumerId>,
    pub created_at: DateTime<Utc>,
}

impl Partition {
    /// Create a new empty partition
    pub fn new(id: PartitionId) -> Self {
        Self {
            id,
            messages: Vec::new(),
            assignments: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Append a message to the partition and return its offset
    pub fn append_message(&mut self, message: Message) -> Offset {
        let offset = self.high_watermark();
        self.messages.push(message);
        offset
    }

    /// Offset the next appended message will get
    pub fn high_watermark(&self) -> Offset {
        Offset::new(self.messages.len() as u64)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn assigned_consumer(&self, group_id: &ConsumerGroupId) -> Option<&ConsumerId> {
        self.assignments.get(group_id)
    }

    pub fn is_assigned_to(&self, group_id: &ConsumerGroupId, consumer_id: &ConsumerId) -> bool {
        self.assigned_consumer(group_id) == Some(consumer_id)
    }

    pub fn assign(&mut self, group_id: ConsumerGroupId, consumer_id: ConsumerId) {
        self.assignments.insert(group_id, consumer_id);
    }

    pub fn revoke_group(&mut self, group_id: &ConsumerGroupId) {
        self.assignments.remove(group_id);
    }

    /// First message, in log order, whose id the consumer has not consumed
    pub fn next_unconsumed(&self, consumer: &Consumer) -> Option<(Offset, &Message)> {
        self.messages
            .iter()
            .enumerate()
            .find(|(_, m)| !consumer.has_consumed(m.id()))
            .map(|(i, m)| (Offset::new(i as u64), m))
    }
}

/// Metadata attached to every message at creation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub id: MessageId,
    /// Distinguishes log entries that share a caller-supplied id
    pub record_id: Uuid,
    pub source: ProducerId,
    pub created_at: DateTime<Utc>,
    pub payload_kind: PayloadKind,
}

/// A message is the fundamental unit of data that flows through the system
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub header: Header,
    pub key: Option<PartitionId>,
    pub payload: serde_json::Value,
}

impl Message {
    pub fn new(
        id: MessageId,
        source: ProducerId,
        key: Option<PartitionId>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            header: Header {
                id,
                record_id: Uuid::new_v4(),
                source,
                created_at: Utc::now(),
                payload_kind: PayloadKind::from(&payload),
            },
            key,
            payload,
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.header.id
    }

    pub fn key(&self) -> Option<&PartitionId> {
        self.key.as_ref()
    }

    pub fn produced_by(&self) -> &ProducerId {
        &self.header.source
    }

    pub fn produced_at(&self) -> DateTime<Utc> {
        self.header.created_at
    }

    fn assign_key(&mut self, key: PartitionId) {
        debug_assert!(self.key.is_none(), "routing key is set once");
        self.key = Some(key);
    }
}

/// A consumer reads from the partitions its group assigned to it and
/// remembers which message ids it has already seen
#[derive(Debug, Clone, Serialize)]
pub struct Consumer {
    pub id: ConsumerId,
    pub group_id: ConsumerGroupId,
    pub partitions: Vec<PartitionId>,
    consumed: Vec<MessageId>,
    #[serde(skip)]
    seen: HashSet<MessageId>,
}

impl Consumer {
    pub fn new(id: ConsumerId, group_id: ConsumerGroupId) -> Self {
        Self {
            id,
            group_id,
            partitions: Vec::new(),
            consumed: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn assign_partition(&mut self, partition_id: PartitionId) {
        self.partitions.push(partition_id);
    }

    pub fn reset_partitions(&mut self) {
        self.partitions.clear();
    }

    pub fn is_assigned(&self, partition_id: &PartitionId) -> bool {
        self.partitions.contains(partition_id)
    }

    pub fn has_consumed(&self, message_id: &MessageId) -> bool {
        self.seen.contains(message_id)
    }

    pub fn record_consumed(&mut self, message_id: MessageId) {
        self.seen.insert(message_id.clone());
        self.consumed.push(message_id);
    }

    /// Ids of consumed messages, oldest first
    pub fn consumed_ids(&self) -> &[MessageId] {
        &self.consumed
    }
}

/// A set of consumers sharing a topic under one rebalancing policy
#[derive(Debug, Clone, Serialize)]
pub struct ConsumerGroup {
    pub id: ConsumerGroupId,
    pub topic_id: TopicId,
    pub rebalance_policy: RebalancePolicy,
    pub consumers: Vec<Consumer>,
    pub created_at: DateTime<Utc>,
}

impl ConsumerGroup {
    pub fn new(id: ConsumerGroupId, topic_id: TopicId, rebalance_policy: RebalancePolicy) -> Self {
        Self {
            id,
            topic_id,
            rebalance_policy,
            consumers: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn contains(&self, consumer_id: &ConsumerId) -> bool {
        self.consumer(consumer_id).is_some()
    }

    pub fn consumer(&self, consumer_id: &ConsumerId) -> Option<&Consumer> {
        self.consumers.iter().find(|c| &c.id == consumer_id)
    }

    pub fn consumer_mut(&mut self, consumer_id: &ConsumerId) -> Option<&mut Consumer> {
        self.consumers.iter_mut().find(|c| &c.id == consumer_id)
    }

    /// Consumer ids in the order they joined
    pub fn consumer_ids(&self) -> Vec<ConsumerId> {
        self.consumers.iter().map(|c| c.id.clone()).collect()
    }

    pub fn add_consumer(&mut self, consumer_id: ConsumerId) {
        self.consumers
            .push(Consumer::new(consumer_id, self.id.clone()));
    }

    pub fn remove_consumer(&mut self, consumer_id: &ConsumerId) -> Option<Consumer> {
        let index = self.consumers.iter().position(|c| &c.id == consumer_id)?;
        Some(self.consumers.remove(index))
    }

    pub fn reset_assignments(&mut self) {
        self.consumers.iter_mut().for_each(Consumer::reset_partitions);
    }
}

/// A producer creates messages under a fixed allocation policy
#[derive(Debug, Clone, Serialize)]
pub struct Producer {
    pub id: ProducerId,
    pub allocation: AllocationPolicy,
    pub created_at: DateTime<Utc>,
    pub message_count: u64,
}

impl Producer {
    pub fn new(id: ProducerId, allocation: AllocationPolicy) -> Self {
        Self {
            id,
            allocation,
            created_at: Utc::now(),
            message_count: 0,
        }
    }

    /// Check an explicit routing key against the allocation policy
    pub fn check_allocation(&self, key: Option<&PartitionId>) -> Result<()> {
        match (self.allocation, key) {
            (AllocationPolicy::Manual, None) => Err(DomainError::MissingRoutingKey(self.id.clone())),
            (AllocationPolicy::Random, Some(key)) => Err(DomainError::UnexpectedRoutingKey {
                producer: self.id.clone(),
                key: key.clone(),
            }),
            _ => Ok(()),
        }
    }

    pub fn create_message(
        &self,
        payload: serde_json::Value,
        message_id: MessageId,
        key: Option<PartitionId>,
    ) -> Message {
        Message::new(message_id, self.id.clone(), key, payload)
    }

    /// Increment message count (called when a message is stored)
    pub fn increment_message_count(&mut self) {
        self.message_count += 1;
    }
}
