use log::{debug, info};
use std::collections::{BTreeMap, HashMap};

use super::{entities::*, errors::*, events::*, services::MessageRoutingService, value_objects::*};

/// Where a consumer lives, kept so lookups never scan every topic
#[derive(Debug, Clone)]
struct ConsumerLocation {
    topic: TopicId,
    group: ConsumerGroupId,
}

/// Top-level catalog of topics and producers.
///
/// Every operation validates the identifiers it references before
/// touching any state, so a failed call leaves the registry unchanged.
/// Structural changes to a topic (new partition, consumer joining or
/// leaving) rebalance every consumer group of that topic before returning.
pub struct BrokerRegistry {
    topics: BTreeMap<TopicId, Topic>,
    producers: BTreeMap<ProducerId, Producer>,
    group_index: HashMap<ConsumerGroupId, TopicId>,
    consumer_index: HashMap<ConsumerId, ConsumerLocation>,
    router: MessageRoutingService,
}

impl BrokerRegistry {
    pub fn new() -> Self {
        Self::with_router(MessageRoutingService::new())
    }

    pub fn with_router(router: MessageRoutingService) -> Self {
        Self {
            topics: BTreeMap::new(),
            producers: BTreeMap::new(),
            group_index: HashMap::new(),
            consumer_index: HashMap::new(),
            router,
        }
    }

    pub fn create_topic(&mut self, topic_id: TopicId) -> Result<()> {
        if self.topics.contains_key(&topic_id) {
            return Err(DomainError::TopicAlreadyExists(topic_id));
        }

        info!("Created topic {}", topic_id);
        self.topics.insert(topic_id.clone(), Topic::new(topic_id));
        Ok(())
    }

    pub fn create_producer(&mut self, producer_id: ProducerId, allocation: AllocationPolicy) -> Result<()> {
        if self.producers.contains_key(&producer_id) {
            return Err(DomainError::ProducerAlreadyExists(producer_id));
        }

        info!("Created producer {} with {} allocation", producer_id, allocation);
        self.producers
            .insert(producer_id.clone(), Producer::new(producer_id, allocation));
        Ok(())
    }

    /// Add a partition to a topic and rebalance that topic
    pub fn create_partition(
        &mut self,
        topic_id: &TopicId,
        partition_id: PartitionId,
    ) -> Result<Vec<GroupRebalanced>> {
        let topic = self.topic_mut(topic_id)?;
        topic.create_partition(partition_id.clone())?;
        info!("Created partition {} on topic {}", partition_id, topic_id);
        Ok(topic.rebalance())
    }

    pub fn create_consumer_group(
        &mut self,
        group_id: ConsumerGroupId,
        topic_id: &TopicId,
        policy: RebalancePolicy,
    ) -> Result<()> {
        if !self.topics.contains_key(topic_id) {
            return Err(DomainError::TopicNotFound(topic_id.clone()));
        }
        if self.group_index.contains_key(&group_id) {
            return Err(DomainError::ConsumerGroupAlreadyExists(group_id));
        }

        let topic = self.topic_mut(topic_id)?;
        topic.add_consumer_group(group_id.clone(), policy);
        info!(
            "Created consumer group {} on topic {} with {} rebalancing",
            group_id, topic_id, policy
        );
        self.group_index.insert(group_id, topic_id.clone());
        Ok(())
    }

    /// Add a consumer to a group and rebalance the group's topic
    pub fn create_consumer(
        &mut self,
        group_id: &ConsumerGroupId,
        consumer_id: ConsumerId,
    ) -> Result<Vec<GroupRebalanced>> {
        let topic_id = self
            .group_index
            .get(group_id)
            .cloned()
            .ok_or_else(|| DomainError::ConsumerGroupNotFound(group_id.clone()))?;
        if self.consumer_index.contains_key(&consumer_id) {
            return Err(DomainError::ConsumerAlreadyExists(consumer_id));
        }

        let topic = self.topic_mut(&topic_id)?;
        topic
            .get_consumer_group_mut(group_id)
            .ok_or_else(|| DomainError::ConsumerGroupNotFound(group_id.clone()))?
            .add_consumer(consumer_id.clone());
        let outcome = topic.rebalance();

        info!("Created consumer {} in group {}", consumer_id, group_id);
        self.consumer_index.insert(
            consumer_id,
            ConsumerLocation {
                topic: topic_id,
                group: group_id.clone(),
            },
        );
        Ok(outcome)
    }

    /// Remove a consumer from its group and rebalance the group's topic
    pub fn delete_consumer(&mut self, consumer_id: &ConsumerId) -> Result<Vec<GroupRebalanced>> {
        let location = self
            .consumer_index
            .get(consumer_id)
            .cloned()
            .ok_or_else(|| DomainError::ConsumerNotFound(consumer_id.clone()))?;

        let topic = self.topic_mut(&location.topic)?;
        topic
            .get_consumer_group_mut(&location.group)
            .and_then(|group| group.remove_consumer(consumer_id))
            .ok_or_else(|| DomainError::ConsumerNotFound(consumer_id.clone()))?;
        let outcome = topic.rebalance();

        info!("Deleted consumer {} from group {}", consumer_id, location.group);
        self.consumer_index.remove(consumer_id);
        Ok(outcome)
    }

    /// Create a message and append it to one of the topic's partitions.
    ///
    /// Manual producers must name the partition in `key`; random producers
    /// must not.
    pub fn produce(
        &mut self,
        producer_id: &ProducerId,
        topic_id: &TopicId,
        payload: serde_json::Value,
        message_id: MessageId,
        key: Option<PartitionId>,
    ) -> Result<MessageProduced> {
        let producer = self
            .producers
            .get_mut(producer_id)
            .ok_or_else(|| DomainError::ProducerNotFound(producer_id.clone()))?;
        let topic = self
            .topics
            .get_mut(topic_id)
            .ok_or_else(|| DomainError::TopicNotFound(topic_id.clone()))?;
        producer.check_allocation(key.as_ref())?;

        let message = producer.create_message(payload, message_id.clone(), key);
        let (partition, offset) = topic.add_message(message, &mut self.router)?;
        producer.increment_message_count();

        info!(
            "Message {} from {} added to partition {} of topic {} at offset {}",
            message_id, producer_id, partition, topic_id, offset
        );
        Ok(MessageProduced::new(
            topic_id.clone(),
            partition,
            offset,
            message_id,
            producer_id.clone(),
        ))
    }

    /// Apply produce requests in order, stopping at the first failure.
    /// Requests applied before the failure stay applied.
    pub fn produce_batch(&mut self, requests: Vec<ProduceRequest>) -> Result<Vec<MessageProduced>> {
        debug!("Producing batch of {} messages", requests.len());
        let mut produced = Vec::with_capacity(requests.len());
        for request in requests {
            produced.push(self.produce(
                &request.producer,
                &request.topic,
                request.payload,
                request.message_id,
                request.key,
            )?);
        }
        Ok(produced)
    }

    /// Hand the consumer the next message it has not seen on `partition_id`.
    ///
    /// `Ok(None)` means there was nothing left to consume.
    pub fn consume(
        &mut self,
        consumer_id: &ConsumerId,
        partition_id: &PartitionId,
    ) -> Result<Option<MessageConsumed>> {
        let location = self
            .consumer_index
            .get(consumer_id)
            .ok_or_else(|| DomainError::ConsumerNotFound(consumer_id.clone()))?;
        let topic = self
            .topics
            .get_mut(&location.topic)
            .ok_or_else(|| DomainError::TopicNotFound(location.topic.clone()))?;

        let consumed = topic.consume(&location.group, consumer_id, partition_id)?;
        match &consumed {
            Some(event) => info!(
                "Consumer {} consumed message {} from partition {}",
                consumer_id,
                event.message_id(),
                partition_id
            ),
            None => debug!(
                "Consumer {} has nothing left to consume on partition {}",
                consumer_id, partition_id
            ),
        }
        Ok(consumed)
    }

    /// Consume up to `count` messages from one partition, stopping early
    /// once the consumer has seen everything
    pub fn consume_many(
        &mut self,
        consumer_id: &ConsumerId,
        partition_id: &PartitionId,
        count: usize,
    ) -> Result<Vec<MessageConsumed>> {
        let mut consumed = Vec::with_capacity(count);
        for _ in 0..count {
            match self.consume(consumer_id, partition_id)? {
                Some(event) => consumed.push(event),
                None => break,
            }
        }
        Ok(consumed)
    }

    /// Apply consume requests in order, stopping at the first failure.
    /// Deliveries made before the failure are kept.
    pub fn consume_batch(&mut self, requests: Vec<ConsumeRequest>) -> Result<Vec<Option<MessageConsumed>>> {
        debug!("Consuming batch of {} requests", requests.len());
        requests
            .iter()
            .map(|request| self.consume(&request.consumer, &request.partition))
            .collect()
    }

    pub fn topic(&self, topic_id: &TopicId) -> Result<&Topic> {
        self.topics
            .get(topic_id)
            .ok_or_else(|| DomainError::TopicNotFound(topic_id.clone()))
    }

    /// All topics, ordered by id
    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics.values()
    }

    pub fn producer(&self, producer_id: &ProducerId) -> Result<&Producer> {
        self.producers
            .get(producer_id)
            .ok_or_else(|| DomainError::ProducerNotFound(producer_id.clone()))
    }

    pub fn consumer_group(&self, group_id: &ConsumerGroupId) -> Result<&ConsumerGroup> {
        self.group_index
            .get(group_id)
            .and_then(|topic_id| self.topics.get(topic_id))
            .and_then(|topic| topic.get_consumer_group(group_id))
            .ok_or_else(|| DomainError::ConsumerGroupNotFound(group_id.clone()))
    }

    pub fn consumer(&self, consumer_id: &ConsumerId) -> Result<&Consumer> {
        self.consumer_index
            .get(consumer_id)
            .and_then(|location| self.consumer_group(&location.group).ok())
            .and_then(|group| group.consumer(consumer_id))
            .ok_or_else(|| DomainError::ConsumerNotFound(consumer_id.clone()))
    }

    fn topic_mut(&mut self, topic_id: &TopicId) -> Result<&mut Topic> {
        self.topics
            .get_mut(topic_id)
            .ok_or_else(|| DomainError::TopicNotFound(topic_id.clone()))
    }
}

impl Default for BrokerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
