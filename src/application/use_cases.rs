use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::dto::{ConsumerGroupMetadata, TopicMetadata};
use crate::domain::{errors::*, events::*, registry::BrokerRegistry, value_objects::*};

/// The registry behind a single lock: every operation, bulk ones included,
/// runs as one critical section
pub type SharedRegistry = Arc<Mutex<BrokerRegistry>>;

pub fn shared_registry(registry: BrokerRegistry) -> SharedRegistry {
    Arc::new(Mutex::new(registry))
}

fn log_rejection<T>(operation: &str, result: Result<T>) -> Result<T> {
    result.map_err(|e| {
        warn!("{} rejected: {}", operation, e);
        e
    })
}

/// Use case for managing topics and their partitions
pub struct TopicManagementUseCase {
    registry: SharedRegistry,
}

impl TopicManagementUseCase {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    pub async fn create_topic(&self, topic_id: String) -> Result<()> {
        let topic_id = TopicId::new(topic_id)?;
        let mut registry = self.registry.lock().await;
        log_rejection("create topic", registry.create_topic(topic_id))
    }

    pub async fn create_partition(
        &self,
        topic_id: String,
        partition_id: String,
    ) -> Result<Vec<GroupRebalanced>> {
        let topic_id = TopicId::new(topic_id)?;
        let partition_id = PartitionId::new(partition_id)?;
        let mut registry = self.registry.lock().await;
        log_rejection(
            "create partition",
            registry.create_partition(&topic_id, partition_id),
        )
    }

    /// Snapshot of a topic for display
    pub async fn show_topic(&self, topic_id: String) -> Result<TopicMetadata> {
        let topic_id = TopicId::from(topic_id);
        let registry = self.registry.lock().await;
        registry.topic(&topic_id).map(TopicMetadata::from)
    }

    pub async fn list_topics(&self) -> Vec<String> {
        let registry = self.registry.lock().await;
        registry.topics().map(|t| t.id.0.clone()).collect()
    }
}

/// Use case for registering producers and sending messages
pub struct ProducerUseCase {
    registry: SharedRegistry,
}

impl ProducerUseCase {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Register a producer; `allocation` is `manual` or `random`
    pub async fn create_producer(&self, producer_id: String, allocation: String) -> Result<()> {
        let producer_id = ProducerId::new(producer_id)?;
        let allocation: AllocationPolicy = allocation.parse()?;
        let mut registry = self.registry.lock().await;
        log_rejection("create producer", registry.create_producer(producer_id, allocation))
    }

    /// Send a single message to a topic
    pub async fn execute(
        &self,
        producer_id: String,
        topic_id: String,
        payload: serde_json::Value,
        message_id: String,
        partition_id: Option<String>,
    ) -> Result<MessageProduced> {
        let producer_id = ProducerId::from(producer_id);
        let topic_id = TopicId::from(topic_id);
        let message_id = MessageId::new(message_id)?;
        let key = partition_id.map(PartitionId::from);

        debug!("Producing message {} to topic {}", message_id, topic_id);
        let mut registry = self.registry.lock().await;
        log_rejection(
            "produce",
            registry.produce(&producer_id, &topic_id, payload, message_id, key),
        )
    }

    /// Send several messages in order under one lock
    pub async fn execute_batch(&self, requests: Vec<ProduceRequest>) -> Result<Vec<MessageProduced>> {
        info!("Producing {} messages", requests.len());
        let mut registry = self.registry.lock().await;
        log_rejection("batch produce", registry.produce_batch(requests))
    }
}

/// Use case for managing consumer groups and their members
pub struct ConsumerGroupUseCase {
    registry: SharedRegistry,
}

impl ConsumerGroupUseCase {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Create a group on a topic; `rebalance` is `range` or `roundrobin`
    pub async fn create_group(&self, group_id: String, topic_id: String, rebalance: String) -> Result<()> {
        let group_id = ConsumerGroupId::new(group_id)?;
        let topic_id = TopicId::from(topic_id);
        let policy: RebalancePolicy = rebalance.parse()?;
        let mut registry = self.registry.lock().await;
        log_rejection(
            "create consumer group",
            registry.create_consumer_group(group_id, &topic_id, policy),
        )
    }

    pub async fn create_consumer(
        &self,
        group_id: String,
        consumer_id: String,
    ) -> Result<Vec<GroupRebalanced>> {
        let group_id = ConsumerGroupId::from(group_id);
        let consumer_id = ConsumerId::new(consumer_id)?;
        let mut registry = self.registry.lock().await;
        log_rejection("create consumer", registry.create_consumer(&group_id, consumer_id))
    }

    pub async fn delete_consumer(&self, consumer_id: String) -> Result<Vec<GroupRebalanced>> {
        let consumer_id = ConsumerId::from(consumer_id);
        let mut registry = self.registry.lock().await;
        log_rejection("delete consumer", registry.delete_consumer(&consumer_id))
    }

    /// Snapshot of a consumer group for display
    pub async fn show_group(&self, group_id: String) -> Result<ConsumerGroupMetadata> {
        let group_id = ConsumerGroupId::from(group_id);
        let registry = self.registry.lock().await;
        registry
            .consumer_group(&group_id)
            .map(ConsumerGroupMetadata::from)
    }
}

/// Use case for consuming messages from assigned partitions
pub struct ConsumeUseCase {
    registry: SharedRegistry,
}

impl ConsumeUseCase {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Consume the next unseen message; `None` when there is nothing new
    pub async fn execute(
        &self,
        consumer_id: String,
        partition_id: String,
    ) -> Result<Option<MessageConsumed>> {
        let consumer_id = ConsumerId::from(consumer_id);
        let partition_id = PartitionId::from(partition_id);
        let mut registry = self.registry.lock().await;
        log_rejection("consume", registry.consume(&consumer_id, &partition_id))
    }

    /// Consume up to `count` messages from one partition
    pub async fn execute_many(
        &self,
        consumer_id: String,
        partition_id: String,
        count: usize,
    ) -> Result<Vec<MessageConsumed>> {
        let consumer_id = ConsumerId::from(consumer_id);
        let partition_id = PartitionId::from(partition_id);

        info!(
            "Consumer {} requesting {} messages from partition {}",
            consumer_id, count, partition_id
        );
        let mut registry = self.registry.lock().await;
        let consumed = log_rejection(
            "consume",
            registry.consume_many(&consumer_id, &partition_id, count),
        )?;
        debug!("Delivered {} messages to consumer {}", consumed.len(), consumer_id);
        Ok(consumed)
    }

    pub async fn execute_batch(&self, requests: Vec<ConsumeRequest>) -> Result<Vec<Option<MessageConsumed>>> {
        let mut registry = self.registry.lock().await;
        log_rejection("batch consume", registry.consume_batch(requests))
    }
}
