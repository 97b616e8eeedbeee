use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{entities::*, errors::*, value_objects::*};

/// Service for routing messages to partitions
pub struct MessageRoutingService {
    rng: StdRng,
}

impl MessageRoutingService {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Router whose random choices are reproducible
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Resolve the partition a message belongs to.
    ///
    /// A keyed message goes to the partition named by its key, which must
    /// exist. An unkeyed message goes to a partition picked uniformly at
    /// random among the topic's current partitions.
    pub fn route_message(&mut self, message: &Message, topic: &Topic) -> Result<PartitionId> {
        match message.key() {
            Some(key) if topic.has_partition(key) => Ok(key.clone()),
            Some(key) => Err(DomainError::PartitionNotFound {
                topic: topic.id.clone(),
                partition: key.clone(),
            }),
            None => {
                let partition = topic
                    .partitions
                    .choose(&mut self.rng)
                    .ok_or_else(|| DomainError::NoPartitions(topic.id.clone()))?;
                debug!(
                    "Randomly routed message {} to partition {} of topic {}",
                    message.id(),
                    partition.id,
                    topic.id
                );
                Ok(partition.id.clone())
            }
        }
    }
}

impl Default for MessageRoutingService {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes partition-to-consumer plans for a rebalance
pub struct PartitionAssignor;

impl PartitionAssignor {
    /// Pair every partition with a consumer according to `policy`.
    ///
    /// Both slices are taken in their given order. No consumers means no
    /// assignments.
    pub fn assign(
        policy: RebalancePolicy,
        partitions: &[PartitionId],
        consumers: &[ConsumerId],
    ) -> Vec<(PartitionId, ConsumerId)> {
        if consumers.is_empty() {
            return Vec::new();
        }
        match policy {
            RebalancePolicy::Range => Self::range(partitions, consumers),
            RebalancePolicy::RoundRobin => Self::round_robin(partitions, consumers),
        }
    }

    /// Partition `i` goes to consumer `i mod |C|`.
    fn round_robin(
        partitions: &[PartitionId],
        consumers: &[ConsumerId],
    ) -> Vec<(PartitionId, ConsumerId)> {
        partitions
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), consumers[i % consumers.len()].clone()))
            .collect()
    }

    /// Consecutive runs of `floor(|P| / |C|)` partitions per consumer.
    ///
    /// The walk moves to the next consumer only once the current one holds
    /// exactly `share` partitions and never moves past the last consumer, so
    /// the remainder piles onto the last consumer reached. With `share == 0`
    /// every partition stays with the first consumer.
    fn range(partitions: &[PartitionId], consumers: &[ConsumerId]) -> Vec<(PartitionId, ConsumerId)> {
        let share = partitions.len() / consumers.len();
        let last = consumers.len() - 1;
        let mut current = 0;
        let mut given = 0;
        let mut plan = Vec::with_capacity(partitions.len());

        for partition in partitions {
            plan.push((partition.clone(), consumers[current].clone()));
            given += 1;
            if given == share && current < last {
                current += 1;
                given = 0;
            }
        }

        plan
    }
}
