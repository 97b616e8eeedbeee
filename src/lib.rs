//! # Tributary
//!
//! In-memory control plane for a partitioned publish/consume message broker:
//! topics split into partitions, producers that route messages by an
//! allocation policy, and consumer groups whose partitions are rebalanced
//! whenever the topic or the group changes shape.
//!
//! ## Architecture
//!
//! - **Domain Layer**: entities, routing and assignment services, and the
//!   [`BrokerRegistry`] that exposes every broker operation
//! - **Application Layer**: async use cases over a registry shared behind a
//!   single lock, plus display views
//! - **Infrastructure Layer**: configuration and logging setup
//!
//! ## Usage
//!
//! ```rust
//! use serde_json::json;
//! use tributary::{AllocationPolicy, BrokerRegistry, RebalancePolicy};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut broker = BrokerRegistry::new();
//!     broker.create_topic("orders".into())?;
//!     broker.create_partition(&"orders".into(), "p0".into())?;
//!     broker.create_consumer_group("billing".into(), &"orders".into(), RebalancePolicy::Range)?;
//!     broker.create_consumer(&"billing".into(), "worker-1".into())?;
//!     broker.create_producer("web".into(), AllocationPolicy::Random)?;
//!
//!     let produced = broker.produce(&"web".into(), &"orders".into(), json!({"total": 42}), "order-1".into(), None)?;
//!     assert_eq!(produced.partition.as_str(), "p0");
//!
//!     let consumed = broker.consume(&"worker-1".into(), &"p0".into())?;
//!     assert_eq!(consumed.unwrap().message.payload, json!({"total": 42}));
//!     Ok(())
//! }
//! ```

pub mod domain;
pub mod application;
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::entities::{Consumer, ConsumerGroup, Message, Partition, Producer, Topic};
pub use domain::errors::{DomainError, ErrorKind};
pub use domain::registry::BrokerRegistry;
pub use domain::value_objects::{
    AllocationPolicy, ConsumerGroupId, ConsumerId, MessageId, PartitionId, ProducerId, RebalancePolicy, TopicId,
};
pub use application::use_cases::SharedRegistry;
pub use infrastructure::config::BrokerConfig;
