//! Registry behaviour: creation rules, routing, consumption and rebalancing

use serde_json::json;
use tributary::domain::errors::{DomainError, ErrorKind};
use tributary::domain::registry::BrokerRegistry;
use tributary::domain::services::MessageRoutingService;
use tributary::domain::value_objects::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn registry() -> BrokerRegistry {
    init();
    BrokerRegistry::with_router(MessageRoutingService::with_seed(17))
}

/// Topic with the given partitions and one consumer group holding the given consumers
fn topic_with_group(
    registry: &mut BrokerRegistry,
    topic: &str,
    partitions: &[&str],
    group: &str,
    policy: RebalancePolicy,
    consumers: &[&str],
) {
    registry.create_topic(topic.into()).unwrap();
    for p in partitions {
        registry.create_partition(&topic.into(), (*p).into()).unwrap();
    }
    registry
        .create_consumer_group(group.into(), &topic.into(), policy)
        .unwrap();
    for c in consumers {
        registry.create_consumer(&group.into(), (*c).into()).unwrap();
    }
}

fn assigned(registry: &BrokerRegistry, consumer: &str) -> Vec<String> {
    registry
        .consumer(&consumer.into())
        .unwrap()
        .partitions
        .iter()
        .map(|p| p.0.clone())
        .collect()
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let mut registry = registry();
    topic_with_group(&mut registry, "orders", &["p0"], "g1", RebalancePolicy::Range, &["c1"]);
    registry
        .create_producer("prod".into(), AllocationPolicy::Random)
        .unwrap();

    let errors = vec![
        registry.create_topic("orders".into()).unwrap_err(),
        registry
            .create_producer("prod".into(), AllocationPolicy::Manual)
            .unwrap_err(),
        registry
            .create_partition(&"orders".into(), "p0".into())
            .unwrap_err(),
        registry
            .create_consumer_group("g1".into(), &"orders".into(), RebalancePolicy::RoundRobin)
            .unwrap_err(),
        registry.create_consumer(&"g1".into(), "c1".into()).unwrap_err(),
    ];
    for error in &errors {
        assert_eq!(error.kind(), ErrorKind::DuplicateIdentifier, "{}", error);
    }

    // Nothing changed
    let topic = registry.topic(&"orders".into()).unwrap();
    assert_eq!(topic.partitions.len(), 1);
    assert_eq!(topic.consumer_groups.len(), 1);
    assert_eq!(topic.consumer_groups[0].consumers.len(), 1);
    assert_eq!(topic.consumer_groups[0].rebalance_policy, RebalancePolicy::Range);
    assert_eq!(
        registry.producer(&"prod".into()).unwrap().allocation,
        AllocationPolicy::Random
    );
}

#[test]
fn test_group_and_consumer_ids_are_global() {
    let mut registry = registry();
    topic_with_group(&mut registry, "a", &["p0"], "g1", RebalancePolicy::Range, &["c1"]);
    registry.create_topic("b".into()).unwrap();

    let err = registry
        .create_consumer_group("g1".into(), &"b".into(), RebalancePolicy::Range)
        .unwrap_err();
    assert_eq!(err, DomainError::ConsumerGroupAlreadyExists("g1".into()));

    registry
        .create_consumer_group("g2".into(), &"b".into(), RebalancePolicy::Range)
        .unwrap();
    let err = registry.create_consumer(&"g2".into(), "c1".into()).unwrap_err();
    assert_eq!(err, DomainError::ConsumerAlreadyExists("c1".into()));
}

#[test]
fn test_missing_references() {
    let mut registry = registry();
    assert_eq!(
        registry.create_partition(&"nope".into(), "p0".into()).unwrap_err(),
        DomainError::TopicNotFound("nope".into())
    );
    assert_eq!(
        registry
            .create_consumer_group("g".into(), &"nope".into(), RebalancePolicy::Range)
            .unwrap_err(),
        DomainError::TopicNotFound("nope".into())
    );
    assert_eq!(
        registry.create_consumer(&"g".into(), "c".into()).unwrap_err(),
        DomainError::ConsumerGroupNotFound("g".into())
    );
    assert_eq!(
        registry.delete_consumer(&"c".into()).unwrap_err(),
        DomainError::ConsumerNotFound("c".into())
    );
    assert_eq!(
        registry.consume(&"c".into(), &"p0".into()).unwrap_err(),
        DomainError::ConsumerNotFound("c".into())
    );
    assert_eq!(
        registry.topic(&"nope".into()).unwrap_err().kind(),
        ErrorKind::MissingReference
    );
    assert_eq!(
        registry.consumer_group(&"g".into()).unwrap_err().kind(),
        ErrorKind::MissingReference
    );
}

#[test]
fn test_random_produce_picks_an_existing_partition() {
    let mut registry = registry();
    registry.create_topic("orders".into()).unwrap();
    for p in ["p0", "p1", "p2"] {
        registry.create_partition(&"orders".into(), p.into()).unwrap();
    }
    registry
        .create_producer("prod".into(), AllocationPolicy::Random)
        .unwrap();

    for i in 0..50 {
        let produced = registry
            .produce(
                &"prod".into(),
                &"orders".into(),
                json!({ "n": i }),
                format!("m{}", i).into(),
                None,
            )
            .unwrap();
        assert!(["p0", "p1", "p2"].contains(&produced.partition.as_str()));

        let topic = registry.topic(&"orders".into()).unwrap();
        let partition = topic.get_partition(&produced.partition).unwrap();
        let stored = &partition.messages[produced.offset.value() as usize];
        assert_eq!(stored.key(), Some(&produced.partition));
        assert_eq!(stored.produced_by().as_str(), "prod");
    }
    assert_eq!(registry.topic(&"orders".into()).unwrap().message_count(), 50);
    assert_eq!(registry.producer(&"prod".into()).unwrap().message_count, 50);
}

#[test]
fn test_seeded_routing_is_reproducible() {
    let route = |seed| {
        let mut registry = BrokerRegistry::with_router(MessageRoutingService::with_seed(seed));
        registry.create_topic("t".into()).unwrap();
        for p in ["p0", "p1", "p2", "p3"] {
            registry.create_partition(&"t".into(), p.into()).unwrap();
        }
        registry.create_producer("r".into(), AllocationPolicy::Random).unwrap();
        (0..20)
            .map(|i| {
                registry
                    .produce(&"r".into(), &"t".into(), json!(i), "m".into(), None)
                    .unwrap()
                    .partition
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(route(99), route(99));
}

#[test]
fn test_random_produce_without_partitions_fails() {
    let mut registry = registry();
    registry.create_topic("empty".into()).unwrap();
    registry.create_producer("r".into(), AllocationPolicy::Random).unwrap();

    let err = registry
        .produce(&"r".into(), &"empty".into(), json!(1), "m".into(), None)
        .unwrap_err();
    assert_eq!(err, DomainError::NoPartitions("empty".into()));
    assert_eq!(err.kind(), ErrorKind::MissingReference);
}

#[test]
fn test_allocation_policy_is_enforced() {
    let mut registry = registry();
    registry.create_topic("t".into()).unwrap();
    registry.create_partition(&"t".into(), "p0".into()).unwrap();
    registry.create_producer("man".into(), AllocationPolicy::Manual).unwrap();
    registry.create_producer("rnd".into(), AllocationPolicy::Random).unwrap();

    let err = registry
        .produce(&"man".into(), &"t".into(), json!("x"), "m1".into(), None)
        .unwrap_err();
    assert_eq!(err, DomainError::MissingRoutingKey("man".into()));
    assert_eq!(err.kind(), ErrorKind::PolicyViolation);

    let err = registry
        .produce(&"rnd".into(), &"t".into(), json!("x"), "m1".into(), Some("p0".into()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PolicyViolation);

    assert_eq!(registry.topic(&"t".into()).unwrap().message_count(), 0);
}

#[test]
fn test_manual_produce_to_unknown_partition_appends_nothing() {
    let mut registry = registry();
    registry.create_topic("t".into()).unwrap();
    registry.create_partition(&"t".into(), "p0".into()).unwrap();
    registry.create_producer("man".into(), AllocationPolicy::Manual).unwrap();

    let err = registry
        .produce(&"man".into(), &"t".into(), json!("x"), "m1".into(), Some("p9".into()))
        .unwrap_err();
    assert_eq!(
        err,
        DomainError::PartitionNotFound {
            topic: "t".into(),
            partition: "p9".into()
        }
    );
    assert_eq!(err.kind(), ErrorKind::MissingReference);
    assert_eq!(registry.topic(&"t".into()).unwrap().message_count(), 0);
    assert_eq!(registry.producer(&"man".into()).unwrap().message_count, 0);
}

#[test]
fn test_produce_checks_producer_and_topic() {
    let mut registry = registry();
    registry.create_topic("t".into()).unwrap();
    registry.create_producer("man".into(), AllocationPolicy::Manual).unwrap();

    let err = registry
        .produce(&"ghost".into(), &"t".into(), json!(1), "m".into(), Some("p0".into()))
        .unwrap_err();
    assert_eq!(err, DomainError::ProducerNotFound("ghost".into()));

    let err = registry
        .produce(&"man".into(), &"ghost".into(), json!(1), "m".into(), Some("p0".into()))
        .unwrap_err();
    assert_eq!(err, DomainError::TopicNotFound("ghost".into()));
}

#[test]
fn test_consume_once_then_nothing() {
    let mut registry = registry();
    topic_with_group(&mut registry, "t", &["p0"], "g", RebalancePolicy::Range, &["c1"]);
    registry.create_producer("man".into(), AllocationPolicy::Manual).unwrap();
    registry
        .produce(&"man".into(), &"t".into(), json!({"a": 1}), "m1".into(), Some("p0".into()))
        .unwrap();

    let first = registry.consume(&"c1".into(), &"p0".into()).unwrap().unwrap();
    assert_eq!(first.message_id().as_str(), "m1");
    assert_eq!(first.message.payload, json!({"a": 1}));
    assert_eq!(first.offset, Offset::new(0));

    assert!(registry.consume(&"c1".into(), &"p0".into()).unwrap().is_none());
    assert_eq!(
        registry.consumer(&"c1".into()).unwrap().consumed_ids(),
        &[MessageId::from("m1")]
    );
}

#[test]
fn test_consume_follows_produce_order() {
    let mut registry = registry();
    topic_with_group(&mut registry, "t", &["p0"], "g", RebalancePolicy::Range, &["c1"]);
    registry.create_producer("man".into(), AllocationPolicy::Manual).unwrap();
    for id in ["a", "b", "c"] {
        registry
            .produce(&"man".into(), &"t".into(), json!(id), id.into(), Some("p0".into()))
            .unwrap();
    }

    let consumed = registry.consume_many(&"c1".into(), &"p0".into(), 10).unwrap();
    let ids: Vec<&str> = consumed.iter().map(|e| e.message_id().as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn test_consume_requires_assignment() {
    let mut registry = registry();
    topic_with_group(&mut registry, "t", &["p0", "p1"], "g", RebalancePolicy::RoundRobin, &["c1", "c2"]);

    let err = registry.consume(&"c1".into(), &"p1".into()).unwrap_err();
    assert_eq!(
        err,
        DomainError::PartitionNotAssigned {
            consumer: "c1".into(),
            partition: "p1".into()
        }
    );
    assert_eq!(err.kind(), ErrorKind::AssignmentViolation);

    let err = registry.consume(&"c1".into(), &"p7".into()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingReference);
}

#[test]
fn test_duplicate_message_ids_are_distinct_entries_but_deduplicated_per_consumer() {
    let mut registry = registry();
    topic_with_group(&mut registry, "t", &["p0"], "g1", RebalancePolicy::Range, &["c1"]);
    registry
        .create_consumer_group("g2".into(), &"t".into(), RebalancePolicy::Range)
        .unwrap();
    registry.create_consumer(&"g2".into(), "c2".into()).unwrap();
    registry.create_producer("man".into(), AllocationPolicy::Manual).unwrap();

    registry
        .produce(&"man".into(), &"t".into(), json!(1), "dup".into(), Some("p0".into()))
        .unwrap();
    registry
        .produce(&"man".into(), &"t".into(), json!(2), "dup".into(), Some("p0".into()))
        .unwrap();

    let partition = registry.topic(&"t".into()).unwrap().get_partition(&"p0".into()).unwrap();
    assert_eq!(partition.message_count(), 2);
    assert_ne!(
        partition.messages[0].header.record_id,
        partition.messages[1].header.record_id
    );

    // The second entry shares an id with the first, so each consumer sees only one
    let delivered = registry.consume_many(&"c1".into(), &"p0".into(), 5).unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].message.payload, json!(1));

    // Dedup is per consumer: another group's consumer still gets it
    let other = registry.consume(&"c2".into(), &"p0".into()).unwrap().unwrap();
    assert_eq!(other.message_id().as_str(), "dup");
}

#[test]
fn test_round_robin_scenario() {
    let mut registry = registry();
    topic_with_group(
        &mut registry,
        "orders",
        &["p0", "p1", "p2"],
        "g1",
        RebalancePolicy::RoundRobin,
        &["c1", "c2"],
    );
    assert_eq!(assigned(&registry, "c1"), vec!["p0", "p2"]);
    assert_eq!(assigned(&registry, "c2"), vec!["p1"]);

    let outcome = registry.create_consumer(&"g1".into(), "c3".into()).unwrap();
    assert_eq!(outcome.len(), 1);
    assert_eq!(outcome[0].partitions_of(&"c3".into()), &[PartitionId::from("p2")]);
    assert_eq!(assigned(&registry, "c1"), vec!["p0"]);
    assert_eq!(assigned(&registry, "c2"), vec!["p1"]);
    assert_eq!(assigned(&registry, "c3"), vec!["p2"]);
}

#[test]
fn test_round_robin_sizes_differ_by_at_most_one() {
    for partitions in 0..8 {
        for consumers in 1..5 {
            let mut registry = registry();
            let p: Vec<String> = (0..partitions).map(|i| format!("p{}", i)).collect();
            let c: Vec<String> = (0..consumers).map(|i| format!("c{}", i)).collect();
            let p: Vec<&str> = p.iter().map(String::as_str).collect();
            let c: Vec<&str> = c.iter().map(String::as_str).collect();
            topic_with_group(&mut registry, "t", &p, "g", RebalancePolicy::RoundRobin, &c);

            let sizes: Vec<usize> = c.iter().map(|id| assigned(&registry, id).len()).collect();
            let max = sizes.iter().max().unwrap();
            let min = sizes.iter().min().unwrap();
            assert!(max - min <= 1, "{:?}", sizes);
        }
    }
}

#[test]
fn test_range_scenario_five_partitions_two_consumers() {
    let mut registry = registry();
    topic_with_group(
        &mut registry,
        "t",
        &["p0", "p1", "p2", "p3", "p4"],
        "g",
        RebalancePolicy::Range,
        &["c1", "c2"],
    );
    assert_eq!(assigned(&registry, "c1"), vec!["p0", "p1"]);
    assert_eq!(assigned(&registry, "c2"), vec!["p2", "p3", "p4"]);
}

#[test]
fn test_range_gives_share_to_all_but_last() {
    for partitions in 1..10 {
        for consumers in 1..=partitions {
            let mut registry = registry();
            let p: Vec<String> = (0..partitions).map(|i| format!("p{}", i)).collect();
            let c: Vec<String> = (0..consumers).map(|i| format!("c{}", i)).collect();
            let p: Vec<&str> = p.iter().map(String::as_str).collect();
            let c: Vec<&str> = c.iter().map(String::as_str).collect();
            topic_with_group(&mut registry, "t", &p, "g", RebalancePolicy::Range, &c);

            let share = partitions / consumers;
            for id in &c[..consumers - 1] {
                assert_eq!(assigned(&registry, id).len(), share);
            }
            let last = assigned(&registry, c[consumers - 1]);
            assert_eq!(last.len(), partitions - share * (consumers - 1));
        }
    }
}

#[test]
fn test_partition_has_one_consumer_per_group() {
    let mut registry = registry();
    topic_with_group(&mut registry, "t", &["p0", "p1"], "g1", RebalancePolicy::Range, &["a1", "a2"]);
    registry
        .create_consumer_group("g2".into(), &"t".into(), RebalancePolicy::RoundRobin)
        .unwrap();
    registry.create_consumer(&"g2".into(), "b1".into()).unwrap();

    let topic = registry.topic(&"t".into()).unwrap();
    for partition in &topic.partitions {
        assert_eq!(partition.assignments.len(), 2);
        assert_eq!(
            partition.assigned_consumer(&"g2".into()),
            Some(&ConsumerId::from("b1"))
        );
    }
    assert_eq!(
        topic.get_partition(&"p0".into()).unwrap().assigned_consumer(&"g1".into()),
        Some(&ConsumerId::from("a1"))
    );
}

#[test]
fn test_new_partition_triggers_rebalance() {
    let mut registry = registry();
    topic_with_group(&mut registry, "t", &["p0"], "g", RebalancePolicy::RoundRobin, &["c1", "c2"]);
    assert!(assigned(&registry, "c2").is_empty());

    let outcome = registry.create_partition(&"t".into(), "p1".into()).unwrap();
    assert_eq!(outcome[0].partitions_of(&"c2".into()), &[PartitionId::from("p1")]);
    assert_eq!(assigned(&registry, "c2"), vec!["p1"]);
}

#[test]
fn test_group_without_consumers_assigns_nothing() {
    let mut registry = registry();
    topic_with_group(&mut registry, "t", &["p0", "p1"], "g", RebalancePolicy::Range, &[]);
    let topic = registry.topic(&"t".into()).unwrap();
    assert!(topic.partitions.iter().all(|p| p.assignments.is_empty()));
}

#[test]
fn test_delete_consumer() {
    let mut registry = registry();
    topic_with_group(&mut registry, "t", &["p0", "p1"], "g", RebalancePolicy::RoundRobin, &["c1", "c2"]);

    let outcome = registry.delete_consumer(&"c2".into()).unwrap();
    assert_eq!(outcome[0].assignments.len(), 1);
    assert_eq!(assigned(&registry, "c1"), vec!["p0", "p1"]);

    let topic = registry.topic(&"t".into()).unwrap();
    assert!(topic
        .partitions
        .iter()
        .all(|p| p.assigned_consumer(&"g".into()) == Some(&ConsumerId::from("c1"))));
    assert!(!registry.consumer_group(&"g".into()).unwrap().contains(&"c2".into()));

    let err = registry.consume(&"c2".into(), &"p1".into()).unwrap_err();
    assert_eq!(err, DomainError::ConsumerNotFound("c2".into()));

    // The id is free again
    registry.create_consumer(&"g".into(), "c2".into()).unwrap();
    assert_eq!(assigned(&registry, "c2"), vec!["p1"]);
}

#[test]
fn test_bulk_produce_keeps_earlier_successes() {
    let mut registry = registry();
    registry.create_topic("t".into()).unwrap();
    registry.create_partition(&"t".into(), "p0".into()).unwrap();
    registry.create_producer("man".into(), AllocationPolicy::Manual).unwrap();

    let requests = vec![
        ProduceRequest::new("man", "t", json!(1), "m1").with_key("p0"),
        ProduceRequest::new("man", "t", json!(2), "m2"),
        ProduceRequest::new("man", "t", json!(3), "m3").with_key("p0"),
    ];
    let err = registry.produce_batch(requests).unwrap_err();
    assert_eq!(err, DomainError::MissingRoutingKey("man".into()));

    let topic = registry.topic(&"t".into()).unwrap();
    let ids: Vec<&str> = topic.partitions[0].messages.iter().map(|m| m.id().as_str()).collect();
    assert_eq!(ids, vec!["m1"]);
}

#[test]
fn test_bulk_consume() {
    let mut registry = registry();
    topic_with_group(&mut registry, "t", &["p0", "p1"], "g", RebalancePolicy::RoundRobin, &["c1", "c2"]);
    registry.create_producer("man".into(), AllocationPolicy::Manual).unwrap();
    registry
        .produce_batch(vec![
            ProduceRequest::new("man", "t", json!("a"), "a").with_key("p0"),
            ProduceRequest::new("man", "t", json!("b"), "b").with_key("p1"),
        ])
        .unwrap();

    let results = registry
        .consume_batch(vec![
            ConsumeRequest::new("c1", "p0"),
            ConsumeRequest::new("c2", "p1"),
            ConsumeRequest::new("c1", "p0"),
        ])
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().message_id().as_str(), "a");
    assert_eq!(results[1].as_ref().unwrap().message_id().as_str(), "b");
    assert!(results[2].is_none());

    registry
        .produce(&"man".into(), &"t".into(), json!("c"), "c".into(), Some("p0".into()))
        .unwrap();
    let err = registry
        .consume_batch(vec![
            ConsumeRequest::new("c1", "p0"),
            ConsumeRequest::new("c1", "p1"),
        ])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AssignmentViolation);
    // The first request was applied before the failure
    assert_eq!(registry.consumer(&"c1".into()).unwrap().consumed_ids().len(), 2);
}
