//! End-to-end clustering of synthetic identity streams.

use crate::common::{clusters_per_identity, planar, replay};
use links_cluster::{ClusterError, ClusteringConfig, ClusterIndex, LinksCluster, StreamGenerator};
use std::collections::BTreeSet;

#[test]
fn test_each_identity_gets_its_own_cluster() {
    let mut generator = StreamGenerator::seeded(4, 64, 2024);
    let events = generator.generate(30);

    let mut engine = LinksCluster::new(ClusteringConfig::default()).unwrap();
    let assignments = replay(&mut engine, &events);
    let by_identity = clusters_per_identity(&events, &assignments);

    // Pure: one cluster per identity
    for (identity, clusters) in &by_identity {
        assert_eq!(clusters.len(), 1, "identity {identity} spread over {clusters:?}");
    }
    // Complete: no two identities share a cluster
    let distinct: BTreeSet<usize> = by_identity
        .values()
        .flat_map(|clusters| clusters.iter().copied())
        .collect();
    assert_eq!(distinct.len(), by_identity.len());
    assert_eq!(engine.cluster_count(), by_identity.len());
}

#[test]
fn test_each_visit_is_one_conversation() {
    let visit_length = 4;
    let mut generator = StreamGenerator::seeded(3, 64, 99)
        .with_visit_length(visit_length)
        .with_step(2.0)
        .with_idle_gap(120.0);
    let events = generator.generate(12);

    let mut engine = LinksCluster::new(ClusteringConfig::default()).unwrap();
    let assignments = replay(&mut engine, &events);

    for (visit, chunk) in events.chunks(visit_length).enumerate() {
        let cluster = assignments[visit * visit_length];
        let identity = chunk[0].identity.unwrap();
        let visits_by_identity = events
            .chunks(visit_length)
            .filter(|c| c[0].identity == Some(identity))
            .count();

        let conversations = engine.conversation_list(cluster).unwrap();
        assert_eq!(conversations.len(), visits_by_identity);
        for conversation in &conversations {
            assert_eq!(conversation.duration(), 2.0 * (visit_length - 1) as f64);
        }
        for pair in conversations.windows(2) {
            assert!(pair[1].start() >= pair[0].end() + engine.config().conversation_threshold);
        }
    }
}

#[test]
fn test_drifting_identity_stays_one_cluster() {
    let config = ClusteringConfig::new(0.5, 0.99, 1.0);
    let mut engine = LinksCluster::new(config).unwrap();

    // A slow walk from 0° to 90°: the ends are orthogonal, every step is close
    for step in 0..10 {
        let vector = planar(f64::from(step) * 10.0);
        for _ in 0..3 {
            engine.predict(&vector, None).unwrap();
        }
    }

    assert_eq!(engine.cluster_count(), 1);
    assert_eq!(engine.subcluster_count(), 10);
    assert_eq!(engine.clusters()[0].connected_components().len(), 1);

    // Something unrelated still gets a new cluster
    assert_eq!(
        engine.predict(&planar(180.0), None).unwrap(),
        Some(ClusterIndex::new(1))
    );
}

#[test]
fn test_bad_vectors_do_not_poison_the_stream() {
    let mut generator = StreamGenerator::seeded(2, 16, 5);
    let events = generator.generate(6);

    let mut engine = LinksCluster::new(ClusteringConfig::default()).unwrap();
    let mut rejected = 0;
    for (i, event) in events.iter().enumerate() {
        if i % 4 == 3 {
            let err = engine.predict(&event.vector[..8], event.timestamp).unwrap_err();
            assert!(matches!(err, ClusterError::ShapeMismatch { expected: 16, actual: 8 }));
            assert!(err.is_recoverable());
            rejected += 1;
        }
        engine.predict(&event.vector, event.timestamp).unwrap();
    }

    assert!(rejected > 0);
    let stored: usize = engine.clusters().iter().map(|c| c.vector_count()).sum();
    assert_eq!(stored, events.len());
}

#[test]
fn test_non_finite_vectors_are_rejected_without_mutation() {
    let mut generator = StreamGenerator::seeded(4, 64, 2024);
    let events = generator.generate(30);
    let mut engine = LinksCluster::new(ClusteringConfig::default()).unwrap();

    let mut poisoned = events[0].vector.clone();
    poisoned[0] = f32::INFINITY;
    let err = engine.predict(&poisoned, events[0].timestamp).unwrap_err();
    assert_eq!(err, ClusterError::NonFiniteVector { index: 0 });
    assert!(err.is_recoverable());
    assert!(engine.dimension().is_none());

    let mut assignments = Vec::with_capacity(events.len());
    for (i, event) in events.iter().enumerate() {
        if i % 7 == 3 {
            let mut poisoned = event.vector.clone();
            poisoned[i % 64] = f32::NAN;
            assert_eq!(
                engine.predict(&poisoned, event.timestamp),
                Err(ClusterError::NonFiniteVector { index: i % 64 })
            );
        }
        let assigned = engine.predict(&event.vector, event.timestamp).unwrap();
        assignments.push(assigned.map_or(0, |index| index.get()));
    }

    // Same outcome as a clean stream
    let by_identity = clusters_per_identity(&events, &assignments);
    for (identity, clusters) in &by_identity {
        assert_eq!(clusters.len(), 1, "identity {identity} spread over {clusters:?}");
    }
    assert_eq!(engine.cluster_count(), by_identity.len());
    let stored: usize = engine.clusters().iter().map(|c| c.vector_count()).sum();
    assert_eq!(stored, events.len());
}

#[test]
fn test_merging_identities_by_hand() {
    let mut generator = StreamGenerator::seeded(2, 32, 11).with_visit_length(3);
    let first = generator.visit(0).unwrap();
    let second = generator.visit(1).unwrap();

    let mut engine =
        LinksCluster::new(ClusteringConfig::default().with_store_vectors(true)).unwrap();
    replay(&mut engine, &first);
    replay(&mut engine, &second);
    assert_eq!(engine.cluster_count(), 2);

    engine.merge_clusters(0, 1).unwrap();
    assert_eq!(engine.cluster_count(), 1);
    assert_eq!(engine.get_all_vectors().len(), 6);
    assert_eq!(engine.clusters()[0].connected_components().len(), 1);

    // Both visits survive as separate conversations
    assert_eq!(engine.conversation_list(0).unwrap().len(), 2);
}
