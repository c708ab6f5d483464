//! Maintenance loop specs
//!
//! A running loop drives stream roles, freeze mode and block sealing for
//! every environment in its registry, and stops on request.

use crate::prelude::*;
use std::time::Duration;

fn fast_loop(registry: &Arc<EnvironmentRegistry>) -> MaintenanceLoop {
    let config = MaintenanceConfig::default()
        .with_target_period(Duration::from_millis(1))
        .with_freeze_mode_interval(Duration::from_millis(20));
    let mut maintenance = MaintenanceLoop::with_system_clock(config);
    maintenance
        .init(Arc::clone(registry) as Arc<dyn Maintained>)
        .unwrap();
    maintenance.start().unwrap();
    maintenance
}

fn role(registry: &EnvironmentRegistry, key: EnvKey, id: StreamId) -> Option<StreamRole> {
    registry.get(key).ok()?.with_stream(id, |s| s.role()).ok()
}

#[test]
fn loop_promotes_streams_across_environments() {
    let node = Node::new();
    let registry = Arc::new(node.boot());
    let keys = [EnvKey::new(1, 1001), EnvKey::new(2, 1001)];
    for key in keys {
        let env = registry.create(key).unwrap();
        env.create_stream(StreamId(1), 0).unwrap();
        env.with_stream(StreamId(1), |s| {
            s.mark_ready();
            s.request_leadership();
        })
        .unwrap();
    }

    let mut maintenance = fast_loop(&registry);
    wait_until(|| {
        keys.iter()
            .all(|k| role(&registry, *k, StreamId(1)) == Some(StreamRole::Leader))
    });
    maintenance.destroy().unwrap();
    assert_eq!(maintenance.state(), LoopState::Stopped);
}

#[test]
fn loop_seals_aged_blocks() {
    let node = Node::new();
    let registry = Arc::new(
        EnvironmentRegistry::open(
            node.path(),
            StreamConfig::default().with_max_block_age(Duration::from_millis(10)),
        )
        .unwrap(),
    );
    let key = EnvKey::new(1, 1001);
    let env = registry.create(key).unwrap();
    env.create_stream(StreamId(1), 0).unwrap();
    env.with_stream(StreamId(1), |s| {
        s.mark_ready();
        s.request_leadership();
    })
    .unwrap();

    let mut maintenance = fast_loop(&registry);
    wait_until(|| role(&registry, key, StreamId(1)) == Some(StreamRole::Leader));
    env.append(StreamId(1), 0xfeed, 128).unwrap();

    wait_until(|| env.with_stream(StreamId(1), |s| s.sealed_blocks()).unwrap() >= 1);
    maintenance.destroy().unwrap();
}

#[test]
fn loop_applies_freeze_requests() {
    let node = Node::new();
    let registry = Arc::new(node.boot());
    let env = registry.create(EnvKey::new(1, 1001)).unwrap();
    env.create_stream(StreamId(1), 0).unwrap();
    env.with_stream(StreamId(1), |s| {
        s.mark_ready();
        s.request_leadership();
    })
    .unwrap();

    let mut maintenance = fast_loop(&registry);
    wait_until(|| env.with_stream(StreamId(1), |s| s.role()).unwrap() == StreamRole::Leader);

    env.request_freeze();
    wait_until(|| matches!(env.append(StreamId(1), 1, 1), Err(EnvError::Frozen(_))));

    env.release_freeze();
    wait_until(|| env.append(StreamId(1), 1, 1).is_ok());
    maintenance.destroy().unwrap();
}

#[test]
fn removed_environment_is_no_longer_maintained() {
    let node = Node::new();
    let registry = Arc::new(node.boot());
    let key = EnvKey::new(1, 1001);
    registry.create(key).unwrap();

    let mut maintenance = fast_loop(&registry);
    registry.remove(key).unwrap();
    let iterations = maintenance.stats().iterations;
    wait_until(|| maintenance.stats().iterations > iterations + 5);

    assert_eq!(maintenance.stats().failures, 0);
    maintenance.destroy().unwrap();
}
