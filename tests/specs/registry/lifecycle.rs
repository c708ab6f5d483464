//! Registry lifecycle specs
//!
//! Verify create/get/remove visibility, tenant counting per cluster, and
//! arbitration instance management.

use crate::prelude::*;

const ARB: &str = "10.0.0.9:2882";

#[test]
fn tenant_count_follows_creates_and_removes() {
    let node = Node::new();
    let registry = node.boot();
    let keys = [1001, 1002, 1003].map(|t| EnvKey::new(1, t));

    for (i, key) in keys.iter().enumerate() {
        registry.create(*key).unwrap();
        assert_eq!(tenant_count(&registry, 1), i as u64 + 1);
    }
    for (i, key) in keys.iter().enumerate() {
        registry.remove(*key).unwrap();
        assert_eq!(tenant_count(&registry, 1), 2 - i as u64);
    }
    assert!(registry.remove(keys[0]).unwrap_err().is_not_found());
}

#[test]
fn created_environment_is_visible_and_on_disk() {
    let node = Node::new();
    let registry = node.boot();
    let key = EnvKey::new(2, 1001);

    let env = registry.create(key).unwrap();
    assert!(node.path().join("cluster_2_tenant_1001").is_dir());
    assert_eq!(registry.get(key).unwrap().dir(), env.dir());
}

#[test]
fn removed_environment_disappears_from_lookup_and_disk() {
    let node = Node::new();
    let registry = node.boot();
    let key = EnvKey::new(2, 1001);

    registry.create(key).unwrap();
    registry.remove(key).unwrap();
    assert!(registry.get(key).unwrap_err().is_not_found());
    assert!(!node.path().join("cluster_2_tenant_1001").exists());
}

#[test]
fn epoch_only_moves_forward() {
    let node = Node::new();
    let registry = node.boot();
    registry.create(EnvKey::new(1, 1001)).unwrap();

    let mut seen = registry.get_cluster_meta_info(ClusterId(1)).unwrap().epoch;
    registry.create(EnvKey::new(1, 1002)).unwrap();
    let after_create = registry.get_cluster_meta_info(ClusterId(1)).unwrap().epoch;
    assert!(after_create > seen);
    seen = after_create;

    let stamped = registry
        .update_cluster_meta_info(ClusterId(1), |info| info.with_epoch(info.epoch.next_term()))
        .unwrap();
    assert!(stamped.epoch > seen);

    let rewind = registry.update_cluster_meta_info(ClusterId(1), |info| info.with_epoch(seen));
    assert!(matches!(rewind, Err(EnvError::InvalidArgument(_))));
}

#[test]
fn arbitration_instance_lifecycle() {
    let node = Node::new();
    let registry = node.boot();
    let key = EnvKey::new(1, 1001);
    let addr = Address::new(ARB);
    registry.create(key).unwrap();

    registry
        .create_arbitration_instance(key, addr.clone(), InstanceId(7), TenantRole::Primary)
        .unwrap();
    // Repeating the create changes nothing
    registry
        .create_arbitration_instance(key, addr.clone(), InstanceId(7), TenantRole::Primary)
        .unwrap();

    registry
        .set_initial_member_list(
            key,
            &addr,
            InstanceId(7),
            members(&["10.0.0.1:2882", "10.0.0.2:2882"]),
            addr.clone(),
            3,
        )
        .unwrap();
    let second = registry.set_initial_member_list(
        key,
        &addr,
        InstanceId(7),
        members(&["10.0.0.3:2882"]),
        addr.clone(),
        3,
    );
    assert!(matches!(second, Err(EnvError::InvalidArgument(_))));

    registry.delete_arbitration_instance(key, &addr, InstanceId(7)).unwrap();
    registry.delete_arbitration_instance(key, &addr, InstanceId(7)).unwrap();
    assert!(registry.get(key).unwrap().arbitration(InstanceId(7)).is_none());
}

#[test]
fn parallel_tenants_are_counted_exactly() {
    let node = Node::new();
    let registry = Arc::new(node.boot());

    let workers: Vec<_> = (0..6u64)
        .map(|t| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let key = EnvKey::new(9, 2000 + t);
                for _ in 0..5 {
                    registry.create(key).unwrap();
                    assert!(registry.get(key).is_ok());
                    registry.remove(key).unwrap();
                    assert!(registry.get(key).is_err());
                }
                if t % 2 == 0 {
                    registry.create(key).unwrap();
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    assert_eq!(tenant_count(&registry, 9), 3);
    assert_eq!(registry.len(), 3);
}
