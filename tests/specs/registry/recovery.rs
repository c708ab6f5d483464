//! Registry recovery specs
//!
//! A restarted registry sees exactly what survived on disk.

use crate::prelude::*;

#[test]
fn restart_after_removing_everything_counts_zero() {
    let node = Node::new();
    let keys = [1001, 1002, 1003].map(|t| EnvKey::new(1, t));
    {
        let registry = node.boot();
        for key in keys {
            registry.create(key).unwrap();
        }
        for key in keys {
            registry.remove(key).unwrap();
        }
    }

    let registry = node.boot();
    assert!(registry.is_empty());
    assert_eq!(tenant_count(&registry, 1), 0);

    registry.create(keys[0]).unwrap();
    assert_eq!(tenant_count(&registry, 1), 1);
}

#[test]
fn restart_restores_survivors_and_their_arbitrations() {
    let node = Node::new();
    let keep = EnvKey::new(1, 1002);
    let addr = Address::new("10.0.0.9:2882");
    {
        let registry = node.boot();
        registry.create(EnvKey::new(1, 1001)).unwrap();
        registry.create(keep).unwrap();
        registry.create(EnvKey::new(4, 1001)).unwrap();
        registry
            .create_arbitration_instance(keep, addr.clone(), InstanceId(3), TenantRole::Standby)
            .unwrap();
        registry.remove(EnvKey::new(1, 1001)).unwrap();
    }

    let registry = node.boot();
    assert_eq!(registry.env_keys(), vec![keep, EnvKey::new(4, 1001)]);
    assert_eq!(tenant_count(&registry, 1), 1);
    assert_eq!(tenant_count(&registry, 4), 1);

    let env = registry.get(keep).unwrap();
    assert_eq!(env.arbitration_ids(), vec![InstanceId(3)]);
    assert_eq!(env.arbitration(InstanceId(3)).unwrap().role(), TenantRole::Standby);
}

#[test]
fn epoch_after_restart_exceeds_everything_before() {
    let node = Node::new();
    let before = {
        let registry = node.boot();
        registry.create(EnvKey::new(1, 1001)).unwrap();
        registry
            .update_cluster_meta_info(ClusterId(1), |info| info.with_epoch(info.epoch.next_term()))
            .unwrap()
            .epoch
    };

    let registry = node.boot();
    assert!(registry.get_cluster_meta_info(ClusterId(1)).unwrap().epoch > before);
}

#[test]
fn interrupted_removal_is_not_resurrected() {
    let node = Node::new();
    let key = EnvKey::new(1, 1001);
    {
        let registry = node.boot();
        registry.create(key).unwrap();
    }
    // Simulate a crash after the rename into the staging area
    let staged = node.path().join("tmp").join("cluster_1_tenant_1001.removing");
    std::fs::create_dir_all(node.path().join("tmp")).unwrap();
    std::fs::rename(node.path().join("cluster_1_tenant_1001"), &staged).unwrap();

    let registry = node.boot();
    assert!(registry.get(key).unwrap_err().is_not_found());
    assert!(!staged.exists());
}
