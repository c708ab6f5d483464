// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn store() -> (tempfile::TempDir, TenantDirStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = TenantDirStore::open(dir.path().join("arb")).unwrap();
    (dir, store)
}

fn arb_record(instance_id: i64) -> ArbitrationRecord {
    ArbitrationRecord {
        instance_id: InstanceId(instance_id),
        address: Address::new("10.0.0.9:2882"),
        role: TenantRole::Primary,
        initial_members: None,
    }
}

#[test]
fn dir_name_is_deterministic() {
    let (_tmp, store) = store();
    let key = EnvKey::new(3, 1002);
    assert_eq!(
        store.dir_for(&key),
        store.base_dir().join("cluster_3_tenant_1002")
    );
}

#[test]
fn parse_dir_name_accepts_only_valid_keys() {
    assert_eq!(
        parse_dir_name("cluster_3_tenant_1002"),
        Some(EnvKey::new(3, 1002))
    );
    assert_eq!(parse_dir_name("cluster_0_tenant_1002"), None);
    assert_eq!(parse_dir_name("cluster_x_tenant_1"), None);
    assert_eq!(parse_dir_name("lost+found"), None);
}

#[test]
fn create_is_idempotent_and_writes_meta() {
    let (_tmp, store) = store();
    let key = EnvKey::new(1, 1001);

    let first = store.create(&key).unwrap();
    let meta: TenantMeta = read_record(&first.join(META_FILE)).unwrap();
    let second = store.create(&key).unwrap();

    assert_eq!(first, second);
    assert_eq!(meta.key, key);
    let again: TenantMeta = read_record(&second.join(META_FILE)).unwrap();
    assert_eq!(again, meta);
}

#[test]
fn remove_missing_is_not_found() {
    let (_tmp, store) = store();
    let err = store.remove(&EnvKey::new(1, 1001)).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn remove_deletes_directory() {
    let (_tmp, store) = store();
    let key = EnvKey::new(1, 1001);
    store.create(&key).unwrap();
    store.remove(&key).unwrap();
    assert!(!store.exists(&key));
    assert!(store.remove(&key).unwrap_err().is_not_found());
}

#[test]
fn leftover_trash_is_not_a_remove_failure() {
    let (_tmp, store) = store();
    let key = EnvKey::new(1, 1001);
    store.create(&key).unwrap();

    // Cleanup of the renamed copy can fail without failing the removal
    let trash = store.tmp_path(&key, "removing");
    assert!(!discard(&trash));
    store.remove(&key).unwrap();
    assert!(!store.exists(&key));

    // Whatever is left in tmp/ is reclaimed by recovery
    fs::create_dir_all(trash.join("arb_7.json")).unwrap();
    assert!(store.recover().unwrap().tenants.is_empty());
    assert!(!trash.exists());
}

#[test]
fn recover_lists_surviving_tenants_only() {
    let (_tmp, store) = store();
    let k1 = EnvKey::new(1, 1001);
    let k2 = EnvKey::new(1, 1002);
    let k3 = EnvKey::new(2, 1001);
    for k in [k1, k2, k3] {
        store.create(&k).unwrap();
    }
    store.remove(&k2).unwrap();

    let recovered = store.recover().unwrap();
    let keys: Vec<_> = recovered.tenants.iter().map(|t| t.meta.key).collect();
    assert_eq!(keys, vec![k1, k3]);
}

#[test]
fn recover_purges_interrupted_removal() {
    let (_tmp, store) = store();
    let key = EnvKey::new(1, 1001);
    store.create(&key).unwrap();

    // Simulate a crash right after the rename into tmp/
    let trash = store.tmp_path(&key, "removing");
    fs::rename(store.dir_for(&key), &trash).unwrap();

    let recovered = store.recover().unwrap();
    assert!(recovered.tenants.is_empty());
    assert!(!trash.exists());
    assert!(!store.exists(&key));
}

#[test]
fn recover_purges_interrupted_create() {
    let (_tmp, store) = store();
    let staging = store.tmp_path(&EnvKey::new(1, 1001), "creating");
    fs::create_dir_all(&staging).unwrap();

    let recovered = store.recover().unwrap();
    assert!(recovered.tenants.is_empty());
    assert!(!staging.exists());
}

#[test]
fn recover_skips_foreign_directories() {
    let (_tmp, store) = store();
    fs::create_dir_all(store.base_dir().join("lost+found")).unwrap();
    store.create(&EnvKey::new(1, 1001)).unwrap();

    let recovered = store.recover().unwrap();
    assert_eq!(recovered.tenants.len(), 1);
}

#[test]
fn recover_fails_on_corrupt_meta() {
    let (_tmp, store) = store();
    let key = EnvKey::new(1, 1001);
    let dir = store.create(&key).unwrap();
    let meta_path = dir.join(META_FILE);
    let text = fs::read_to_string(&meta_path).unwrap();
    fs::write(&meta_path, text.replace("1001", "1009")).unwrap();

    let err = store.recover().unwrap_err();
    assert!(matches!(err, DirError::Corrupt { .. }));
}

#[test]
fn arbitration_records_round_trip_through_recovery() {
    let (_tmp, store) = store();
    let key = EnvKey::new(1, 1001);
    store.create(&key).unwrap();

    let mut with_members = arb_record(8);
    with_members.initial_members = Some(InitialMembers {
        members: MemberList::new(vec![
            Address::new("10.0.0.1:2882"),
            Address::new("10.0.0.2:2882"),
        ]),
        arb_member: Address::new("10.0.0.9:2882"),
        replica_num: 2,
    });
    store.save_arbitration(&key, &arb_record(7)).unwrap();
    store.save_arbitration(&key, &with_members).unwrap();

    let recovered = store.recover().unwrap();
    assert_eq!(recovered.tenants[0].arbitrations, vec![arb_record(7), with_members]);
}

#[test]
fn remove_arbitration_is_idempotent() {
    let (_tmp, store) = store();
    let key = EnvKey::new(1, 1001);
    store.create(&key).unwrap();
    store.save_arbitration(&key, &arb_record(7)).unwrap();

    store.remove_arbitration(&key, InstanceId(7)).unwrap();
    store.remove_arbitration(&key, InstanceId(7)).unwrap();

    let recovered = store.recover().unwrap();
    assert!(recovered.tenants[0].arbitrations.is_empty());
}

#[test]
fn arbitration_ops_need_tenant_directory() {
    let (_tmp, store) = store();
    let key = EnvKey::new(1, 1001);
    assert!(store
        .save_arbitration(&key, &arb_record(7))
        .unwrap_err()
        .is_not_found());
    assert!(store
        .remove_arbitration(&key, InstanceId(7))
        .unwrap_err()
        .is_not_found());
}

#[test]
fn cluster_epochs_are_recovered() {
    let (_tmp, store) = store();
    store.save_cluster_epoch(ClusterId(2), Epoch::new(4, 1)).unwrap();
    store.save_cluster_epoch(ClusterId(1), Epoch::new(1, 0)).unwrap();
    store.save_cluster_epoch(ClusterId(2), Epoch::new(5, 0)).unwrap();

    let recovered = store.recover().unwrap();
    assert_eq!(
        recovered.cluster_epochs,
        vec![
            (ClusterId(1), Epoch::new(1, 0)),
            (ClusterId(2), Epoch::new(5, 0)),
        ]
    );
}
