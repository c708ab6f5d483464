// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of log-stream environments keyed by (cluster, tenant)
//!
//! The key → environment map and the per-cluster metadata share one lock,
//! and every create/remove/meta update runs entirely under it, so callers
//! never observe a half-applied change:
//!
//! - `create` then `get` always finds the environment
//! - `remove` then `get` always fails with `EntryNotExist`
//! - `tenant_count` always equals the number of registered environments
//!
//! Work inside an environment takes that environment's own lock instead.

use crate::config::StreamConfig;
use crate::environment::LogStreamEnvironment;
use crate::error::EnvError;
use std::collections::HashMap;
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use strand_core::{Address, ClusterId, ClusterMetaInfo, EnvKey, InstanceId, MemberList, TenantRole};
use strand_storage::TenantDirStore;

/// Borrowed environment; the borrow is released when the guard drops
pub struct EnvGuard {
    env: Arc<LogStreamEnvironment>,
}

impl EnvGuard {
    fn acquire(env: Arc<LogStreamEnvironment>) -> Self {
        env.borrowers.fetch_add(1, Ordering::AcqRel);
        Self { env }
    }
}

impl Deref for EnvGuard {
    type Target = LogStreamEnvironment;

    fn deref(&self) -> &LogStreamEnvironment {
        &self.env
    }
}

impl Clone for EnvGuard {
    fn clone(&self) -> Self {
        Self::acquire(Arc::clone(&self.env))
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        self.env.borrowers.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for EnvGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EnvGuard").field(&*self.env).finish()
    }
}

#[derive(Default)]
struct RegistryState {
    envs: HashMap<EnvKey, Arc<LogStreamEnvironment>>,
    clusters: HashMap<ClusterId, ClusterMetaInfo>,
}

/// Concurrent directory of environments for every tenant this node serves
pub struct EnvironmentRegistry {
    store: TenantDirStore,
    stream_config: StreamConfig,
    state: Mutex<RegistryState>,
}

impl EnvironmentRegistry {
    /// Open an empty registry rooted at `base_dir`. Call
    /// [`restart`](Self::restart) to load what is already on disk.
    pub fn open(base_dir: impl AsRef<Path>, stream_config: StreamConfig) -> Result<Self, EnvError> {
        let store = TenantDirStore::open(base_dir.as_ref())?;
        Ok(Self {
            store,
            stream_config,
            state: Mutex::new(RegistryState::default()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        self.store.base_dir()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // === Environment lifecycle ===

    /// Create the environment for `key`, or return the existing one untouched
    pub fn create(&self, key: EnvKey) -> Result<EnvGuard, EnvError> {
        if !key.is_valid() {
            return Err(EnvError::invalid(format!("invalid key {}", key)));
        }
        let mut state = self.lock();
        if let Some(env) = state.envs.get(&key) {
            tracing::debug!(key = %key, "environment already exists");
            return Ok(EnvGuard::acquire(Arc::clone(env)));
        }

        let dir = self.store.create(&key)?;
        let info = state
            .clusters
            .get(&key.cluster_id)
            .copied()
            .unwrap_or_default()
            .tenant_added();
        if let Err(e) = self.store.save_cluster_epoch(key.cluster_id, info.epoch) {
            if let Err(undo) = self.store.remove(&key) {
                tracing::warn!(key = %key, error = %undo, "failed to undo directory after create failure");
            }
            return Err(e.into());
        }

        let env = Arc::new(LogStreamEnvironment::new(
            key,
            dir,
            self.store.clone(),
            self.stream_config.clone(),
        ));
        state.envs.insert(key, Arc::clone(&env));
        state.clusters.insert(key.cluster_id, info);
        tracing::info!(
            key = %key,
            tenant_count = info.tenant_count,
            epoch = %info.epoch,
            "environment created"
        );
        Ok(EnvGuard::acquire(env))
    }

    /// Borrow the environment for `key`
    pub fn get(&self, key: EnvKey) -> Result<EnvGuard, EnvError> {
        let state = self.lock();
        state
            .envs
            .get(&key)
            .map(|env| EnvGuard::acquire(Arc::clone(env)))
            .ok_or_else(|| EnvError::not_exist(format!("environment {}", key)))
    }

    /// Release a borrow explicitly; equivalent to dropping the guard
    pub fn revert(&self, guard: EnvGuard) {
        drop(guard);
    }

    /// Remove the environment for `key` and delete its directory.
    ///
    /// The key stops resolving immediately. Outstanding guards keep the
    /// in-memory environment alive until they are released, but can no
    /// longer persist anything. The advanced cluster epoch is written
    /// before the directory goes, so a failure never leaves the persisted
    /// epoch behind one already handed out.
    pub fn remove(&self, key: EnvKey) -> Result<(), EnvError> {
        let mut state = self.lock();
        let Some(env) = state.envs.get(&key).cloned() else {
            return Err(EnvError::not_exist(format!("environment {}", key)));
        };

        let current = state.clusters.get(&key.cluster_id).copied().unwrap_or_default();
        let info = current.tenant_removed();
        self.store.save_cluster_epoch(key.cluster_id, info.epoch)?;

        if let Err(e) = env.retire() {
            // The new epoch is already on disk; keep memory in step with it
            state
                .clusters
                .insert(key.cluster_id, current.with_epoch(info.epoch));
            return Err(e);
        }

        state.envs.remove(&key);
        state.clusters.insert(key.cluster_id, info);
        tracing::info!(
            key = %key,
            tenant_count = info.tenant_count,
            borrowers = env.borrowers.load(Ordering::Acquire),
            "environment removed"
        );
        Ok(())
    }

    /// Number of outstanding borrows of `key`, `None` when not registered
    pub fn ref_count(&self, key: EnvKey) -> Option<usize> {
        self.lock()
            .envs
            .get(&key)
            .map(|env| env.borrowers.load(Ordering::Acquire))
    }

    pub fn env_keys(&self) -> Vec<EnvKey> {
        let mut keys: Vec<_> = self.lock().envs.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().envs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().envs.is_empty()
    }

    /// Run `f` over a snapshot of all environments without holding the registry lock
    pub fn for_each_env(&self, mut f: impl FnMut(&LogStreamEnvironment)) {
        let snapshot: Vec<EnvGuard> = {
            let state = self.lock();
            state
                .envs
                .values()
                .map(|env| EnvGuard::acquire(Arc::clone(env)))
                .collect()
        };
        for guard in &snapshot {
            f(guard);
        }
    }

    /// Apply a fallible operation to every environment, continuing past
    /// failures and returning the first one
    pub(crate) fn fan_out(
        &self,
        what: &str,
        f: impl Fn(&LogStreamEnvironment) -> Result<(), EnvError>,
    ) -> Result<(), EnvError> {
        let mut first_err = None;
        self.for_each_env(|env| {
            if let Err(e) = f(env) {
                tracing::warn!(key = %env.key(), error = %e, "{} failed", what);
                first_err.get_or_insert(e);
            }
        });
        first_err.map_or(Ok(()), Err)
    }

    // === Arbitration instances ===

    pub fn create_arbitration_instance(
        &self,
        key: EnvKey,
        address: Address,
        instance_id: InstanceId,
        role: TenantRole,
    ) -> Result<(), EnvError> {
        let env = self.get(key)?;
        env.create_arbitration(address, instance_id, role).map(|_| ())
    }

    /// Idempotent while the environment is registered; `EntryNotExist` once it is gone
    pub fn delete_arbitration_instance(
        &self,
        key: EnvKey,
        address: &Address,
        instance_id: InstanceId,
    ) -> Result<(), EnvError> {
        let env = self.get(key)?;
        env.delete_arbitration(address, instance_id).map(|_| ())
    }

    pub fn set_initial_member_list(
        &self,
        key: EnvKey,
        address: &Address,
        instance_id: InstanceId,
        members: MemberList,
        self_member: Address,
        member_count: usize,
    ) -> Result<(), EnvError> {
        let env = self.get(key)?;
        env.set_initial_member_list(address, instance_id, members, self_member, member_count)
    }

    // === Cluster metadata ===

    /// Apply `mutator` to a cluster's metadata under the registry lock.
    ///
    /// The mutator may only move the epoch forward and may not change
    /// `tenant_count`, which the registry owns. A cluster seen for the first
    /// time starts from the default record.
    pub fn update_cluster_meta_info(
        &self,
        cluster_id: ClusterId,
        mutator: impl FnOnce(ClusterMetaInfo) -> ClusterMetaInfo,
    ) -> Result<ClusterMetaInfo, EnvError> {
        if !cluster_id.is_valid() {
            return Err(EnvError::invalid(format!("invalid cluster id {}", cluster_id)));
        }
        let mut state = self.lock();
        let current = state.clusters.get(&cluster_id).copied().unwrap_or_default();
        let next = mutator(current);

        if next.epoch < current.epoch {
            return Err(EnvError::invalid(format!(
                "epoch of cluster {} cannot move back from {} to {}",
                cluster_id, current.epoch, next.epoch
            )));
        }
        if next.tenant_count != current.tenant_count {
            return Err(EnvError::invalid(format!(
                "tenant_count of cluster {} is owned by the registry",
                cluster_id
            )));
        }
        if next.epoch != current.epoch {
            self.store.save_cluster_epoch(cluster_id, next.epoch)?;
        }
        state.clusters.insert(cluster_id, next);
        tracing::debug!(cluster_id = %cluster_id, epoch = %next.epoch, "cluster meta updated");
        Ok(next)
    }

    pub fn get_cluster_meta_info(&self, cluster_id: ClusterId) -> Result<ClusterMetaInfo, EnvError> {
        self.lock()
            .clusters
            .get(&cluster_id)
            .copied()
            .ok_or_else(|| EnvError::not_exist(format!("cluster {}", cluster_id)))
    }

    // === Recovery ===

    /// Rebuild environments and cluster metadata from the base directory.
    ///
    /// Tenant counts are recounted from the directories found. Each
    /// cluster's persisted epoch is advanced once so that anything stamped
    /// after the restart orders after anything stamped before it.
    ///
    /// The new state is built in full and its epochs persisted before it
    /// replaces the in-memory state. If persisting fails partway, memory is
    /// left untouched and some epochs on disk are already advanced, which
    /// only moves them further forward on the next restart.
    pub fn restart(&self) -> Result<(), EnvError> {
        let mut state = self.lock();
        let recovered = self.store.recover()?;

        if !state.envs.is_empty() {
            tracing::warn!(
                count = state.envs.len(),
                "restart discards environments already in memory"
            );
        }
        let mut envs = HashMap::new();
        let mut clusters: HashMap<ClusterId, ClusterMetaInfo> = recovered
            .cluster_epochs
            .into_iter()
            .map(|(cluster_id, epoch)| (cluster_id, ClusterMetaInfo::default().with_epoch(epoch)))
            .collect();

        for tenant in recovered.tenants {
            let key = tenant.meta.key;
            let env = LogStreamEnvironment::new(
                key,
                tenant.dir,
                self.store.clone(),
                self.stream_config.clone(),
            );
            for record in tenant.arbitrations {
                env.restore_arbitration(record);
            }
            envs.insert(key, Arc::new(env));
            let info = clusters.entry(key.cluster_id).or_default();
            info.tenant_count += 1;
        }

        let mut order: Vec<ClusterId> = clusters.keys().copied().collect();
        order.sort();
        for cluster_id in order {
            if let Some(info) = clusters.get_mut(&cluster_id) {
                info.epoch = info.epoch.next_counter();
                self.store.save_cluster_epoch(cluster_id, info.epoch)?;
            }
        }

        state.envs = envs;
        state.clusters = clusters;
        tracing::info!(
            environments = state.envs.len(),
            clusters = state.clusters.len(),
            "registry restarted"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
