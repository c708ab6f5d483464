// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log-stream environment: the streams and arbitration instances of one tenant
//!
//! Structural changes and per-stream work run under the environment's own
//! lock, so sweeping one environment never blocks registry operations on
//! another.

use crate::arbitration::ArbitrationInstance;
use crate::config::StreamConfig;
use crate::error::EnvError;
use crate::stream::LogStream;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use strand_core::{Address, EnvKey, InstanceId, MemberList, StreamId, TenantRole};
use strand_storage::{ArbitrationRecord, TenantDirStore};

/// Write-admission mode of an environment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionMode {
    Normal,
    /// New entries are refused while a privileged operation is in progress
    Freeze,
}

#[derive(Default)]
struct EnvInner {
    streams: BTreeMap<StreamId, LogStream>,
    arbitrations: BTreeMap<InstanceId, ArbitrationInstance>,
}

/// All log streams and arbitration instances of one (cluster, tenant)
pub struct LogStreamEnvironment {
    key: EnvKey,
    dir: PathBuf,
    store: TenantDirStore,
    stream_config: StreamConfig,
    inner: Mutex<EnvInner>,
    freeze_holds: AtomicUsize,
    frozen: AtomicBool,
    removed: AtomicBool,
    pub(crate) borrowers: AtomicUsize,
}

impl LogStreamEnvironment {
    pub(crate) fn new(key: EnvKey, dir: PathBuf, store: TenantDirStore, stream_config: StreamConfig) -> Self {
        Self {
            key,
            dir,
            store,
            stream_config,
            inner: Mutex::new(EnvInner::default()),
            freeze_holds: AtomicUsize::new(0),
            frozen: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            borrowers: AtomicUsize::new(0),
        }
    }

    pub fn key(&self) -> EnvKey {
        self.key
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Set once the registry has removed this environment
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Delete the environment's directory and mark it removed.
    ///
    /// Runs under the environment lock, so a persisting call through an
    /// outstanding guard either finishes before the directory goes or sees
    /// the removed flag afterwards.
    pub(crate) fn retire(&self) -> Result<(), EnvError> {
        let _inner = self.lock();
        match self.store.remove(&self.key) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::warn!(key = %self.key, "environment directory already gone");
            }
            Err(e) => return Err(e.into()),
        }
        self.removed.store(true, Ordering::Release);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, EnvInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock for a change that is persisted; fails once the environment is removed
    fn lock_live(&self) -> Result<MutexGuard<'_, EnvInner>, EnvError> {
        let inner = self.lock();
        if self.is_removed() {
            return Err(EnvError::not_exist(format!("environment {} was removed", self.key)));
        }
        Ok(inner)
    }

    // === Log streams ===

    /// Create a stream whose checksum chain starts at `starting_checksum`.
    /// An existing stream is left untouched.
    pub fn create_stream(&self, id: StreamId, starting_checksum: u64) -> Result<(), EnvError> {
        if !id.is_valid() {
            return Err(EnvError::invalid(format!("invalid stream id {}", id)));
        }
        let mut inner = self.lock();
        if inner.streams.contains_key(&id) {
            return Ok(());
        }
        let stream = LogStream::new(id, starting_checksum, self.stream_config.clone(), Instant::now())?;
        inner.streams.insert(id, stream);
        tracing::info!(key = %self.key, stream_id = %id, "log stream created");
        Ok(())
    }

    pub fn remove_stream(&self, id: StreamId) -> Result<(), EnvError> {
        match self.lock().streams.remove(&id) {
            Some(_) => {
                tracing::info!(key = %self.key, stream_id = %id, "log stream removed");
                Ok(())
            }
            None => Err(EnvError::not_exist(format!("stream {} in {}", id, self.key))),
        }
    }

    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.lock().streams.keys().copied().collect()
    }

    /// Run `f` against one stream while holding the environment lock
    pub fn with_stream<R>(&self, id: StreamId, f: impl FnOnce(&mut LogStream) -> R) -> Result<R, EnvError> {
        let mut inner = self.lock();
        let stream = inner
            .streams
            .get_mut(&id)
            .ok_or_else(|| EnvError::not_exist(format!("stream {} in {}", id, self.key)))?;
        Ok(f(stream))
    }

    /// Append one entry on a leader stream, refused in freeze mode
    pub fn append(&self, id: StreamId, entry_checksum: u64, len: u64) -> Result<u64, EnvError> {
        if self.admission_mode() == AdmissionMode::Freeze {
            return Err(EnvError::Frozen(self.key));
        }
        self.with_stream(id, |s| s.append(entry_checksum, len))?
    }

    /// Verify and accept one replicated entry on a follower stream
    pub fn replicate(&self, id: StreamId, entry_checksum: u64, expected_accum: u64, len: u64) -> Result<(), EnvError> {
        self.with_stream(id, |s| s.replicate(entry_checksum, expected_accum, len))?
    }

    // === Maintenance ===

    /// Give every stream a chance to advance its role
    pub fn try_switch_state_for_all(&self) -> Result<(), EnvError> {
        self.for_each_stream("switch state", |s| s.try_switch_state().map(|_| ()))
    }

    /// Give every stream a chance to freeze its open log block
    pub fn try_freeze_log_for_all(&self, now: Instant) -> Result<(), EnvError> {
        self.for_each_stream("freeze log", |s| s.try_freeze_log(now).map(|_| ()))
    }

    /// Enter freeze mode while privileged operations are outstanding, leave it otherwise
    pub fn check_and_switch_freeze_mode(&self) -> Result<(), EnvError> {
        let want = self.freeze_holds.load(Ordering::Acquire) > 0;
        let was = self.frozen.swap(want, Ordering::AcqRel);
        if was != want {
            tracing::info!(key = %self.key, frozen = want, "switched freeze mode");
        }
        Ok(())
    }

    pub fn admission_mode(&self) -> AdmissionMode {
        if self.frozen.load(Ordering::Acquire) {
            AdmissionMode::Freeze
        } else {
            AdmissionMode::Normal
        }
    }

    /// Register a privileged operation that needs writes paused
    pub fn request_freeze(&self) {
        self.freeze_holds.fetch_add(1, Ordering::AcqRel);
    }

    /// Release a hold taken by [`request_freeze`](Self::request_freeze)
    pub fn release_freeze(&self) {
        let _ = self
            .freeze_holds
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Apply `f` to every stream, continuing past failures; the first failure is returned
    fn for_each_stream(
        &self,
        what: &str,
        mut f: impl FnMut(&mut LogStream) -> Result<(), EnvError>,
    ) -> Result<(), EnvError> {
        let mut inner = self.lock();
        let mut first_err = None;
        for stream in inner.streams.values_mut() {
            if let Err(e) = f(stream) {
                tracing::warn!(key = %self.key, stream_id = %stream.id(), error = %e, "{} failed", what);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    // === Arbitration instances ===

    /// Create an arbitration instance. Returns whether it was newly created;
    /// repeating the same call is a no-op.
    pub fn create_arbitration(
        &self,
        address: Address,
        instance_id: InstanceId,
        role: TenantRole,
    ) -> Result<bool, EnvError> {
        if !address.is_valid() || !instance_id.is_valid() {
            return Err(EnvError::invalid(format!(
                "invalid arbitration instance {} at {}",
                instance_id, address
            )));
        }
        let mut inner = self.lock_live()?;
        if let Some(existing) = inner.arbitrations.get(&instance_id) {
            if existing.matches(&address, role) {
                tracing::debug!(key = %self.key, instance_id = %instance_id, "arbitration instance already exists");
                return Ok(false);
            }
            return Err(EnvError::invalid(format!(
                "arbitration instance {} of {} exists with address {} and role {}",
                instance_id,
                self.key,
                existing.address(),
                existing.role()
            )));
        }

        let arb = ArbitrationInstance::new(self.key, address, instance_id, role);
        self.store.save_arbitration(&self.key, &arb.to_record())?;
        inner.arbitrations.insert(instance_id, arb);
        tracing::info!(key = %self.key, instance_id = %instance_id, role = %role, "arbitration instance created");
        Ok(true)
    }

    /// Delete an arbitration instance. Returns whether one was removed;
    /// deleting an absent instance succeeds.
    pub fn delete_arbitration(&self, address: &Address, instance_id: InstanceId) -> Result<bool, EnvError> {
        let mut inner = self.lock_live()?;
        let Some(existing) = inner.arbitrations.get(&instance_id) else {
            tracing::debug!(key = %self.key, instance_id = %instance_id, "arbitration instance already deleted");
            return Ok(false);
        };
        if existing.address() != address {
            return Err(EnvError::invalid(format!(
                "arbitration instance {} is hosted at {}, not {}",
                instance_id,
                existing.address(),
                address
            )));
        }
        self.store.remove_arbitration(&self.key, instance_id)?;
        inner.arbitrations.remove(&instance_id);
        tracing::info!(key = %self.key, instance_id = %instance_id, "arbitration instance deleted");
        Ok(true)
    }

    /// Fix the initial member list of an existing arbitration instance
    pub fn set_initial_member_list(
        &self,
        address: &Address,
        instance_id: InstanceId,
        members: MemberList,
        arb_member: Address,
        replica_num: usize,
    ) -> Result<(), EnvError> {
        let mut inner = self.lock_live()?;
        let existing = inner.arbitrations.get(&instance_id).ok_or_else(|| {
            EnvError::not_exist(format!("arbitration instance {} in {}", instance_id, self.key))
        })?;
        if existing.address() != address {
            return Err(EnvError::invalid(format!(
                "arbitration instance {} is hosted at {}, not {}",
                instance_id,
                existing.address(),
                address
            )));
        }

        let mut updated = existing.clone();
        updated.set_initial_member_list(members, arb_member, replica_num)?;
        self.store.save_arbitration(&self.key, &updated.to_record())?;
        inner.arbitrations.insert(instance_id, updated);
        tracing::info!(key = %self.key, instance_id = %instance_id, replica_num, "initial member list set");
        Ok(())
    }

    pub fn arbitration(&self, instance_id: InstanceId) -> Option<ArbitrationInstance> {
        self.lock().arbitrations.get(&instance_id).cloned()
    }

    pub fn arbitration_ids(&self) -> Vec<InstanceId> {
        self.lock().arbitrations.keys().copied().collect()
    }

    /// Reinstate an instance found on disk during restart
    pub(crate) fn restore_arbitration(&self, record: ArbitrationRecord) {
        let instance_id = record.instance_id;
        self.lock()
            .arbitrations
            .insert(instance_id, ArbitrationInstance::from_record(self.key, record));
    }
}

impl Drop for LogStreamEnvironment {
    fn drop(&mut self) {
        tracing::debug!(key = %self.key, removed = self.is_removed(), "environment destroyed");
    }
}

impl std::fmt::Debug for LogStreamEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStreamEnvironment")
            .field("key", &self.key)
            .field("dir", &self.dir)
            .field("admission_mode", &self.admission_mode())
            .field("removed", &self.is_removed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;
