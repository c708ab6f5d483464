// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-tenant directory store
//!
//! Owns the on-disk side of environment lifecycle: creating and removing the
//! directory of one (cluster, tenant) key, persisting arbitration instances
//! and cluster epochs, and listing what survived a restart.

use crate::record::{read_record, sync_dir, write_record};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use strand_core::{Address, ClusterId, Epoch, EnvKey, InstanceId, MemberList, TenantRole};
use thiserror::Error;

const TMP_DIR: &str = "tmp";
const META_FILE: &str = "meta.json";
const ARB_PREFIX: &str = "arb_";
const EPOCH_SUFFIX: &str = ".epoch.json";

/// Errors from directory operations
#[derive(Debug, Error)]
pub enum DirError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("entry does not exist: {0}")]
    EntryNotExist(PathBuf),

    #[error("corrupt record {path}: stored checksum {stored:#010x}, computed {computed:#010x}")]
    Corrupt {
        path: PathBuf,
        stored: u32,
        computed: u32,
    },
}

impl DirError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DirError::EntryNotExist(_))
    }
}

/// Record stored as `meta.json` in every tenant directory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMeta {
    pub key: EnvKey,
    pub created_at_micros: u64,
}

/// Initial membership of the consensus group an arbitration instance serves
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialMembers {
    pub members: MemberList,
    pub arb_member: Address,
    pub replica_num: usize,
}

/// Persisted form of one arbitration instance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrationRecord {
    pub instance_id: InstanceId,
    pub address: Address,
    pub role: TenantRole,
    pub initial_members: Option<InitialMembers>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct EpochRecord {
    cluster_id: ClusterId,
    epoch: Epoch,
}

/// One tenant directory found during recovery
#[derive(Clone, Debug)]
pub struct RecoveredTenant {
    pub meta: TenantMeta,
    pub dir: PathBuf,
    pub arbitrations: Vec<ArbitrationRecord>,
}

/// Everything recovery found under the base directory
#[derive(Clone, Debug, Default)]
pub struct Recovered {
    pub tenants: Vec<RecoveredTenant>,
    pub cluster_epochs: Vec<(ClusterId, Epoch)>,
}

/// Directory store rooted at one base directory
#[derive(Clone, Debug)]
pub struct TenantDirStore {
    base_dir: PathBuf,
}

impl TenantDirStore {
    /// Open a store, creating the base and staging directories
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, DirError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(base_dir.join(TMP_DIR))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Deterministic directory of a key
    pub fn dir_for(&self, key: &EnvKey) -> PathBuf {
        self.base_dir.join(dir_name(key))
    }

    pub fn exists(&self, key: &EnvKey) -> bool {
        self.dir_for(key).is_dir()
    }

    /// Create the directory for `key`, returning its path.
    ///
    /// The directory is assembled under `tmp/` with its `meta.json` and only
    /// then renamed into place. An existing directory is left untouched.
    pub fn create(&self, key: &EnvKey) -> Result<PathBuf, DirError> {
        let target = self.dir_for(key);
        if target.is_dir() {
            return Ok(target);
        }

        let staging = self.tmp_path(key, "creating");
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        write_record(
            &staging.join(META_FILE),
            &TenantMeta {
                key: *key,
                created_at_micros: now_micros(),
            },
        )?;
        fs::rename(&staging, &target)?;
        sync_dir(&self.base_dir)?;

        tracing::debug!(key = %key, dir = %target.display(), "tenant directory created");
        Ok(target)
    }

    /// Remove the directory for `key`.
    ///
    /// The directory is first renamed into `tmp/` so that a crash mid-delete
    /// leaves nothing for recovery to pick up. Once that rename is durable
    /// the key is gone; failing to delete the renamed copy is only logged,
    /// and recovery purges it.
    pub fn remove(&self, key: &EnvKey) -> Result<(), DirError> {
        let target = self.dir_for(key);
        if !target.is_dir() {
            return Err(DirError::EntryNotExist(target));
        }

        let trash = self.tmp_path(key, "removing");
        if trash.exists() {
            fs::remove_dir_all(&trash)?;
        }
        fs::rename(&target, &trash)?;
        sync_dir(&self.base_dir)?;
        discard(&trash);

        tracing::debug!(key = %key, "tenant directory removed");
        Ok(())
    }

    /// Persist an arbitration instance inside its tenant directory
    pub fn save_arbitration(&self, key: &EnvKey, record: &ArbitrationRecord) -> Result<(), DirError> {
        let dir = self.existing_dir(key)?;
        write_record(&arb_path(&dir, record.instance_id), record)
    }

    /// Drop a persisted arbitration instance; absent records are not an error
    pub fn remove_arbitration(&self, key: &EnvKey, instance_id: InstanceId) -> Result<(), DirError> {
        let dir = self.existing_dir(key)?;
        match fs::remove_file(arb_path(&dir, instance_id)) {
            Ok(()) => sync_dir(&dir),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the fencing epoch of a cluster
    pub fn save_cluster_epoch(&self, cluster_id: ClusterId, epoch: Epoch) -> Result<(), DirError> {
        let path = self
            .base_dir
            .join(format!("cluster_{}{}", cluster_id, EPOCH_SUFFIX));
        write_record(&path, &EpochRecord { cluster_id, epoch })
    }

    /// Scan the base directory after a restart.
    ///
    /// Purges `tmp/` first, then loads every tenant directory and cluster
    /// epoch. Unrecognised entries are skipped with a warning; a record whose
    /// checksum fails aborts recovery.
    pub fn recover(&self) -> Result<Recovered, DirError> {
        self.purge_tmp()?;

        let mut recovered = Recovered::default();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                continue;
            };
            if name == TMP_DIR {
                continue;
            }

            if entry.file_type()?.is_dir() {
                let Some(key) = parse_dir_name(&name) else {
                    tracing::warn!(path = %path.display(), "skipping unrecognised directory");
                    continue;
                };
                let meta: TenantMeta = read_record(&path.join(META_FILE))?;
                if meta.key != key {
                    tracing::warn!(
                        path = %path.display(),
                        recorded = %meta.key,
                        "tenant record does not match directory name, skipping"
                    );
                    continue;
                }
                let arbitrations = load_arbitrations(&path)?;
                recovered.tenants.push(RecoveredTenant {
                    meta,
                    dir: path,
                    arbitrations,
                });
            } else if name.ends_with(EPOCH_SUFFIX) {
                let record: EpochRecord = read_record(&path)?;
                recovered
                    .cluster_epochs
                    .push((record.cluster_id, record.epoch));
            }
        }

        recovered.tenants.sort_by_key(|t| t.meta.key);
        recovered.cluster_epochs.sort_by_key(|(c, _)| *c);
        Ok(recovered)
    }

    fn existing_dir(&self, key: &EnvKey) -> Result<PathBuf, DirError> {
        let dir = self.dir_for(key);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(DirError::EntryNotExist(dir))
        }
    }

    fn tmp_path(&self, key: &EnvKey, stage: &str) -> PathBuf {
        self.base_dir
            .join(TMP_DIR)
            .join(format!("{}.{}", dir_name(key), stage))
    }

    fn purge_tmp(&self) -> Result<(), DirError> {
        let tmp = self.base_dir.join(TMP_DIR);
        fs::create_dir_all(&tmp)?;
        for entry in fs::read_dir(&tmp)? {
            let path = entry?.path();
            tracing::info!(path = %path.display(), "purging interrupted directory operation");
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

fn dir_name(key: &EnvKey) -> String {
    format!("cluster_{}_tenant_{}", key.cluster_id, key.tenant_id)
}

fn parse_dir_name(name: &str) -> Option<EnvKey> {
    let rest = name.strip_prefix("cluster_")?;
    let (cluster, tenant) = rest.split_once("_tenant_")?;
    let key = EnvKey::new(cluster.parse().ok()?, tenant.parse().ok()?);
    key.is_valid().then_some(key)
}

/// Delete a directory already moved into `tmp/`. Returns whether it went.
fn discard(trash: &Path) -> bool {
    match fs::remove_dir_all(trash) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %trash.display(), error = %e, "failed to delete removed tenant directory");
            false
        }
    }
}

fn arb_path(dir: &Path, instance_id: InstanceId) -> PathBuf {
    dir.join(format!("{}{}.json", ARB_PREFIX, instance_id))
}

fn load_arbitrations(dir: &Path) -> Result<Vec<ArbitrationRecord>, DirError> {
    let mut records = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_arb = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(ARB_PREFIX) && n.ends_with(".json"));
        if is_arb {
            records.push(read_record::<ArbitrationRecord>(&path)?);
        }
    }
    records.sort_by_key(|r| r.instance_id);
    Ok(records)
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "tenant_dir_tests.rs"]
mod tests;
