//! Shared fixtures for the behavioral tests

use std::path::Path;
use std::time::{Duration, Instant};

pub use std::sync::Arc;
pub use strand_core::{
    combine, Address, ChecksumChain, ChecksumError, ClusterId, EnvKey, InstanceId, MemberList,
    StreamId, TenantRole,
};
pub use strand_engine::{
    EnvError, EnvironmentRegistry, LoopState, Maintained, MaintenanceConfig, MaintenanceLoop,
    StreamConfig, StreamRole,
};

/// A node's data directory, removed when the fixture drops
pub struct Node {
    dir: tempfile::TempDir,
}

impl Node {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Registry over the node directory with nothing loaded yet
    pub fn open(&self) -> EnvironmentRegistry {
        EnvironmentRegistry::open(self.path(), StreamConfig::default()).unwrap()
    }

    /// Registry over the node directory, restarted from disk
    pub fn boot(&self) -> EnvironmentRegistry {
        let registry = self.open();
        registry.restart().unwrap();
        registry
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

pub fn tenant_count(registry: &EnvironmentRegistry, cluster_id: u64) -> u64 {
    registry
        .get_cluster_meta_info(ClusterId(cluster_id))
        .unwrap()
        .tenant_count
}

pub fn members(addrs: &[&str]) -> MemberList {
    addrs.iter().map(|a| Address::new(*a)).collect()
}

/// Poll `cond` until it holds or five seconds pass
pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}
