// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use strand_engine::{
    EnvError, EnvironmentRegistry, LoopError, LoopState, Maintained, MaintenanceLoop,
};
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

use crate::config::{ConfigError, DaemonConfig};
use crate::handler::PacketHandler;

/// Daemon state during operation
pub struct Daemon {
    pub config: DaemonConfig,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub listener: UnixListener,
    pub registry: Arc<EnvironmentRegistry>,
    pub handler: Arc<PacketHandler>,
    maintenance: MaintenanceLoop,
    pub start_time: Instant,
}

impl Daemon {
    pub fn maintenance_state(&self) -> LoopState {
        self.maintenance.state()
    }

    /// Stop maintenance and remove the socket and lock files
    pub fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("shutting down daemon");

        // 1. Stop the maintenance thread and release its registry handle
        let stopped = self.maintenance.destroy();

        // 2. Remove socket file
        remove_if_exists(&self.config.socket_path(), "socket");

        // 3. Remove lock file; the lock itself is released when lock_file drops
        remove_if_exists(&self.config.lock_path(), "lock");

        info!(
            environments = self.registry.len(),
            uptime_secs = self.start_time.elapsed().as_secs(),
            "daemon shutdown complete"
        );
        stopped.map_err(LifecycleError::from)
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("registry error: {0}")]
    Registry(#[from] EnvError),

    #[error("maintenance loop error: {0}")]
    Maintenance(#[from] LoopError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("log path {0} has no parent directory or file name")]
    BadLogPath(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon
pub async fn startup(config: &DaemonConfig) -> Result<Daemon, LifecycleError> {
    // 1. Base directory, needed for the lock file
    std::fs::create_dir_all(&config.base_dir)?;
    if let Some(parent) = config.lock_path().parent() {
        std::fs::create_dir_all(parent)?;
    }

    // 2. Acquire lock file FIRST - prevents races. A lock held by another
    //    daemon is left alone.
    let mut lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(config.lock_path())?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    match startup_inner(config, lock_file).await {
        Ok(daemon) => Ok(daemon),
        Err(e) => {
            // Clean up any resources created before failure
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &DaemonConfig, lock_file: File) -> Result<Daemon, LifecycleError> {
    // 3. Rebuild the registry from disk before accepting anything
    let registry = Arc::new(EnvironmentRegistry::open(config.data_dir(), config.stream.clone())?);
    registry.restart()?;
    info!(
        environments = registry.len(),
        data_dir = %config.data_dir().display(),
        "loaded environments"
    );

    // 4. Maintenance over every environment on this node
    let mut maintenance = MaintenanceLoop::with_system_clock(config.maintenance.clone());
    maintenance.init(Arc::clone(&registry) as Arc<dyn Maintained>)?;
    maintenance.start()?;

    // 5. Remove stale socket and bind (LAST - only after all validation passes)
    let socket_path = config.socket_path();
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let listener =
        UnixListener::bind(&socket_path).map_err(|e| LifecycleError::BindFailed(socket_path.clone(), e))?;

    let handler = Arc::new(PacketHandler::new(
        Arc::clone(&registry),
        config.self_address.clone(),
    ));

    info!(
        socket = %socket_path.display(),
        self_address = %config.self_address,
        "daemon started"
    );

    Ok(Daemon {
        config: config.clone(),
        lock_file,
        listener,
        registry,
        handler,
        maintenance,
        start_time: Instant::now(),
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &DaemonConfig) {
    let socket_path = config.socket_path();
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }
    let lock_path = config.lock_path();
    if lock_path.exists() {
        let _ = std::fs::remove_file(&lock_path);
    }
}

fn remove_if_exists(path: &std::path::Path, what: &str) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to remove {} file", what);
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
