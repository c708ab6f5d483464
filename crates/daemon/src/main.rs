// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Strand daemon (strandd)
//!
//! Hosts the log-stream environment registry for this node, runs its
//! maintenance loop, and serves requests over a Unix socket.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;
use std::sync::Arc;

use strand_daemon::{lifecycle, server, DaemonConfig, LifecycleError};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "/etc/strand/strandd.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    // Load configuration
    let config = DaemonConfig::load(&config_path)?;

    // Write startup marker to log (before tracing setup)
    write_startup_marker(&config)?;

    // Set up logging
    let log_guard = setup_logging(&config)?;

    info!(
        config = %config_path.display(),
        base_dir = %config.base_dir.display(),
        "starting strandd"
    );

    // Start daemon
    let mut daemon = match lifecycle::startup(&config).await {
        Ok(d) => d,
        Err(e) => {
            // Write error synchronously (tracing is non-blocking and may not flush in time)
            write_startup_error(&config, &e);
            error!(error = %e, "failed to start daemon");
            drop(log_guard);
            return Err(e.into());
        }
    };

    // Set up signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path().display(), "daemon ready");

    // Signal ready for parent process
    println!("READY");

    loop {
        tokio::select! {
            // Accept client connections
            result = daemon.listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let handler = Arc::clone(&daemon.handler);
                        tokio::spawn(async move {
                            if let Err(e) = server::handle_connection(handler, stream).await {
                                error!(error = %e, "error handling connection");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "error accepting connection");
                    }
                }
            }

            // Graceful shutdown on SIGTERM
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }

            // Graceful shutdown on SIGINT
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    daemon.shutdown()?;
    info!("daemon stopped");
    Ok(())
}

/// Startup marker prefix written to log before anything else.
/// Full format: "--- strandd: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- strandd: starting (pid: ";

/// Write startup marker to log file (appends to existing log)
fn write_startup_marker(config: &DaemonConfig) -> Result<(), LifecycleError> {
    use std::io::Write;

    let log_path = config.log_path();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write startup error synchronously to log file.
fn write_startup_error(config: &DaemonConfig, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())
    else {
        return;
    };
    let _ = writeln!(file, "ERROR failed to start daemon: {}", error);
}

fn setup_logging(
    config: &DaemonConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path = config.log_path();
    let (Some(dir), Some(file_name)) = (log_path.parent(), log_path.file_name()) else {
        return Err(LifecycleError::BadLogPath(log_path.clone()));
    };
    std::fs::create_dir_all(dir)?;

    // Set up file appender
    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Set up subscriber with env filter
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
