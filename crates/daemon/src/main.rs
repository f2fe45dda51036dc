// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work Queue Daemon (wqd)
//!
//! Background process that owns the work queues, the locking backend and
//! the expired lock reclaimer for one server.

use std::path::PathBuf;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info};
use wq_core::CoordinationConfig;
use wq_daemon::lifecycle;

/// How often queue state is written to the log
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up logging
    let _log_guard = setup_logging();

    // Load configuration; without a path the defaults apply
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            CoordinationConfig::load(&path)?
        }
        None => CoordinationConfig::default(),
    };

    info!("Starting wqd as server {}", config.server_id);

    // Start coordinator
    let coordinator = match lifecycle::startup(config).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to start coordinator: {}", e);
            return Err(e.into());
        }
    };

    // Set up signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    // Signal ready for parent process (e.g., systemd)
    println!("READY");

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    loop {
        tokio::select! {
            _ = status.tick() => {
                for queue in coordinator.queue_snapshots() {
                    debug!(
                        queue = %queue.name,
                        active = queue.active_workers,
                        pending = queue.queue_size,
                        stopped = queue.stopped,
                        "work queue status"
                    );
                }
            }

            // Graceful shutdown on SIGTERM
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }

            // Graceful shutdown on SIGINT
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                break;
            }
        }
    }

    coordinator.shutdown().await?;
    info!("Daemon stopped");
    Ok(())
}

fn setup_logging() -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());

    // Set up subscriber with env filter
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    guard
}
