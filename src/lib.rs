//! Hostwatch: a Linux host telemetry agent.
//!
//! Reads the host's kernel tables under `proc/` and `sys/` and its session accounting
//! files, and periodically publishes everything as one immutable [`collector::Snapshot`].
//!
//! When running inside a container the host root is expected to be mounted (by default
//! at `/rootfs`) and every path is resolved under it.

pub mod collector;
pub mod config;
pub mod context;
pub mod encode;
pub mod environment;
pub mod error;
pub mod fsutil;
pub mod net;
pub mod procfs;
pub mod session;
pub mod users;

use std::sync::Arc;

use collector::Collector;
use config::Config;
use context::Context;

/// Runs the agent until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the shutdown signal cannot be
/// installed. Failures to read kernel state are never fatal; they are reported in the
/// snapshot's per-category status.
///
/// # Examples
///
/// ```bash
/// HOSTWATCH_INTERVAL_SECS=10 RUST_LOG=info cargo run
/// ```
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let rootfs = config.resolved_rootfs();
    log::debug!("Final rootfs: {}", rootfs.display());

    let ctx = Context::detect(rootfs, config.tick_rate);
    log::info!(
        "monitoring {} ({}, {}) every {:?}",
        ctx.hostname(),
        ctx.kernel(),
        ctx.distribution(),
        config.refresh_interval
    );

    let collector = Arc::new(Collector::new(ctx, &config));
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let worker = {
        let collector = Arc::clone(&collector);
        tokio::spawn(async move {
            collector
                .run(async {
                    let _ = stop_rx.await;
                })
                .await;
        })
    };

    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");
    let _ = stop_tx.send(());
    worker.await?;

    if log::log_enabled!(log::Level::Trace) {
        let snapshot = collector.snapshot();
        log::trace!(
            "final snapshot: {}",
            encode::encode_snapshot(&snapshot, collector.context())
        );
    }
    Ok(())
}
