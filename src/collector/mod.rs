//! Periodic collection of every category into a published [`Snapshot`].
//!
//! A refresh cycle fans out one task per [`Category`], each bounded by the configured
//! timeout, waits for all of them and then swaps the published snapshot in one step.
//! Readers clone an `Arc` under a shared lock and never wait on collection.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use hostwatch::{collector::Collector, config::Config, context::Context};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let ctx = Context::detect(config.resolved_rootfs(), config.tick_rate);
//! let collector = Arc::new(Collector::new(ctx, &config));
//! collector.refresh().await;
//! println!("{} processes", collector.snapshot().processes.len());
//! # Ok(())
//! # }
//! ```

mod snapshot;

pub use snapshot::{Category, CategoryStatus, CpuState, NetworkState, Snapshot};

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;

use crate::config::Config;
use crate::context::Context;
use crate::net::{self, Protocol};
use crate::procfs::{self, SamplingWindow, cpu, process};
use crate::session;
use crate::users::UserResolver;

/// What a failed category contributes to the next snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep the previous value and record the failure in the category status.
    KeepLastGood,
    /// Replace the previous value with an empty one.
    Overwrite,
}

#[derive(Debug, thiserror::Error)]
pub enum CategoryError {
    #[error(transparent)]
    Read(#[from] procfs::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

type CategoryResult<T> = Result<T, CategoryError>;

/// One-line summary of the latest snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct About {
    pub hostname: String,
    pub kernel: String,
    pub distribution: String,
    pub refreshed_at: Option<SystemTime>,
    pub boot_time: SystemTime,
    pub uptime: f64,
    pub users: usize,
    pub processes: usize,
    pub connections: usize,
    pub failed: Vec<Category>,
    /// A refresh cycle is in progress.
    pub collecting: bool,
}

#[derive(Debug)]
pub struct Collector {
    ctx: Arc<Context>,
    users: Arc<UserResolver>,
    refresh_interval: Duration,
    task_timeout: Duration,
    sampling: SamplingWindow,
    sample_workers: usize,
    policy: FailurePolicy,
    snapshot: RwLock<Arc<Snapshot>>,
    // Held for the duration of a cycle.
    cycle: tokio::sync::Mutex<()>,
}

impl Collector {
    pub fn new(ctx: Context, config: &Config) -> Self {
        let users = UserResolver::new(&ctx);
        let empty = Snapshot::empty(ctx.boot_time());
        Self {
            ctx: Arc::new(ctx),
            users: Arc::new(users),
            refresh_interval: config.refresh_interval,
            task_timeout: config.task_timeout,
            sampling: config.sampling.clone(),
            sample_workers: config.sample_workers,
            policy: config.failure_policy,
            snapshot: RwLock::new(Arc::new(empty)),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Whether a refresh cycle is in progress.
    pub fn is_collecting(&self) -> bool {
        self.cycle.try_lock().is_err()
    }

    pub fn about(&self) -> About {
        let snap = self.snapshot();
        About {
            hostname: self.ctx.hostname().to_owned(),
            kernel: self.ctx.kernel().to_owned(),
            distribution: self.ctx.distribution().to_owned(),
            refreshed_at: snap.refreshed_at,
            boot_time: snap.boot_time,
            uptime: snap.uptime.seconds,
            users: snap.sessions.users(),
            processes: snap.processes.len(),
            connections: snap.connections.len(),
            failed: snap.failed(),
            collecting: self.is_collecting(),
        }
    }

    async fn guarded<T>(&self, fut: impl Future<Output = CategoryResult<T>>) -> CategoryResult<T> {
        match tokio::time::timeout(self.task_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CategoryError::Timeout(self.task_timeout)),
        }
    }

    /// Runs a blocking reader on the blocking pool, bounded by the task timeout.
    async fn blocking<T, F>(&self, read: F) -> CategoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Context, &UserResolver) -> procfs::Result<T> + Send + 'static,
    {
        let ctx = Arc::clone(&self.ctx);
        let users = Arc::clone(&self.users);
        self.guarded(async move {
            Ok::<_, CategoryError>(tokio::task::spawn_blocking(move || read(&ctx, &users)).await??)
        })
        .await
    }

    /// Runs one refresh cycle and publishes its snapshot.
    ///
    /// Concurrent calls are serialized. Category failures never fail the cycle.
    pub async fn refresh(&self) -> Arc<Snapshot> {
        let _cycle = self.cycle.lock().await;
        let started = Instant::now();
        let previous = self.snapshot();

        let reload = self.blocking(|_, users| {
            users.reload();
            Ok(())
        });
        if let Err(err) = reload.await {
            log::warn!(target: "collector", "cannot reload user names: {err}");
        }

        let previous_ticks = previous.cpu.ticks.clone();
        let (processes, memory, sessions, load, uptime, connections, cpu, network, filesystems) = tokio::join!(
            self.guarded(async {
                Ok::<_, CategoryError>(process::enumerate(
                    Arc::clone(&self.ctx),
                    Arc::clone(&self.users),
                    self.sampling.clone(),
                    self.sample_workers,
                )
                .await?)
            }),
            self.blocking(|ctx, _| procfs::read_memory(ctx.proc_path("meminfo"))),
            self.blocking(session::read_all),
            self.blocking(|ctx, _| procfs::read_loadavg(ctx.proc_path("loadavg"))),
            self.blocking(|ctx, _| procfs::read_uptime(ctx.proc_path("uptime"))),
            self.blocking(|ctx, users| net::read_connections(ctx, users, &Protocol::ALL)),
            self.blocking(move |ctx, _| {
                let ticks = cpu::sample(ctx)?;
                let usage = cpu::usage_between(&ticks, &previous_ticks);
                Ok(CpuState { ticks, usage })
            }),
            self.blocking(|ctx, _| {
                Ok(NetworkState {
                    interfaces: net::read_interfaces(ctx)?,
                    routes: net::read_routes(ctx)?,
                    links: net::read_links(ctx)?,
                })
            }),
            self.blocking(|ctx, _| procfs::read_mounts(ctx)),
        );

        let now = SystemTime::now();
        let mut next = Snapshot::clone(&previous);
        let mut merge = Merge {
            policy: self.policy,
            now,
            status: &mut next.status,
        };

        merge.apply(Category::Processes, processes, &mut next.processes, Vec::new);
        let mut pair = (next.memory, next.swap);
        merge.apply(Category::Memory, memory, &mut pair, || {
            (
                procfs::MemorySample::empty(procfs::Device::Mem),
                procfs::MemorySample::empty(procfs::Device::Swap),
            )
        });
        (next.memory, next.swap) = pair;
        merge.apply(Category::Sessions, sessions, &mut next.sessions, Default::default);
        merge.apply(Category::Load, load, &mut next.load, Default::default);
        merge.apply(Category::Uptime, uptime, &mut next.uptime, Default::default);
        merge.apply(Category::Connections, connections, &mut next.connections, Vec::new);
        merge.apply(Category::Cpu, cpu, &mut next.cpu, Default::default);
        merge.apply(Category::Network, network, &mut next.network, Default::default);
        merge.apply(Category::Filesystems, filesystems, &mut next.filesystems, Vec::new);

        if next.status(Category::Uptime).is_some_and(CategoryStatus::is_ok) {
            next.boot_time = next.uptime.boot_time();
        }
        next.refreshed_at = Some(now);

        let next = Arc::new(next);
        {
            let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            *guard = Arc::clone(&next);
        }
        log::trace!(target: "collector", "refresh took {:?}", started.elapsed());
        next
    }

    /// Refreshes immediately and then every interval until `shutdown` completes.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(self.refresh_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.refresh().await;
                    let about = self.about();
                    log::info!(
                        target: "collector",
                        "{} processes, {} connections, {} users, failed: {:?}",
                        about.processes,
                        about.connections,
                        about.users,
                        about.failed
                    );
                }
            }
        }
        log::debug!(target: "collector", "collector stopped");
    }
}

/// Applies category results to the next snapshot according to the failure policy.
struct Merge<'a> {
    policy: FailurePolicy,
    now: SystemTime,
    status: &'a mut BTreeMap<Category, CategoryStatus>,
}

impl Merge<'_> {
    fn apply<T>(
        &mut self,
        category: Category,
        result: CategoryResult<T>,
        slot: &mut T,
        empty: impl FnOnce() -> T,
    ) {
        let status = self.status.entry(category).or_default();
        match result {
            Ok(value) => {
                *slot = value;
                status.error = None;
                status.updated_at = Some(self.now);
            }
            Err(err) => {
                log::error!(target: "collector", "{category}: {err}");
                status.error = Some(err.to_string());
                if self.policy == FailurePolicy::Overwrite {
                    *slot = empty();
                    status.updated_at = Some(self.now);
                }
            }
        }
    }
}
