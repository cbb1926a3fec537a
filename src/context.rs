//! Host facts that never change while the agent runs.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::fsutil;
use crate::procfs;

const FALLBACK_HOSTNAME: &str = "localhost";

/// Immutable per-host context, built once at startup and shared by every reader.
///
/// All kernel paths are resolved relative to [`Context::root`], which is `/` on the host
/// or the mounted host root inside a container (and a temporary tree in tests).
#[derive(Debug, Clone)]
pub struct Context {
    root: PathBuf,
    tick_rate: f64,
    boot_time: SystemTime,
    kernel: String,
    distribution: String,
    hostname: String,
}

impl Context {
    /// Creates a context with explicit values and no host identity.
    pub fn new(root: impl Into<PathBuf>, tick_rate: f64, boot_time: SystemTime) -> Self {
        Self {
            root: root.into(),
            tick_rate,
            boot_time,
            kernel: String::new(),
            distribution: String::new(),
            hostname: FALLBACK_HOSTNAME.to_owned(),
        }
    }

    /// Inspects the host under `root`: boot time from `proc/uptime`, kernel from
    /// `proc/sys/kernel/{ostype,osrelease}`, distribution from `etc/issue.net`, hostname from
    /// `proc/sys/kernel/hostname`. Missing sources degrade to empty values.
    pub fn detect(root: impl Into<PathBuf>, tick_rate: f64) -> Self {
        let mut ctx = Self::new(root, tick_rate, SystemTime::now());

        match procfs::read_uptime(&ctx.proc_path("uptime")) {
            Ok(uptime) => ctx.boot_time = uptime.boot_time(),
            Err(err) => log::warn!("cannot determine boot time: {err}"),
        }

        let ostype = fsutil::read_attribute(ctx.proc_path("sys/kernel/ostype")).unwrap_or_default();
        let release =
            fsutil::read_attribute(ctx.proc_path("sys/kernel/osrelease")).unwrap_or_default();
        ctx.kernel = format!("{ostype} {release}").trim().to_owned();
        ctx.distribution = fsutil::read_attribute(ctx.etc_path("issue.net")).unwrap_or_default();
        if let Some(hostname) = fsutil::read_attribute(ctx.proc_path("sys/kernel/hostname"))
            .filter(|h| !h.is_empty())
        {
            ctx.hostname = hostname;
        }

        ctx
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Kernel ticks per second (`USER_HZ`).
    pub fn tick_rate(&self) -> f64 {
        self.tick_rate
    }

    pub fn boot_time(&self) -> SystemTime {
        self.boot_time
    }

    pub fn kernel(&self) -> &str {
        &self.kernel
    }

    pub fn distribution(&self) -> &str {
        &self.distribution
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Converts a tick count to seconds.
    pub fn ticks_to_secs(&self, ticks: f64) -> f64 {
        ticks / self.tick_rate
    }

    /// Converts a tick offset since boot to an absolute point in time.
    pub fn ticks_since_boot(&self, ticks: u64) -> SystemTime {
        self.boot_time + Duration::from_secs_f64(self.ticks_to_secs(ticks as f64))
    }

    pub fn proc_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join("proc").join(rel)
    }

    pub fn pid_path(&self, pid: u32, rel: impl AsRef<Path>) -> PathBuf {
        self.proc_path(pid.to_string()).join(rel)
    }

    pub fn sys_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join("sys").join(rel)
    }

    pub fn etc_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join("etc").join(rel)
    }

    pub fn var_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join("var").join(rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_reads_host_identity() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("proc/sys/kernel")).unwrap();
        std::fs::create_dir_all(root.join("etc")).unwrap();
        std::fs::write(root.join("proc/uptime"), "3600.50 7000.00\n").unwrap();
        std::fs::write(root.join("proc/sys/kernel/ostype"), "Linux\n").unwrap();
        std::fs::write(root.join("proc/sys/kernel/osrelease"), "6.1.0\n").unwrap();
        std::fs::write(root.join("proc/sys/kernel/hostname"), "db01\n").unwrap();
        std::fs::write(root.join("etc/issue.net"), "Debian GNU/Linux 12\n").unwrap();

        let ctx = Context::detect(root, 100.0);
        assert_eq!(ctx.kernel(), "Linux 6.1.0");
        assert_eq!(ctx.distribution(), "Debian GNU/Linux 12");
        assert_eq!(ctx.hostname(), "db01");

        let up = SystemTime::now().duration_since(ctx.boot_time()).unwrap();
        assert!(up >= Duration::from_secs(3600) && up < Duration::from_secs(3700));
    }

    #[test]
    fn test_detect_on_empty_root_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::detect(dir.path(), 100.0);
        assert_eq!(ctx.kernel(), "");
        assert_eq!(ctx.hostname(), "localhost");
    }

    #[test]
    fn test_paths_and_ticks() {
        let boot = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let ctx = Context::new("/rootfs", 100.0, boot);
        assert_eq!(ctx.pid_path(42, "stat"), PathBuf::from("/rootfs/proc/42/stat"));
        assert_eq!(ctx.sys_path("class/net"), PathBuf::from("/rootfs/sys/class/net"));
        assert_eq!(ctx.ticks_to_secs(250.0), 2.5);
        assert_eq!(
            ctx.ticks_since_boot(500),
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_005)
        );
    }
}
