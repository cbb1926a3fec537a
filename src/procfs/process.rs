//! Process enumeration from `/proc/<pid>/`.
//!
//! Each numeric entry of `proc/` is inspected independently: `status` gives identity and
//! ownership, `cmdline` the argument vector, `fd/0` the controlling terminal, and `stat`
//! is re-read over a short [`SamplingWindow`] to derive a CPU share. Inspections run as
//! concurrent tasks bounded by a worker limit; a process that exits mid-scan only drops
//! its own entry.

use std::collections::HashMap;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::parser::{FieldHandler, KeyValueStat, first_token};
use super::{Error, Result};
use crate::context::Context;
use crate::error::ResultOkLogExt;
use crate::fsutil;
use crate::users::UserResolver;

/// How often and how fast a process's `stat` is re-read to compute its CPU share.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingWindow {
    /// Number of reads; the share is averaged over `samples - 1` steps.
    pub samples: usize,
    pub interval: Duration,
}

impl Default for SamplingWindow {
    fn default() -> Self {
        Self {
            samples: 5,
            interval: Duration::from_millis(10),
        }
    }
}

/// Fields of `/proc/<pid>/status`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessStatus {
    pub name: String,
    /// State code, e.g. `S` of `S (sleeping)`.
    pub state: String,
    pub pid: u32,
    pub ppid: u32,
    /// Real uid.
    pub uid: u32,
    /// Real gid.
    pub gid: u32,
}

impl ProcessStatus {
    fn set_name(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.name = v.to_owned();
        Ok(())
    }

    fn set_state(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.state = first_token(v).to_owned();
        Ok(())
    }

    fn set_pid(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.pid = first_token(v).parse()?;
        Ok(())
    }

    fn set_ppid(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.ppid = first_token(v).parse()?;
        Ok(())
    }

    fn set_uid(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.uid = first_token(v).parse()?;
        Ok(())
    }

    fn set_gid(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.gid = first_token(v).parse()?;
        Ok(())
    }
}

static STATUS_SETTERS: LazyLock<HashMap<&'static str, FieldHandler<ProcessStatus>>> =
    LazyLock::new(|| {
        let mut m: HashMap<&'static str, FieldHandler<ProcessStatus>> = HashMap::with_capacity(6);

        m.insert("Name", ProcessStatus::set_name);
        m.insert("State", ProcessStatus::set_state);
        m.insert("Pid", ProcessStatus::set_pid);
        m.insert("PPid", ProcessStatus::set_ppid);
        m.insert("Uid", ProcessStatus::set_uid);
        m.insert("Gid", ProcessStatus::set_gid);

        m
    });

impl KeyValueStat for ProcessStatus {
    const SEPARATOR: char = ':';
    const SKIP_LINES: usize = 0;
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, FieldHandler<Self>> {
        &STATUS_SETTERS
    }
}

/// Tick counters of `/proc/<pid>/stat` used for CPU accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatTimes {
    pub utime: u64,
    pub stime: u64,
    /// Start time in ticks after boot.
    pub starttime: u64,
}

// Offsets counted from the state field, the first one after the closing `)` of `comm`.
const UTIME_IDX: usize = 11;
const STIME_IDX: usize = 12;
const STARTTIME_IDX: usize = 19;

impl StatTimes {
    /// Parses a `stat` line. `comm` may contain spaces and parentheses, so fields are
    /// counted after the last `)`.
    pub fn parse(line: &str) -> Option<Self> {
        let (_, rest) = line.rsplit_once(')')?;
        let fields: Vec<&str> = rest.split_whitespace().collect();
        Some(Self {
            utime: fields.get(UTIME_IDX)?.parse().ok()?,
            stime: fields.get(STIME_IDX)?.parse().ok()?,
            starttime: fields.get(STARTTIME_IDX)?.parse().ok()?,
        })
    }

    pub fn busy_ticks(&self) -> u64 {
        self.utime + self.stime
    }
}

/// Splits a NUL-separated `cmdline` into its arguments.
pub fn parse_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|b| *b == 0)
        .filter(|arg| !arg.is_empty())
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect()
}

/// Busy CPU time of a process at one point in time.
#[derive(Debug, Clone, Copy)]
pub struct TickReading {
    pub busy_secs: f64,
    pub at: Instant,
}

/// Mean CPU share in percent over consecutive readings, `0.0` with fewer than two.
pub fn mean_share(readings: &[TickReading]) -> f64 {
    let steps: Vec<f64> = readings
        .windows(2)
        .map(|w| {
            let elapsed = w[1].at.saturating_duration_since(w[0].at).as_secs_f64();
            if elapsed > 0.0 {
                (100.0 * (w[1].busy_secs - w[0].busy_secs) / elapsed).max(0.0)
            } else {
                0.0
            }
        })
        .collect();
    if steps.is_empty() {
        0.0
    } else {
        steps.iter().sum::<f64>() / steps.len() as f64
    }
}

/// One running process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    pub name: String,
    pub state: String,
    pub uid: u32,
    pub gid: u32,
    pub user: String,
    pub group: String,
    /// CPU share in percent of one core over the sampling window.
    pub cpu: f64,
    /// Seconds since the process started.
    pub uptime: f64,
    pub cmdline: Vec<String>,
    /// Controlling terminal, e.g. `pts/0`.
    pub tty: Option<String>,
}

async fn read_blocking(path: PathBuf) -> std::io::Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || std::fs::read(path))
        .await
        .map_err(std::io::Error::other)?
}

fn read_status(path: &Path) -> Result<ProcessStatus> {
    let mut reader = fsutil::open_file_reader(path)?;
    ProcessStatus::from_reader(&mut reader).map_err(|e| Error::from_io(path, e))
}

/// Terminal attached to the process's stdin, if it is a tty or pseudo-terminal.
pub fn terminal(ctx: &Context, pid: u32) -> Option<String> {
    let target = std::fs::read_link(ctx.pid_path(pid, "fd/0")).ok()?;
    let target = target.to_str()?;
    let tty = target.strip_prefix("/dev/")?;
    (tty.starts_with("pts/") || tty.starts_with("tty")).then(|| tty.to_owned())
}

/// Best-effort process name: the base name of `argv[0]`, falling back to `comm` for
/// kernel threads and processes that rewrote their arguments to nothing.
pub fn command_name(ctx: &Context, pid: u32) -> Option<String> {
    let from_cmdline = std::fs::read(ctx.pid_path(pid, "cmdline"))
        .ok()
        .and_then(|raw| parse_cmdline(&raw).into_iter().next())
        .and_then(|argv0| {
            Path::new(&argv0)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        });
    from_cmdline
        .or_else(|| fsutil::read_attribute(ctx.pid_path(pid, "comm")))
        .filter(|name| !name.is_empty())
}

struct CpuSample {
    share: f64,
    starttime: u64,
}

/// Re-reads `stat` `window.samples` times. Returns `None` if the process vanished.
async fn sample_cpu(ctx: &Context, pid: u32, window: &SamplingWindow) -> Option<CpuSample> {
    let path = ctx.pid_path(pid, "stat");
    let mut ticker = tokio::time::interval(window.interval.max(Duration::from_millis(1)));
    let mut readings = Vec::with_capacity(window.samples);
    let mut starttime = 0;

    for _ in 0..window.samples {
        ticker.tick().await;
        let raw = read_blocking(path.clone()).await.ok_log_debug()?;
        let times = StatTimes::parse(&String::from_utf8_lossy(&raw))?;
        starttime = times.starttime;
        readings.push(TickReading {
            busy_secs: ctx.ticks_to_secs(times.busy_ticks() as f64),
            at: Instant::now(),
        });
    }

    Some(CpuSample {
        share: mean_share(&readings),
        starttime,
    })
}

/// Builds the record of one process. Returns `None` if its `status` cannot be read.
pub async fn inspect(
    ctx: Arc<Context>,
    users: Arc<UserResolver>,
    pid: u32,
    window: SamplingWindow,
) -> Option<ProcessRecord> {
    let (status, cmdline, tty) = {
        let ctx = Arc::clone(&ctx);
        tokio::task::spawn_blocking(move || {
            let status = read_status(&ctx.pid_path(pid, "status")).ok_log_debug()?;
            let cmdline = std::fs::read(ctx.pid_path(pid, "cmdline"))
                .map(|raw| parse_cmdline(&raw))
                .unwrap_or_default();
            Some((status, cmdline, terminal(&ctx, pid)))
        })
        .await
        .ok_log()??
    };

    let (cpu, uptime) = match sample_cpu(&ctx, pid, &window).await {
        Some(sample) => {
            let started = ctx.ticks_since_boot(sample.starttime);
            let uptime = SystemTime::now()
                .duration_since(started)
                .unwrap_or_default()
                .as_secs_f64();
            (sample.share, uptime)
        }
        None => (0.0, 0.0),
    };

    Some(ProcessRecord {
        pid,
        ppid: status.ppid,
        user: users.user(status.uid).unwrap_or_default(),
        group: users.group(status.gid).unwrap_or_default(),
        name: status.name,
        state: status.state,
        uid: status.uid,
        gid: status.gid,
        cpu,
        uptime,
        cmdline,
        tty,
    })
}

/// Lists every process of the host, sampling at most `workers` processes at a time.
///
/// # Errors
///
/// Returns [`Error::UnavailableSource`] if `proc/` cannot be listed. Failures of single
/// processes are not errors.
pub async fn enumerate(
    ctx: Arc<Context>,
    users: Arc<UserResolver>,
    window: SamplingWindow,
    workers: usize,
) -> Result<Vec<ProcessRecord>> {
    let pids = fsutil::numeric_entries(ctx.proc_path(""))?;
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();

    for pid in &pids {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let (ctx, users, window, pid) = (Arc::clone(&ctx), Arc::clone(&users), window.clone(), *pid);
        tasks.spawn(async move {
            let _permit = permit;
            inspect(ctx, users, pid, window).await
        });
    }

    let mut out = Vec::with_capacity(pids.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(record)) => out.push(record),
            Ok(None) => {}
            Err(err) => log::warn!(target: "process", "process inspection task failed: {err}"),
        }
    }
    out.sort_unstable_by_key(|p| p.pid);
    log::trace!(target: "process", "enumerated {} of {} processes", out.len(), pids.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT_LINE: &str = "42 (my (odd) proc) S 1 42 42 0 -1 4194560 100 200 0 0 150 50 0 0 20 0 1 0 500 1000 10";

    fn write_process(root: &Path, pid: u32, name: &str, uid: u32) {
        let dir = root.join("proc").join(pid.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("status"),
            format!(
                "Name:\t{name}\nUmask:\t0022\nState:\tS (sleeping)\nTgid:\t{pid}\nPid:\t{pid}\nPPid:\t1\n\
                 Uid:\t{uid}\t{uid}\t{uid}\t{uid}\nGid:\t{uid}\t{uid}\t{uid}\t{uid}\n"
            ),
        )
        .unwrap();
        std::fs::write(dir.join("stat"), STAT_LINE).unwrap();
        std::fs::write(dir.join("cmdline"), format!("/usr/bin/{name}\0--flag\0with space\0")).unwrap();
    }

    #[test]
    fn test_status_parse() {
        let data = b"Name:\tsshd\nState:\tR (running)\nPid:\t77\nPPid:\t1\nUid:\t0\t0\t0\t0\nGid:\t5\t5\t5\t5\n";
        let status = ProcessStatus::from_reader(&mut &data[..]).unwrap();
        assert_eq!(
            status,
            ProcessStatus {
                name: "sshd".into(),
                state: "R".into(),
                pid: 77,
                ppid: 1,
                uid: 0,
                gid: 5,
            }
        );
    }

    #[test]
    fn test_stat_times_after_comm() {
        let times = StatTimes::parse(STAT_LINE).unwrap();
        assert_eq!(
            times,
            StatTimes {
                utime: 150,
                stime: 50,
                starttime: 500
            }
        );
        assert_eq!(times.busy_ticks(), 200);
        assert!(StatTimes::parse("42 (short) S 1").is_none());
    }

    #[test]
    fn test_parse_cmdline() {
        assert_eq!(parse_cmdline(b"nginx\0-g\0daemon off;\0"), ["nginx", "-g", "daemon off;"]);
        assert!(parse_cmdline(b"").is_empty());
    }

    #[test]
    fn test_mean_share() {
        let t0 = Instant::now();
        let readings = [
            TickReading { busy_secs: 1.0, at: t0 },
            TickReading { busy_secs: 1.5, at: t0 + Duration::from_secs(1) },
            TickReading { busy_secs: 1.6, at: t0 + Duration::from_secs(2) },
        ];
        let share = mean_share(&readings);
        assert!((share - 30.0).abs() < 1e-9);
        assert_eq!(mean_share(&readings[..1]), 0.0);
    }

    #[tokio::test]
    async fn test_enumerate_skips_vanished_processes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_process(root, 1, "init", 0);
        write_process(root, 42, "worker", 1000);
        // listed but gone before its status was read
        std::fs::create_dir_all(root.join("proc/99")).unwrap();
        std::fs::create_dir_all(root.join("proc/self")).unwrap();
        std::fs::create_dir_all(root.join("etc")).unwrap();
        std::fs::write(root.join("etc/passwd"), "root:x:0:0::/root:/bin/sh\n").unwrap();
        std::fs::write(root.join("etc/group"), "root:x:0:\n").unwrap();

        let boot = SystemTime::now() - Duration::from_secs(100);
        let ctx = Arc::new(Context::new(root, 100.0, boot));
        let users = Arc::new(UserResolver::new(&ctx));
        users.reload();
        let window = SamplingWindow {
            samples: 2,
            interval: Duration::from_millis(1),
        };

        let procs = enumerate(Arc::clone(&ctx), users, window, 1).await.unwrap();
        assert_eq!(procs.iter().map(|p| p.pid).collect::<Vec<_>>(), [1, 42]);

        let worker = &procs[1];
        assert_eq!(worker.name, "worker");
        assert_eq!(worker.state, "S");
        assert_eq!(worker.user, "");
        assert_eq!(procs[0].user, "root");
        assert_eq!(procs[0].group, "root");
        assert_eq!(worker.cmdline, ["/usr/bin/worker", "--flag", "with space"]);
        assert_eq!(worker.cpu, 0.0);
        // started 5s after boot, 100s ago
        assert!(worker.uptime > 94.0 && worker.uptime < 100.0);
        assert_eq!(worker.tty, None);
        assert_eq!(command_name(&ctx, 42).as_deref(), Some("worker"));
    }

    #[tokio::test]
    async fn test_missing_stat_keeps_status() {
        let dir = tempfile::tempdir().unwrap();
        write_process(dir.path(), 7, "short", 0);
        std::fs::remove_file(dir.path().join("proc/7/stat")).unwrap();

        let ctx = Arc::new(Context::new(dir.path(), 100.0, SystemTime::now()));
        let users = Arc::new(UserResolver::new(&ctx));
        let record = inspect(ctx, users, 7, SamplingWindow::default()).await.unwrap();
        assert_eq!(record.name, "short");
        assert_eq!(record.cpu, 0.0);
        assert_eq!(record.uptime, 0.0);
    }

    #[tokio::test]
    async fn test_non_utf8_name_is_listed() {
        let dir = tempfile::tempdir().unwrap();
        write_process(dir.path(), 5, "placeholder", 0);
        std::fs::write(
            dir.path().join("proc/5/status"),
            b"Name:\tw\xffrk\nState:\tR (running)\nPid:\t5\nPPid:\t1\nUid:\t0\t0\t0\t0\nGid:\t0\t0\t0\t0\n",
        )
        .unwrap();

        let ctx = Arc::new(Context::new(dir.path(), 100.0, SystemTime::now()));
        let users = Arc::new(UserResolver::new(&ctx));
        let window = SamplingWindow {
            samples: 2,
            interval: Duration::from_millis(1),
        };
        let procs = enumerate(ctx, users, window, 2).await.unwrap();
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].name, "w\u{FFFD}rk");
        assert_eq!(procs[0].state, "R");
    }

    #[tokio::test]
    async fn test_missing_proc_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(Context::new(dir.path(), 100.0, SystemTime::now()));
        let users = Arc::new(UserResolver::new(&ctx));
        let err = enumerate(ctx, users, SamplingWindow::default(), 4).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_command_name_falls_back_to_comm() {
        let dir = tempfile::tempdir().unwrap();
        let proc_dir = dir.path().join("proc/2");
        std::fs::create_dir_all(&proc_dir).unwrap();
        std::fs::write(proc_dir.join("cmdline"), "").unwrap();
        std::fs::write(proc_dir.join("comm"), "kthreadd\n").unwrap();
        let ctx = Context::new(dir.path(), 100.0, SystemTime::now());
        assert_eq!(command_name(&ctx, 2).as_deref(), Some("kthreadd"));
        assert_eq!(command_name(&ctx, 3), None);
    }
}
