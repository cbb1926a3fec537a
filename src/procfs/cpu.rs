//! CPU tick sampling from `/proc/stat` and percentage usage derivation.
//!
//! Every row whose first token starts with `cpu` (the aggregate `cpu` row and one `cpuN`
//! row per core) becomes a [`CpuTicks`] sample: up to ten cumulative tick counters
//! converted to seconds with the system tick rate. Usage is the per-field share of the
//! elapsed total between two samples of the same label.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::error::StatParseError;
use super::{Error, Result};
use crate::context::Context;
use crate::fsutil;

const ROW_PREFIX: &str = "cpu";
const MIN_FIELDS: usize = 4;

/// Cumulative CPU time of one `cpu*` row, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuTicks {
    /// `cpu` for the aggregate row, `cpuN` for core `N`.
    pub label: String,
    pub timestamp: SystemTime,
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    pub guest: f64,
    pub guest_nice: f64,
}

impl CpuTicks {
    /// Elapsed time accounted by this row. `guest` and `guest_nice` are already part of
    /// `user` and `nice`, so they are not added again.
    pub fn total(&self) -> f64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    pub fn is_aggregate(&self) -> bool {
        self.label == ROW_PREFIX
    }

    fn fields(&self) -> [f64; 10] {
        [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
            self.guest,
            self.guest_nice,
        ]
    }

    fn from_row(label: &str, values: &[u64], tick_rate: f64, timestamp: SystemTime) -> Self {
        let get = |i: usize| values.get(i).copied().unwrap_or(0) as f64 / tick_rate;
        Self {
            label: label.to_owned(),
            timestamp,
            user: get(0),
            nice: get(1),
            system: get(2),
            idle: get(3),
            iowait: get(4),
            irq: get(5),
            softirq: get(6),
            steal: get(7),
            guest: get(8),
            guest_nice: get(9),
        }
    }
}

/// Percentage of elapsed CPU time spent in each state between two samples.
///
/// Every field lies in `[0, 100]`; `total` is `100 - idle`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CpuUsage {
    pub label: String,
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    pub guest: f64,
    pub guest_nice: f64,
    pub total: f64,
}

fn share(current: f64, previous: f64, total_delta: f64) -> f64 {
    let pct = 100.0 * (current - previous) / total_delta;
    if pct.is_nan() || pct < 0.0 {
        0.0
    } else {
        pct.min(100.0)
    }
}

/// Derives usage from two samples of the same label.
///
/// Returns `None` if the labels differ. A zero (or negative) elapsed total yields an
/// all-zero record.
pub fn usage(current: &CpuTicks, previous: &CpuTicks) -> Option<CpuUsage> {
    if current.label != previous.label {
        return None;
    }

    let total_delta = current.total() - previous.total();
    if total_delta.is_nan() || total_delta <= 0.0 {
        return Some(CpuUsage {
            label: current.label.clone(),
            ..CpuUsage::default()
        });
    }

    let c = current.fields();
    let p = previous.fields();
    let pct: [f64; 10] = std::array::from_fn(|i| share(c[i], p[i], total_delta));

    Some(CpuUsage {
        label: current.label.clone(),
        user: pct[0],
        nice: pct[1],
        system: pct[2],
        idle: pct[3],
        iowait: pct[4],
        irq: pct[5],
        softirq: pct[6],
        steal: pct[7],
        guest: pct[8],
        guest_nice: pct[9],
        total: (100.0 - pct[3]).clamp(0.0, 100.0),
    })
}

/// Derives usage for every label present in both sweeps, in the order of `current`.
///
/// Rows are paired by label, so a core that appears or disappears between the sweeps
/// is dropped instead of being paired with a neighbour.
pub fn usage_between(current: &[CpuTicks], previous: &[CpuTicks]) -> Vec<CpuUsage> {
    let by_label: HashMap<&str, &CpuTicks> =
        previous.iter().map(|t| (t.label.as_str(), t)).collect();

    current
        .iter()
        .filter_map(|cur| match by_label.get(cur.label.as_str()) {
            Some(prev) => usage(cur, prev),
            None => {
                log::debug!("no previous sample for `{}`", cur.label);
                None
            }
        })
        .collect()
}

/// Parses every `cpu*` row of a `stat` file.
///
/// # Errors
///
/// Returns an `io::Error` if reading fails, or one of kind `InvalidData` if a row has a
/// non-numeric counter or fewer than four counters.
pub fn parse_stat<R: BufRead>(
    reader: &mut R,
    tick_rate: f64,
    timestamp: SystemTime,
) -> std::io::Result<Vec<CpuTicks>> {
    let mut samples = Vec::new();
    let mut line = String::new();
    let mut lineno = 0;

    while reader.read_line(&mut line)? != 0 {
        lineno += 1;
        let mut tokens = line.split_whitespace();
        if let Some(label) = tokens.next().filter(|t| t.starts_with(ROW_PREFIX)) {
            let values = tokens
                .take(10)
                .map(|v| {
                    v.parse::<u64>().map_err(|source| StatParseError::InvalidValue {
                        value: v.to_owned(),
                        line: lineno,
                        source,
                    })
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            if values.len() < MIN_FIELDS {
                return Err(StatParseError::MissingValue { line: lineno }.into());
            }
            samples.push(CpuTicks::from_row(label, &values, tick_rate, timestamp));
        }
        line.clear();
    }

    Ok(samples)
}

/// Reads one sweep of tick counters from `path`.
pub fn read_ticks(path: impl AsRef<Path>, tick_rate: f64) -> Result<Vec<CpuTicks>> {
    let path = path.as_ref();
    let mut reader = fsutil::open_file_reader(path)?;
    parse_stat(&mut reader, tick_rate, SystemTime::now()).map_err(|e| Error::from_io(path, e))
}

/// Reads one sweep of tick counters of the host described by `ctx`.
pub fn sample(ctx: &Context) -> Result<Vec<CpuTicks>> {
    read_ticks(ctx.proc_path("stat"), ctx.tick_rate())
}

/// Takes two sweeps `interval` apart and derives usage for every row.
pub async fn measure(ctx: &Context, interval: Duration) -> Result<Vec<CpuUsage>> {
    let previous = sample(ctx)?;
    tokio::time::sleep(interval).await;
    let current = sample(ctx)?;
    Ok(usage_between(&current, &previous))
}
