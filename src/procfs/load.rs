//! Single-line readers for `/proc/loadavg` and `/proc/uptime`.

use std::io::BufRead;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::error::StatParseError;
use super::parser::SingleLineStat;
use super::{Error, Result};
use crate::fsutil;

fn next_decimal<'a>(parts: &mut impl Iterator<Item = &'a str>) -> std::io::Result<f64> {
    let value = parts
        .next()
        .ok_or(StatParseError::MissingValue { line: 1 })?;
    value.parse().map_err(|source| {
        StatParseError::InvalidDecimal {
            value: value.to_owned(),
            line: 1,
            source,
        }
        .into()
    })
}

/// System load averaged over one, five and fifteen minutes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

impl SingleLineStat for LoadAverage {
    /// Parses the three leading floats of `0.52 0.58 0.59 1/389 12345`.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut line = String::new();
        buf.read_line(&mut line)?;
        let mut parts = line.split_whitespace();
        Ok(Self {
            one: next_decimal(&mut parts)?,
            five: next_decimal(&mut parts)?,
            fifteen: next_decimal(&mut parts)?,
        })
    }
}

/// Time since boot, as reported by `/proc/uptime`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Uptime {
    /// Seconds since boot.
    pub seconds: f64,
    /// Seconds all cores spent idle. Zero when the kernel omits it.
    pub idle: f64,
}

impl Uptime {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.seconds.max(0.0))
    }

    /// Wall-clock time the host booted, relative to now.
    pub fn boot_time(&self) -> SystemTime {
        let now = SystemTime::now();
        now.checked_sub(self.duration()).unwrap_or(now)
    }
}

impl SingleLineStat for Uptime {
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut line = String::new();
        buf.read_line(&mut line)?;
        let mut parts = line.split_whitespace();
        let seconds = next_decimal(&mut parts)?;
        let idle = next_decimal(&mut parts).unwrap_or(0.0);
        Ok(Self { seconds, idle })
    }
}

fn read_single<S: SingleLineStat>(path: &Path) -> Result<S> {
    let mut reader = fsutil::open_file_reader(path)?;
    S::from_reader(&mut reader).map_err(|e| Error::from_io(path, e))
}

/// Reads the 1, 5 and 15 minute load averages.
///
/// # Arguments
///
/// * `path` - Path to a `loadavg` file, normally `proc/loadavg` under the host root.
///
/// # Returns
///
/// The three averages; the runnable count and last pid on the same line are ignored.
///
/// # Errors
///
/// - [`Error::UnavailableSource`] if the file is missing or unreadable.
/// - [`Error::Malformed`] if a load value is missing or is not a decimal.
/// - [`Error::Io`] for any other read failure.
pub fn read_loadavg(path: impl AsRef<Path>) -> Result<LoadAverage> {
    read_single(path.as_ref())
}

/// Reads the time since boot.
///
/// # Arguments
///
/// * `path` - Path to an `uptime` file, normally `proc/uptime` under the host root.
///
/// # Returns
///
/// The uptime and the accumulated idle time of all CPUs.
///
/// # Errors
///
/// Same as [`read_loadavg`]: an unavailable source, a malformed first line, or an I/O
/// failure.
pub fn read_uptime(path: impl AsRef<Path>) -> Result<Uptime> {
    read_single(path.as_ref())
}
