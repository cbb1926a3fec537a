//! Agent configuration read from environment variables.
//!
//! | Variable                       | Default                  |
//! |--------------------------------|--------------------------|
//! | `HOSTWATCH_ROOTFS`             | `/rootfs` (containers)   |
//! | `HOSTWATCH_INTERVAL_SECS`      | `5`                      |
//! | `HOSTWATCH_TASK_TIMEOUT_SECS`  | `10`                     |
//! | `HOSTWATCH_SAMPLE_COUNT`       | `5`                      |
//! | `HOSTWATCH_SAMPLE_INTERVAL_MS` | `10`                     |
//! | `HOSTWATCH_SAMPLE_WORKERS`     | `32`                     |
//! | `HOSTWATCH_KEEP_LAST_GOOD`     | `true`                   |
//! | `CLK_TCK`                      | `100`                    |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::collector::FailurePolicy;
use crate::procfs::SamplingWindow;

const DEFAULT_HOST_ROOT: &str = "/rootfs";
const DEFAULT_TICK_RATE: f64 = 100.0;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for environment variable `{key}`: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fully resolved agent configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Explicit rootfs; `None` means "detect" (see [`crate::environment::resolve_rootfs`]).
    pub rootfs: Option<PathBuf>,
    pub refresh_interval: Duration,
    pub task_timeout: Duration,
    pub sampling: SamplingWindow,
    pub sample_workers: usize,
    pub failure_policy: FailurePolicy,
    pub tick_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rootfs: None,
            refresh_interval: Duration::from_secs(5),
            task_timeout: Duration::from_secs(10),
            sampling: SamplingWindow::default(),
            sample_workers: 32,
            failure_policy: FailurePolicy::KeepLastGood,
            tick_rate: DEFAULT_TICK_RATE,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if a value is present but cannot be parsed or is out of range.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config {
            rootfs: lookup("HOSTWATCH_ROOTFS").map(PathBuf::from),
            ..Config::default()
        };

        if let Some(secs) = parse_var::<u64>(&lookup, "HOSTWATCH_INTERVAL_SECS")? {
            config.refresh_interval = Duration::from_secs(positive("HOSTWATCH_INTERVAL_SECS", secs)?);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "HOSTWATCH_TASK_TIMEOUT_SECS")? {
            config.task_timeout = Duration::from_secs(positive("HOSTWATCH_TASK_TIMEOUT_SECS", secs)?);
        }
        if let Some(count) = parse_var::<usize>(&lookup, "HOSTWATCH_SAMPLE_COUNT")? {
            if count < 2 {
                return Err(Error::InvalidValue {
                    key: "HOSTWATCH_SAMPLE_COUNT",
                    value: count.to_string(),
                    reason: "at least two samples are needed to compute a rate".to_owned(),
                });
            }
            config.sampling.samples = count;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "HOSTWATCH_SAMPLE_INTERVAL_MS")? {
            config.sampling.interval =
                Duration::from_millis(positive("HOSTWATCH_SAMPLE_INTERVAL_MS", ms)?);
        }
        if let Some(workers) = parse_var::<usize>(&lookup, "HOSTWATCH_SAMPLE_WORKERS")? {
            config.sample_workers = positive("HOSTWATCH_SAMPLE_WORKERS", workers)?;
        }
        if let Some(keep) = parse_var::<bool>(&lookup, "HOSTWATCH_KEEP_LAST_GOOD")? {
            config.failure_policy = if keep {
                FailurePolicy::KeepLastGood
            } else {
                FailurePolicy::Overwrite
            };
        }
        if let Some(tick_rate) = parse_var::<f64>(&lookup, "CLK_TCK")? {
            if !(tick_rate.is_finite() && tick_rate > 0.0) {
                return Err(Error::InvalidValue {
                    key: "CLK_TCK",
                    value: tick_rate.to_string(),
                    reason: "must be a positive number".to_owned(),
                });
            }
            config.tick_rate = tick_rate;
        }

        Ok(config)
    }

    /// The rootfs to use: the explicit one, or the detected one.
    pub fn resolved_rootfs(&self) -> PathBuf {
        match &self.rootfs {
            Some(root) => root.clone(),
            None => crate::environment::resolve_rootfs(DEFAULT_HOST_ROOT),
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|err| Error::InvalidValue {
            key,
            value: raw.clone(),
            reason: err.to_string(),
        })
}

fn positive<T>(key: &'static str, value: T) -> Result<T>
where
    T: PartialOrd + Default + ToString,
{
    if value > T::default() {
        Ok(value)
    } else {
        Err(Error::InvalidValue {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sampling.samples, 5);
        assert_eq!(config.sampling.interval, Duration::from_millis(10));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("HOSTWATCH_ROOTFS", "/host"),
            ("HOSTWATCH_INTERVAL_SECS", "30"),
            ("HOSTWATCH_SAMPLE_COUNT", "3"),
            ("HOSTWATCH_KEEP_LAST_GOOD", "false"),
            ("CLK_TCK", "250"),
        ]))
        .unwrap();
        assert_eq!(config.rootfs, Some(PathBuf::from("/host")));
        assert_eq!(config.resolved_rootfs(), PathBuf::from("/host"));
        assert_eq!(config.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.sampling.samples, 3);
        assert_eq!(config.failure_policy, FailurePolicy::Overwrite);
        assert_eq!(config.tick_rate, 250.0);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[("HOSTWATCH_INTERVAL_SECS", "soon")])).unwrap_err();
        match err {
            Error::InvalidValue { key, value, .. } => {
                assert_eq!(key, "HOSTWATCH_INTERVAL_SECS");
                assert_eq!(value, "soon");
            }
        }

        assert!(Config::from_lookup(lookup(&[("HOSTWATCH_SAMPLE_COUNT", "1")])).is_err());
        assert!(Config::from_lookup(lookup(&[("HOSTWATCH_SAMPLE_WORKERS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("CLK_TCK", "-1")])).is_err());
    }
}
