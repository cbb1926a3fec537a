//! Memory and swap usage from `/proc/meminfo`.
//!
//! The file is one `Key:   value kB` pair per line. A single pass routes the recognised
//! keys into a memory and a swap record; the page cache accumulates both `Cached` and
//! `SReclaimable` (reclaimable slab), the same way `free(1)` reports `buff/cache`.
//!
//! # Example
//!
//! ```rust
//! use hostwatch::procfs::{KeyValueStat, MemInfo, Unit};
//!
//! let data = "\
//! MemTotal:       16000 kB
//! MemFree:         4000 kB
//! Buffers:         1000 kB
//! Cached:          2000 kB
//! SReclaimable:    1000 kB
//! SwapTotal:       8000 kB
//! SwapFree:        8000 kB
//! ";
//! let (mem, swap) = MemInfo::from_reader(&mut data.as_bytes()).unwrap().into_samples();
//! assert_eq!(mem.used(), 8000 * 1024);
//! assert_eq!(mem.scale(Unit::Kilo).used, 8000.0);
//! assert_eq!(swap.used(), 0);
//! ```

use std::collections::HashMap;
use std::num::ParseIntError;
use std::path::Path;
use std::sync::LazyLock;

use serde::Serialize;

use super::parser::{FieldHandler, KeyValueStat, first_token};
use super::{Error, Result};
use crate::fsutil;

/// Raw `meminfo` counters in kibibytes, as printed by the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
    pub mem_available: u64,
    pub buffers: u64,
    /// `Cached` + `SReclaimable`.
    pub cache: u64,
    pub shmem: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

fn kib(v: &str) -> std::result::Result<u64, ParseIntError> {
    first_token(v).parse()
}

impl MemInfo {
    fn set_mem_total(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.mem_total = kib(v)?;
        Ok(())
    }

    fn set_mem_free(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.mem_free = kib(v)?;
        Ok(())
    }

    fn set_mem_available(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.mem_available = kib(v)?;
        Ok(())
    }

    fn set_buffers(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.buffers = kib(v)?;
        Ok(())
    }

    fn add_cache(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.cache += kib(v)?;
        Ok(())
    }

    fn set_shmem(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.shmem = kib(v)?;
        Ok(())
    }

    fn set_swap_total(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.swap_total = kib(v)?;
        Ok(())
    }

    fn set_swap_free(&mut self, v: &str) -> std::result::Result<(), ParseIntError> {
        self.swap_free = kib(v)?;
        Ok(())
    }

    /// Splits the counters into a memory and a swap sample, converted to bytes.
    pub fn into_samples(self) -> (MemorySample, MemorySample) {
        let mem = MemorySample {
            device: Device::Mem,
            total: self.mem_total * 1024,
            free: self.mem_free * 1024,
            buffers: self.buffers * 1024,
            cache: self.cache * 1024,
            shared: self.shmem * 1024,
            available: self.mem_available * 1024,
        };
        let swap = MemorySample {
            device: Device::Swap,
            total: self.swap_total * 1024,
            free: self.swap_free * 1024,
            ..MemorySample::empty(Device::Swap)
        };
        (mem, swap)
    }
}

type Setter = FieldHandler<MemInfo>;

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(9);

    m.insert("MemTotal", MemInfo::set_mem_total);
    m.insert("MemFree", MemInfo::set_mem_free);
    m.insert("MemAvailable", MemInfo::set_mem_available);
    m.insert("Buffers", MemInfo::set_buffers);
    m.insert("Cached", MemInfo::add_cache);
    m.insert("SReclaimable", MemInfo::add_cache);
    m.insert("Shmem", MemInfo::set_shmem);
    m.insert("SwapTotal", MemInfo::set_swap_total);
    m.insert("SwapFree", MemInfo::set_swap_free);

    m
});

impl KeyValueStat for MemInfo {
    const SEPARATOR: char = ':';
    const SKIP_LINES: usize = 0;
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, FieldHandler<Self>> {
        &SETTERS
    }
}

/// Which memory pool a sample describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Mem,
    Swap,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Device::Mem => "mem",
            Device::Swap => "swap",
        })
    }
}

/// Memory or swap usage in bytes.
///
/// For swap only `total` and `free` are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemorySample {
    pub device: Device,
    pub total: u64,
    pub free: u64,
    pub buffers: u64,
    /// Page cache plus reclaimable slab.
    pub cache: u64,
    pub shared: u64,
    pub available: u64,
}

/// Swap usage shares the memory record layout.
pub type SwapSample = MemorySample;

impl MemorySample {
    pub const fn empty(device: Device) -> Self {
        Self {
            device,
            total: 0,
            free: 0,
            buffers: 0,
            cache: 0,
            shared: 0,
            available: 0,
        }
    }

    /// `total - free - buffers - cache`, never negative.
    pub fn used(&self) -> u64 {
        self.total
            .saturating_sub(self.free)
            .saturating_sub(self.buffers)
            .saturating_sub(self.cache)
    }

    /// Expresses the sample in the given unit.
    pub fn scale(&self, unit: Unit) -> ScaledMemory {
        let z = unit.bytes();
        ScaledMemory {
            device: self.device,
            total: self.total as f64 / z,
            free: self.free as f64 / z,
            used: self.used() as f64 / z,
            buffers: self.buffers as f64 / z,
            cache: self.cache as f64 / z,
            shared: self.shared as f64 / z,
            available: self.available as f64 / z,
        }
    }
}

impl std::ops::AddAssign for MemorySample {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.free += rhs.free;
        self.buffers += rhs.buffers;
        self.cache += rhs.cache;
        self.shared += rhs.shared;
        self.available += rhs.available;
    }
}

/// Display unit for memory figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    #[default]
    Kilo,
    Mega,
    Giga,
}

impl Unit {
    pub fn bytes(self) -> f64 {
        match self {
            Unit::Kilo => 1024.0,
            Unit::Mega => 1024.0 * 1024.0,
            Unit::Giga => 1024.0 * 1024.0 * 1024.0,
        }
    }
}

impl std::str::FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "k" | "K" => Ok(Unit::Kilo),
            "m" | "M" => Ok(Unit::Mega),
            "g" | "G" => Ok(Unit::Giga),
            other => Err(format!("unknown unit `{other}`")),
        }
    }
}

/// A [`MemorySample`] expressed in a display unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaledMemory {
    pub device: Device,
    pub total: f64,
    pub free: f64,
    pub used: f64,
    pub buffers: f64,
    pub cache: f64,
    pub shared: f64,
    pub available: f64,
}

/// Reads memory and swap usage from a `meminfo` file.
///
/// # Errors
///
/// Returns [`Error::UnavailableSource`] if the file is missing and [`Error::Malformed`]
/// if a recognised key has an unparsable value.
pub fn read_memory(path: impl AsRef<Path>) -> Result<(MemorySample, SwapSample)> {
    let path = path.as_ref();
    let mut reader = fsutil::open_file_reader(path)?;
    let info = MemInfo::from_reader(&mut reader).map_err(|e| Error::from_io(path, e))?;
    Ok(info.into_samples())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &[u8] = b"\
MemTotal:       32768000 kB
MemFree:         8192000 kB
MemAvailable:   20000000 kB
Buffers:          512000 kB
Cached:          6000000 kB
SwapCached:            0 kB
Active:          9000000 kB
Shmem:            300000 kB
Slab:            1200000 kB
SReclaimable:     800000 kB
SUnreclaim:       400000 kB
SwapTotal:       2097148 kB
SwapFree:        1048574 kB
HugePages_Total:       0
";

    #[test]
    fn test_parse_complete_meminfo() {
        let info = MemInfo::from_reader(&mut &MEMINFO[..]).unwrap();
        assert_eq!(info.mem_total, 32_768_000);
        assert_eq!(info.mem_free, 8_192_000);
        assert_eq!(info.mem_available, 20_000_000);
        assert_eq!(info.buffers, 512_000);
        assert_eq!(info.cache, 6_800_000);
        assert_eq!(info.shmem, 300_000);
        assert_eq!(info.swap_total, 2_097_148);
        assert_eq!(info.swap_free, 1_048_574);
    }

    #[test]
    fn test_samples_and_used() {
        let (mem, swap) = MemInfo::from_reader(&mut &MEMINFO[..])
            .unwrap()
            .into_samples();
        assert_eq!(mem.device, Device::Mem);
        assert_eq!(mem.used(), (32_768_000 - 8_192_000 - 512_000 - 6_800_000) * 1024);
        assert_eq!(mem.used(), mem.total - mem.free - mem.buffers - mem.cache);
        assert_eq!(swap.device, Device::Swap);
        assert_eq!(swap.used(), (2_097_148 - 1_048_574) * 1024);
        assert_eq!(swap.cache, 0);
    }

    #[test]
    fn test_used_never_negative() {
        let sample = MemorySample {
            total: 100,
            free: 80,
            buffers: 30,
            cache: 10,
            ..MemorySample::empty(Device::Mem)
        };
        assert_eq!(sample.used(), 0);
    }

    #[test]
    fn test_empty_input_is_all_zero() {
        let (mem, swap) = MemInfo::from_reader(&mut &b""[..]).unwrap().into_samples();
        assert_eq!(mem, MemorySample::empty(Device::Mem));
        assert_eq!(swap, MemorySample::empty(Device::Swap));
    }

    #[test]
    fn test_scale_and_cumulate() {
        let mut a = MemorySample {
            total: 4 * 1024 * 1024 * 1024,
            free: 1024 * 1024 * 1024,
            ..MemorySample::empty(Device::Mem)
        };
        let b = a;
        a += b;
        assert_eq!(a.total, 8 * 1024 * 1024 * 1024);

        let giga = a.scale(Unit::Giga);
        assert_eq!(giga.total, 8.0);
        assert_eq!(giga.free, 2.0);
        assert_eq!(giga.used, 6.0);
        assert_eq!(a.scale(Unit::Mega).total, 8192.0);
        assert_eq!("m".parse::<Unit>(), Ok(Unit::Mega));
        assert!("t".parse::<Unit>().is_err());
    }

    #[test]
    fn test_invalid_value_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meminfo");
        std::fs::write(&path, "MemTotal: lots kB\n").unwrap();
        let err = read_memory(&path).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));

        let err = read_memory(dir.path().join("absent")).unwrap_err();
        assert!(err.is_unavailable());
    }
}
