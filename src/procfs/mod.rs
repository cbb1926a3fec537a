//! Readers for the kernel's process pseudo-filesystem.
//!
//! # Main types
//!
//! - [`Table`]: lazy fixed-arity row extraction used by every tabular reader.
//! - [`MemInfo`]: `meminfo` decoded into memory and swap samples.
//! - [`CpuTicks`] / [`CpuUsage`]: tick sampling of `stat` and usage derivation.
//! - [`LoadAverage`] / [`Uptime`]: single-line readers.
//! - [`Filesystem`]: mounted filesystems.
//! - [`ProcessRecord`]: per-process identity, command line and CPU share.
//!
//! All readers resolve paths through a [`crate::context::Context`], so they work against
//! the host root from inside a container and against fake trees in tests.

pub mod cpu;
mod error;
mod load;
mod memory;
mod mounts;
mod parser;
pub mod process;
mod table;

pub use cpu::{CpuTicks, CpuUsage};
pub use error::{Error, Result, StatParseError};
pub use load::{LoadAverage, Uptime, read_loadavg, read_uptime};
pub use memory::{Device, MemInfo, MemorySample, ScaledMemory, SwapSample, Unit, read_memory};
pub use mounts::{Filesystem, read_mounts};
pub use parser::{FieldHandler, KeyValueStat, SingleLineStat, first_token};
pub use process::{ProcessRecord, SamplingWindow};
pub use table::{Arity, Delimiter, Table, TableSpec};
