//! The published, immutable view of the host.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::Serialize;

use crate::net::{ConnectionRecord, InterfaceRecord, LinkRecord, RouteRecord};
use crate::procfs::{
    CpuTicks, CpuUsage, Device, Filesystem, LoadAverage, MemorySample, ProcessRecord, SwapSample,
    Uptime,
};
use crate::session::Sessions;

/// A group of records fetched by one task of a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Processes,
    Memory,
    Sessions,
    Load,
    Uptime,
    Connections,
    Cpu,
    Network,
    Filesystems,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Processes,
        Category::Memory,
        Category::Sessions,
        Category::Load,
        Category::Uptime,
        Category::Connections,
        Category::Cpu,
        Category::Network,
        Category::Filesystems,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Processes => "processes",
            Category::Memory => "memory",
            Category::Sessions => "sessions",
            Category::Load => "load",
            Category::Uptime => "uptime",
            Category::Connections => "connections",
            Category::Cpu => "cpu",
            Category::Network => "network",
            Category::Filesystems => "filesystems",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the latest fetch of a category.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CategoryStatus {
    /// Error of the latest fetch, `None` if it succeeded.
    pub error: Option<String>,
    /// When the category last held fresh data.
    pub updated_at: Option<SystemTime>,
}

impl CategoryStatus {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate and per-core CPU state.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CpuState {
    /// Raw counters of the latest sweep, kept to derive the next cycle's usage.
    #[serde(skip)]
    pub ticks: Vec<CpuTicks>,
    /// Usage since the previous cycle; empty after the first one.
    pub usage: Vec<CpuUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NetworkState {
    pub interfaces: Vec<InterfaceRecord>,
    pub routes: Vec<RouteRecord>,
    pub links: Vec<LinkRecord>,
}

/// Every category's latest value. Never mutated once published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// End of the cycle that produced this snapshot; `None` before the first cycle.
    pub refreshed_at: Option<SystemTime>,
    pub boot_time: SystemTime,
    pub uptime: Uptime,
    pub processes: Vec<ProcessRecord>,
    pub memory: MemorySample,
    pub swap: SwapSample,
    pub sessions: Sessions,
    pub load: LoadAverage,
    pub connections: Vec<ConnectionRecord>,
    pub cpu: CpuState,
    pub network: NetworkState,
    pub filesystems: Vec<Filesystem>,
    pub status: BTreeMap<Category, CategoryStatus>,
}

impl Snapshot {
    /// The snapshot published before the first cycle completes.
    pub fn empty(boot_time: SystemTime) -> Self {
        Self {
            refreshed_at: None,
            boot_time,
            uptime: Uptime::default(),
            processes: Vec::new(),
            memory: MemorySample::empty(Device::Mem),
            swap: MemorySample::empty(Device::Swap),
            sessions: Sessions::default(),
            load: LoadAverage::default(),
            connections: Vec::new(),
            cpu: CpuState::default(),
            network: NetworkState::default(),
            filesystems: Vec::new(),
            status: BTreeMap::new(),
        }
    }

    pub fn status(&self, category: Category) -> Option<&CategoryStatus> {
        self.status.get(&category)
    }

    /// Categories whose latest fetch failed.
    pub fn failed(&self) -> Vec<Category> {
        self.status
            .iter()
            .filter(|(_, s)| !s.is_ok())
            .map(|(c, _)| *c)
            .collect()
    }

    /// Usage of the aggregate `cpu` row, if known.
    pub fn cpu_total(&self) -> Option<&CpuUsage> {
        self.cpu.usage.iter().find(|u| u.label == "cpu")
    }
}
