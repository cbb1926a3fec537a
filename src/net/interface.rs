//! Network interfaces: sysfs attributes, IPv6 addresses and traffic counters.

use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::path::Path;

use serde::Serialize;

use super::addr;
use super::route::ArpHardware;
use crate::context::Context;
use crate::error::ResultOkLogExt;
use crate::fsutil;
use crate::procfs::{Delimiter, Result, TableSpec};

const IF_INET6: TableSpec = TableSpec::new(6, 0, Delimiter::Whitespace);
const NET_DEV: TableSpec = TableSpec::new(17, 2, Delimiter::Whitespace);

/// Traffic counters of one interface, as reported in `/proc/net/dev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errs: u64,
    pub rx_drop: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errs: u64,
    pub tx_drop: u64,
}

impl std::ops::AddAssign for InterfaceCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.rx_bytes += rhs.rx_bytes;
        self.rx_packets += rhs.rx_packets;
        self.rx_errs += rhs.rx_errs;
        self.rx_drop += rhs.rx_drop;
        self.tx_bytes += rhs.tx_bytes;
        self.tx_packets += rhs.tx_packets;
        self.tx_errs += rhs.tx_errs;
        self.tx_drop += rhs.tx_drop;
    }
}

impl InterfaceCounters {
    /// Builds counters from the 16 values following the interface name.
    fn from_fields(fields: &[String]) -> Self {
        let at = |i: usize| fields.get(i).and_then(|v| v.parse().ok()).unwrap_or(0);
        Self {
            rx_bytes: at(0),
            rx_packets: at(1),
            rx_errs: at(2),
            rx_drop: at(3),
            tx_bytes: at(8),
            tx_packets: at(9),
            tx_errs: at(10),
            tx_drop: at(11),
        }
    }
}

/// Per-interface counters keyed by interface name.
pub fn read_counters(ctx: &Context) -> Result<HashMap<String, InterfaceCounters>> {
    let mut out = HashMap::new();
    for row in NET_DEV.open(ctx.proc_path("net/dev"))? {
        let row = row?;
        let name = row[0].trim_end_matches(':');
        out.insert(name.to_owned(), InterfaceCounters::from_fields(&row[1..]));
    }
    Ok(out)
}

/// IPv6 addresses keyed by interface name, from `net/if_inet6`.
pub fn read_addresses(ctx: &Context) -> Result<HashMap<String, Vec<Ipv6Addr>>> {
    let mut out: HashMap<String, Vec<Ipv6Addr>> = HashMap::new();
    for row in IF_INET6.open(ctx.proc_path("net/if_inet6"))? {
        let row = row?;
        if let Some(ip) = addr::decode_ipv6_network_order(&row[0]) {
            out.entry(row[5].clone()).or_default().push(ip);
        }
    }
    Ok(out)
}

/// One network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceRecord {
    pub name: String,
    /// Carrier detected (`carrier` is `1`).
    pub up: bool,
    pub mtu: u32,
    pub hardware: Option<ArpHardware>,
    pub mac: String,
    pub addresses: Vec<Ipv6Addr>,
    pub counters: InterfaceCounters,
}

fn read_sysfs_interface(dir: &Path, name: String) -> InterfaceRecord {
    InterfaceRecord {
        up: fsutil::read_attribute(dir.join("carrier")).is_some_and(|c| c == "1"),
        mtu: fsutil::read_parsed_attribute(dir.join("mtu")).unwrap_or(0),
        hardware: fsutil::read_attribute(dir.join("type")).and_then(|t| ArpHardware::parse(&t)),
        mac: fsutil::read_attribute(dir.join("address")).unwrap_or_default(),
        addresses: Vec::new(),
        counters: InterfaceCounters::default(),
        name,
    }
}

/// Lists the interfaces of `sys/class/net`, enriched with their IPv6 addresses and
/// traffic counters when those tables are available.
pub fn read_interfaces(ctx: &Context) -> Result<Vec<InterfaceRecord>> {
    let class = ctx.sys_path("class/net");
    let entries = std::fs::read_dir(&class).map_err(|e| crate::procfs::Error::from_io(&class, e))?;

    let mut addresses = read_addresses(ctx).ok_log_debug().unwrap_or_default();
    let counters = read_counters(ctx).ok_log_debug().unwrap_or_default();

    let mut out: Vec<InterfaceRecord> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok().map(|n| (entry.path(), n)))
        .map(|(dir, name)| {
            let mut nic = read_sysfs_interface(&dir, name);
            nic.addresses = addresses.remove(&nic.name).unwrap_or_default();
            nic.counters = counters.get(&nic.name).copied().unwrap_or_default();
            nic
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}
