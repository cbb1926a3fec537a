//! Routing table (`proc/net/route`) and ARP cache (`proc/net/arp`).

use std::net::Ipv4Addr;

use serde::Serialize;

use super::addr;
use crate::context::Context;
use crate::procfs::{Delimiter, Result, TableSpec};

const ROUTES: TableSpec = TableSpec::new(11, 1, Delimiter::Char('\t'));
const ARP: TableSpec = TableSpec::new(6, 1, Delimiter::Whitespace);

/// Link-layer hardware type (`ARPHRD_*` of `include/uapi/linux/if_arp.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArpHardware {
    Netrom,
    Ether,
    Eether,
    Ax25,
    Pronet,
    Chaos,
    Ieee802,
    Arcnet,
    Appletalk,
    Dlci,
    Atm,
    Metricom,
    Ieee1394,
    Eui64,
    Infiniband,
    Loopback,
}

impl ArpHardware {
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => ArpHardware::Netrom,
            1 => ArpHardware::Ether,
            2 => ArpHardware::Eether,
            3 => ArpHardware::Ax25,
            4 => ArpHardware::Pronet,
            5 => ArpHardware::Chaos,
            6 => ArpHardware::Ieee802,
            7 => ArpHardware::Arcnet,
            8 => ArpHardware::Appletalk,
            15 => ArpHardware::Dlci,
            19 => ArpHardware::Atm,
            23 => ArpHardware::Metricom,
            24 => ArpHardware::Ieee1394,
            27 => ArpHardware::Eui64,
            32 => ArpHardware::Infiniband,
            772 => ArpHardware::Loopback,
            _ => return None,
        })
    }

    /// Parses decimal (`1`, sysfs) or `0x`-prefixed hex (`0x1`, ARP table) codes.
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        let value = match code.strip_prefix("0x") {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => code.parse().ok()?,
        };
        Self::from_code(value)
    }

    pub fn label(self) -> &'static str {
        match self {
            ArpHardware::Netrom => "NETROM",
            ArpHardware::Ether => "ETHER",
            ArpHardware::Eether => "EETHER",
            ArpHardware::Ax25 => "AX25",
            ArpHardware::Pronet => "PRONET",
            ArpHardware::Chaos => "CHAOS",
            ArpHardware::Ieee802 => "IEEE802",
            ArpHardware::Arcnet => "ARCNET",
            ArpHardware::Appletalk => "APPLETLK",
            ArpHardware::Dlci => "DLCI",
            ArpHardware::Atm => "ATM",
            ArpHardware::Metricom => "METRICOM",
            ArpHardware::Ieee1394 => "IEEE1394",
            ArpHardware::Eui64 => "EUI64",
            ArpHardware::Infiniband => "INFINIBAND",
            ArpHardware::Loopback => "LOCAL",
        }
    }
}

impl std::fmt::Display for ArpHardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One IPv4 route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteRecord {
    pub interface: String,
    pub destination: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub prefix_len: u32,
    pub metric: u32,
}

impl RouteRecord {
    fn from_row(row: &[String]) -> Option<Self> {
        let mask = addr::decode_ipv4(&row[7])?;
        Some(Self {
            interface: row[0].clone(),
            destination: addr::decode_ipv4(&row[1])?,
            gateway: addr::decode_ipv4(&row[2])?,
            prefix_len: u32::from(mask).count_ones(),
            mask,
            metric: row[6].parse().unwrap_or(0),
        })
    }

    pub fn is_default(&self) -> bool {
        self.destination.is_unspecified() && self.prefix_len == 0
    }
}

/// One ARP cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRecord {
    pub interface: String,
    pub address: String,
    pub hardware: Option<ArpHardware>,
    /// Link-layer address, e.g. `aa:bb:cc:dd:ee:ff`.
    pub hw_address: String,
    pub mask: String,
}

impl LinkRecord {
    fn from_row(row: Vec<String>) -> Option<Self> {
        let [address, hw_type, _flags, hw_address, mask, interface]: [String; 6] =
            row.try_into().ok()?;
        Some(Self {
            hardware: ArpHardware::parse(&hw_type),
            interface,
            address,
            hw_address,
            mask,
        })
    }
}

/// Reads the IPv4 routing table.
///
/// # Arguments
///
/// * `ctx` - Host context; the table is read from `proc/net/route` under its root.
///
/// # Returns
///
/// One [`RouteRecord`] per decodable row, in kernel order. Rows whose addresses or
/// metric do not parse are skipped.
///
/// # Errors
///
/// - [`Error::UnavailableSource`](crate::procfs::Error::UnavailableSource) if the table
///   cannot be opened.
/// - [`Error::Io`](crate::procfs::Error::Io) if reading fails part way through.
pub fn read_routes(ctx: &Context) -> Result<Vec<RouteRecord>> {
    let path = ctx.proc_path("net/route");
    let mut out = Vec::new();
    for row in ROUTES.open(&path)? {
        let row = row?;
        match RouteRecord::from_row(&row) {
            Some(route) => out.push(route),
            None => log::trace!("skipping undecodable route {row:?}"),
        }
    }
    Ok(out)
}

/// Reads the neighbour (ARP) table.
///
/// # Arguments
///
/// * `ctx` - Host context; the table is read from `proc/net/arp` under its root.
///
/// # Returns
///
/// One [`LinkRecord`] per six-field row, in kernel order.
///
/// # Errors
///
/// Same as [`read_routes`].
pub fn read_links(ctx: &Context) -> Result<Vec<LinkRecord>> {
    let mut out = Vec::new();
    for row in ARP.open(ctx.proc_path("net/arp"))? {
        out.extend(LinkRecord::from_row(row?));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn fake_host(file: &str, content: &str) -> (tempfile::TempDir, Context) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("proc/net")).unwrap();
        std::fs::write(dir.path().join("proc/net").join(file), content).unwrap();
        let ctx = Context::new(dir.path(), 100.0, SystemTime::UNIX_EPOCH);
        (dir, ctx)
    }

    #[test]
    fn test_hardware_codes() {
        assert_eq!(ArpHardware::parse("0x1"), Some(ArpHardware::Ether));
        assert_eq!(ArpHardware::parse("772\n"), Some(ArpHardware::Loopback));
        assert_eq!(ArpHardware::parse("0x20"), Some(ArpHardware::Infiniband));
        assert_eq!(ArpHardware::parse("9"), None);
        assert_eq!(ArpHardware::Loopback.label(), "LOCAL");
    }

    #[test]
    fn test_read_routes() {
        let (_dir, ctx) = fake_host(
            "route",
            "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT\n\
             eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0\n\
             eth0\t0001A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0\n",
        );
        let routes = read_routes(&ctx).unwrap();
        assert_eq!(routes.len(), 2);
        assert!(routes[0].is_default());
        assert_eq!(routes[0].gateway, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(routes[0].metric, 100);
        assert_eq!(routes[1].destination, Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(routes[1].mask, Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(routes[1].prefix_len, 24);
    }

    #[test]
    fn test_read_links() {
        let (_dir, ctx) = fake_host(
            "arp",
            "IP address       HW type     Flags       HW address            Mask     Device\n\
             192.168.1.1      0x1         0x2         aa:bb:cc:dd:ee:ff     *        eth0\n\
             10.0.0.9         0x9         0x2         00:00:00:00:00:00     *        tun0\n",
        );
        let links = read_links(&ctx).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].address, "192.168.1.1");
        assert_eq!(links[0].hardware, Some(ArpHardware::Ether));
        assert_eq!(links[0].hw_address, "aa:bb:cc:dd:ee:ff");
        assert_eq!(links[0].interface, "eth0");
        assert_eq!(links[1].hardware, None);
    }
}
