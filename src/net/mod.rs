//! Network state from `proc/net` and `sys/class/net`.
//!
//! - [`socket`]: connection tables with socket-to-process attribution.
//! - [`route`]: IPv4 routes and the ARP cache.
//! - [`interface`]: interface attributes, IPv6 addresses and traffic counters.
//!
//! Addresses in these tables are hex dumps; [`addr`] holds the decoders.

pub mod addr;
pub mod interface;
pub mod route;
pub mod socket;

pub use interface::{InterfaceCounters, InterfaceRecord, read_interfaces};
pub use route::{ArpHardware, LinkRecord, RouteRecord, read_links, read_routes};
pub use socket::{ConnectionRecord, ConnectionState, Protocol, read_connections};
