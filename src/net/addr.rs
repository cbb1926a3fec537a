//! Hex address decoding for the `proc/net` tables.
//!
//! The kernel prints addresses as the hex dump of 32-bit words in host (little-endian)
//! order, so each 4-byte group is reversed to get network order. Ports are printed
//! already converted to host order.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

fn decode_words(hex: &str) -> Option<Vec<u8>> {
    let mut bytes = hex::decode(hex).ok()?;
    if bytes.len() % 4 != 0 {
        return None;
    }
    for word in bytes.chunks_exact_mut(4) {
        word.reverse();
    }
    Some(bytes)
}

/// Decodes an 8-digit (IPv4) or 32-digit (IPv6) word-reversed hex address.
pub fn decode_host(hex: &str) -> Option<IpAddr> {
    let bytes = decode_words(hex)?;
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// Decodes a word-reversed IPv4 address, as found in `net/route`.
pub fn decode_ipv4(hex: &str) -> Option<Ipv4Addr> {
    match decode_host(hex)? {
        IpAddr::V4(addr) => Some(addr),
        IpAddr::V6(_) => None,
    }
}

/// Decodes a 16-bit hex port, e.g. `1F90` is `8080`.
pub fn decode_port(hex: &str) -> Option<u16> {
    u16::from_str_radix(hex, 16).ok()
}

/// Decodes an `address:port` endpoint of a socket table.
pub fn decode_endpoint(hex: &str) -> Option<SocketAddr> {
    let (host, port) = hex.split_once(':')?;
    Some(SocketAddr::new(decode_host(host)?, decode_port(port)?))
}

/// Decodes a 32-digit IPv6 address printed in network order, as in `net/if_inet6`.
pub fn decode_ipv6_network_order(hex: &str) -> Option<Ipv6Addr> {
    let octets: [u8; 16] = hex::decode(hex).ok()?.try_into().ok()?;
    Some(Ipv6Addr::from(octets))
}
