//! Connection tables `proc/net/{tcp,tcp6,udp,udp6}` and socket ownership.
//!
//! Row layout (whitespace separated, one header line):
//!
//! ```text
//! sl  local_address rem_address   st tx_queue:rx_queue tr:tm->when retrnsmt uid timeout inode ...
//! 0:  0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000 0      12345 ...
//! ```
//!
//! The owner of a socket is found by matching its inode against the `socket:[<inode>]`
//! targets of every process's `fd/` links.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde::Serialize;

use super::addr;
use crate::context::Context;
use crate::fsutil;
use crate::procfs::process::command_name;
use crate::procfs::{Delimiter, Result, TableSpec};
use crate::users::UserResolver;

// Sockets in TIME_WAIT or SYN_RECV print only up to the inode and two more columns.
const CONNECTIONS: TableSpec = TableSpec::at_least(10, 1, Delimiter::Whitespace);

const LOCAL: usize = 1;
const REMOTE: usize = 2;
const STATE: usize = 3;
const QUEUES: usize = 4;
const UID: usize = 7;
const INODE: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Tcp6,
    Udp,
    Udp6,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [Protocol::Tcp, Protocol::Tcp6, Protocol::Udp, Protocol::Udp6];

    /// File name under `proc/net/`.
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Tcp6 => "tcp6",
            Protocol::Udp => "udp",
            Protocol::Udp6 => "udp6",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown protocol `{s}`"))
    }
}

/// TCP connection state, as numbered by the kernel (`include/net/tcp_states.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    /// Any code outside `0x01..=0x0B`.
    Unknown,
}

impl ConnectionState {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => ConnectionState::Established,
            0x02 => ConnectionState::SynSent,
            0x03 => ConnectionState::SynRecv,
            0x04 => ConnectionState::FinWait1,
            0x05 => ConnectionState::FinWait2,
            0x06 => ConnectionState::TimeWait,
            0x07 => ConnectionState::Close,
            0x08 => ConnectionState::CloseWait,
            0x09 => ConnectionState::LastAck,
            0x0A => ConnectionState::Listen,
            0x0B => ConnectionState::Closing,
            _ => ConnectionState::Unknown,
        }
    }

    /// Decodes the hex `st` column.
    pub fn from_hex(hex: &str) -> Self {
        u8::from_str_radix(hex, 16).map_or(ConnectionState::Unknown, Self::from_code)
    }

    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Established => "ESTABLISHED",
            ConnectionState::SynSent => "SYN_SENT",
            ConnectionState::SynRecv => "SYN_RECV",
            ConnectionState::FinWait1 => "FIN_WAIT1",
            ConnectionState::FinWait2 => "FIN_WAIT2",
            ConnectionState::TimeWait => "TIME_WAIT",
            ConnectionState::Close => "CLOSE",
            ConnectionState::CloseWait => "CLOSE_WAIT",
            ConnectionState::LastAck => "LAST_ACK",
            ConnectionState::Listen => "LISTEN",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Unknown => "-",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One socket of a connection table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRecord {
    pub protocol: Protocol,
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub state: ConnectionState,
    pub uid: u32,
    /// Owner name, empty when the uid is unknown.
    pub user: String,
    pub inode: u64,
    pub pid: Option<u32>,
    /// Owning command, `-` when no process could be found.
    pub command: String,
    pub send_queue: u64,
    pub recv_queue: u64,
}

/// Decodes one row. Returns `None` for rows with undecodable fields.
fn decode_row(protocol: Protocol, row: &[String]) -> Option<ConnectionRecord> {
    let (tx, rx) = row[QUEUES].split_once(':')?;
    Some(ConnectionRecord {
        protocol,
        local: addr::decode_endpoint(&row[LOCAL])?,
        remote: addr::decode_endpoint(&row[REMOTE])?,
        state: ConnectionState::from_hex(&row[STATE]),
        uid: row[UID].parse().ok()?,
        user: String::new(),
        inode: row[INODE].parse().ok()?,
        pid: None,
        command: String::new(),
        send_queue: u64::from_str_radix(tx, 16).ok()?,
        recv_queue: u64::from_str_radix(rx, 16).ok()?,
    })
}

/// Extracts the inode of a `socket:[12345]` link target.
pub fn parse_socket_inode(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Maps every socket inode to the pid holding a descriptor on it.
///
/// Processes whose `fd/` cannot be listed (exited, or not readable without privileges)
/// are skipped. When several processes share a socket the lowest pid wins.
pub fn socket_owners(ctx: &Context) -> HashMap<u64, u32> {
    let mut owners = HashMap::new();
    let Ok(pids) = fsutil::numeric_entries(ctx.proc_path("")) else {
        return owners;
    };
    for pid in pids {
        let Ok(entries) = std::fs::read_dir(ctx.pid_path(pid, "fd")) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(target) = std::fs::read_link(entry.path()) else {
                continue;
            };
            if let Some(inode) = target.to_str().and_then(parse_socket_inode) {
                owners.entry(inode).or_insert(pid);
            }
        }
    }
    owners
}

/// Reads one protocol table. Owners and user names are not resolved.
///
/// # Errors
///
/// Returns [`crate::procfs::Error::UnavailableSource`] if the table does not exist (e.g.
/// IPv6 disabled) and [`crate::procfs::Error::Io`] on a read failure.
pub fn read_table(ctx: &Context, protocol: Protocol) -> Result<Vec<ConnectionRecord>> {
    let path = ctx.proc_path("net").join(protocol.as_str());
    let mut out = Vec::new();
    for row in CONNECTIONS.open(&path)? {
        let row = row?;
        match decode_row(protocol, &row) {
            Some(record) => out.push(record),
            None => log::trace!("skipping undecodable row in `{}`: {row:?}", path.display()),
        }
    }
    Ok(out)
}

/// Reads the connections of the given protocols and attributes each to its owner.
///
/// A missing protocol table contributes nothing.
pub fn read_connections(
    ctx: &Context,
    users: &UserResolver,
    protocols: &[Protocol],
) -> Result<Vec<ConnectionRecord>> {
    let mut records = Vec::new();
    for &protocol in protocols {
        match read_table(ctx, protocol) {
            Ok(rows) => records.extend(rows),
            Err(err) if err.is_unavailable() => {
                log::debug!(target: "connections", "{err}");
            }
            Err(err) => return Err(err),
        }
    }
    if records.is_empty() {
        return Ok(records);
    }

    let owners = socket_owners(ctx);
    let mut commands: HashMap<u32, Option<String>> = HashMap::new();
    for record in &mut records {
        record.user = users.user(record.uid).unwrap_or_default();
        record.pid = owners.get(&record.inode).copied();
        record.command = record
            .pid
            .and_then(|pid| {
                commands
                    .entry(pid)
                    .or_insert_with(|| command_name(ctx, pid))
                    .clone()
            })
            .unwrap_or_else(|| "-".to_owned());
    }
    Ok(records)
}
