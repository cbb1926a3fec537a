//! Wire form of the records.
//!
//! Every record type serializes through serde; [`encoder`] maps a [`RecordKind`] to the
//! function that turns the serde form into the published JSON object, adding the derived
//! fields consumers expect (memory `used`, state labels, resolved host names).

use std::time::SystemTime;

use serde::Serialize;
use serde_json::{Value, json};

use crate::collector::Snapshot;
use crate::context::Context;
use crate::net::{ConnectionRecord, InterfaceRecord, LinkRecord, RouteRecord};
use crate::procfs::{CpuUsage, Filesystem, LoadAverage, MemorySample, ProcessRecord, Uptime};
use crate::session::{LastLoginRecord, SessionRecord};

/// A borrowed record of any category.
#[derive(Debug, Clone, Copy)]
pub enum Record<'a> {
    Memory(&'a MemorySample),
    Cpu(&'a CpuUsage),
    Process(&'a ProcessRecord),
    Connection(&'a ConnectionRecord),
    /// A session and the host it was read from, which names local sessions and
    /// resolves the session's command.
    Session(&'a SessionRecord, &'a Context),
    LastLogin(&'a LastLoginRecord),
    Route(&'a RouteRecord),
    Link(&'a LinkRecord),
    Interface(&'a InterfaceRecord),
    Filesystem(&'a Filesystem),
    Load(&'a LoadAverage),
    Uptime(&'a Uptime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Memory,
    Cpu,
    Process,
    Connection,
    Session,
    LastLogin,
    Route,
    Link,
    Interface,
    Filesystem,
    Load,
    Uptime,
}

impl Record<'_> {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Memory(_) => RecordKind::Memory,
            Record::Cpu(_) => RecordKind::Cpu,
            Record::Process(_) => RecordKind::Process,
            Record::Connection(_) => RecordKind::Connection,
            Record::Session(..) => RecordKind::Session,
            Record::LastLogin(_) => RecordKind::LastLogin,
            Record::Route(_) => RecordKind::Route,
            Record::Link(_) => RecordKind::Link,
            Record::Interface(_) => RecordKind::Interface,
            Record::Filesystem(_) => RecordKind::Filesystem,
            Record::Load(_) => RecordKind::Load,
            Record::Uptime(_) => RecordKind::Uptime,
        }
    }
}

pub type Encoder = fn(&Record<'_>) -> Value;

/// The encoder of a record kind.
///
/// An encoder handed a record of another kind returns `null`.
pub fn encoder(kind: RecordKind) -> Encoder {
    match kind {
        RecordKind::Memory => encode_memory,
        RecordKind::Cpu => encode_cpu,
        RecordKind::Process => encode_process,
        RecordKind::Connection => encode_connection,
        RecordKind::Session => encode_session,
        RecordKind::LastLogin => encode_last_login,
        RecordKind::Route => encode_route,
        RecordKind::Link => encode_link,
        RecordKind::Interface => encode_interface,
        RecordKind::Filesystem => encode_filesystem,
        RecordKind::Load => encode_plain,
        RecordKind::Uptime => encode_uptime,
    }
}

/// Encodes a record with the encoder of its own kind.
pub fn encode(record: &Record<'_>) -> Value {
    encoder(record.kind())(record)
}

/// Serializes `record` and overlays `extra` on the resulting object.
fn with_fields<T: Serialize>(record: &T, extra: impl IntoIterator<Item = (&'static str, Value)>) -> Value {
    match serde_json::to_value(record) {
        Ok(Value::Object(mut map)) => {
            for (key, value) in extra {
                map.insert(key.to_owned(), value);
            }
            Value::Object(map)
        }
        Ok(other) => other,
        Err(err) => {
            log::warn!(target: "encode", "cannot serialize record: {err}");
            Value::Null
        }
    }
}

fn epoch_secs(time: SystemTime) -> Value {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| json!(d.as_secs()))
        .unwrap_or(Value::Null)
}

fn encode_memory(record: &Record<'_>) -> Value {
    let Record::Memory(mem) = record else {
        return Value::Null;
    };
    with_fields(*mem, [("used", json!(mem.used()))])
}

fn encode_cpu(record: &Record<'_>) -> Value {
    let Record::Cpu(usage) = record else {
        return Value::Null;
    };
    with_fields(*usage, [("aggregate", json!(usage.label == "cpu"))])
}

fn encode_process(record: &Record<'_>) -> Value {
    let Record::Process(proc) = record else {
        return Value::Null;
    };
    with_fields(
        *proc,
        [
            ("command", json!(proc.cmdline.join(" "))),
            ("tty", json!(proc.tty.as_deref().unwrap_or("?"))),
        ],
    )
}

fn encode_connection(record: &Record<'_>) -> Value {
    let Record::Connection(conn) = record else {
        return Value::Null;
    };
    with_fields(
        *conn,
        [
            ("state", json!(conn.state.label())),
            ("local", json!(conn.local.to_string())),
            ("remote", json!(conn.remote.to_string())),
        ],
    )
}

fn encode_session(record: &Record<'_>) -> Value {
    let Record::Session(session, ctx) = record else {
        return Value::Null;
    };
    with_fields(
        *session,
        [
            ("record_type", json!(session.record_type.label())),
            ("hostname", json!(session.hostname(ctx))),
            ("command", json!(session.command(ctx))),
            ("login_time", epoch_secs(session.login_time())),
        ],
    )
}

fn encode_last_login(record: &Record<'_>) -> Value {
    let Record::LastLogin(last) = record else {
        return Value::Null;
    };
    with_fields(
        *last,
        [
            ("host", json!(last.host())),
            ("login_time", last.login_time().map_or(Value::Null, epoch_secs)),
        ],
    )
}

fn encode_route(record: &Record<'_>) -> Value {
    let Record::Route(route) = record else {
        return Value::Null;
    };
    with_fields(*route, [("default", json!(route.is_default()))])
}

fn encode_link(record: &Record<'_>) -> Value {
    let Record::Link(link) = record else {
        return Value::Null;
    };
    with_fields(
        *link,
        [("hardware", json!(link.hardware.map(|h| h.label())))],
    )
}

fn encode_interface(record: &Record<'_>) -> Value {
    let Record::Interface(nic) = record else {
        return Value::Null;
    };
    with_fields(
        *nic,
        [("hardware", json!(nic.hardware.map(|h| h.label())))],
    )
}

fn encode_filesystem(record: &Record<'_>) -> Value {
    let Record::Filesystem(fs) = record else {
        return Value::Null;
    };
    with_fields(
        *fs,
        [
            ("options", json!(fs.options.join(","))),
            ("read_only", json!(fs.is_read_only())),
        ],
    )
}

fn encode_uptime(record: &Record<'_>) -> Value {
    let Record::Uptime(uptime) = record else {
        return Value::Null;
    };
    with_fields(*uptime, [("boot_time", epoch_secs(uptime.boot_time()))])
}

fn encode_plain(record: &Record<'_>) -> Value {
    match record {
        Record::Load(load) => with_fields(*load, []),
        _ => Value::Null,
    }
}

/// Encodes every record of a list into a JSON array.
pub fn encode_all<'a, T: 'a>(items: impl IntoIterator<Item = &'a T>, wrap: fn(&'a T) -> Record<'a>) -> Value {
    Value::Array(items.into_iter().map(|item| encode(&wrap(item))).collect())
}

/// Encodes a whole snapshot, one key per category.
pub fn encode_snapshot(snapshot: &Snapshot, ctx: &Context) -> Value {
    let sessions: Vec<Value> = snapshot
        .sessions
        .logins
        .iter()
        .map(|s| encode(&Record::Session(s, ctx)))
        .collect();
    json!({
        "refreshed_at": snapshot.refreshed_at.map_or(Value::Null, epoch_secs),
        "boot_time": epoch_secs(snapshot.boot_time),
        "uptime": encode(&Record::Uptime(&snapshot.uptime)),
        "load": encode(&Record::Load(&snapshot.load)),
        "memory": encode(&Record::Memory(&snapshot.memory)),
        "swap": encode(&Record::Memory(&snapshot.swap)),
        "cpu": encode_all(&snapshot.cpu.usage, Record::Cpu),
        "processes": encode_all(&snapshot.processes, Record::Process),
        "connections": encode_all(&snapshot.connections, Record::Connection),
        "sessions": {
            "current": snapshot.sessions.current,
            "total": snapshot.sessions.total,
            "logins": sessions,
            "last_logins": encode_all(&snapshot.sessions.last_logins, Record::LastLogin),
        },
        "network": {
            "interfaces": encode_all(&snapshot.network.interfaces, Record::Interface),
            "routes": encode_all(&snapshot.network.routes, Record::Route),
            "links": encode_all(&snapshot.network.links, Record::Link),
        },
        "filesystems": encode_all(&snapshot.filesystems, Record::Filesystem),
        "status": snapshot.status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{ArpHardware, ConnectionState, InterfaceCounters, Protocol};
    use crate::procfs::Device;
    use crate::session::{FixedRecord, RecordType};

    #[test]
    fn test_memory_adds_used() {
        let mem = MemorySample {
            device: Device::Mem,
            total: 1000,
            free: 300,
            buffers: 100,
            cache: 200,
            shared: 0,
            available: 500,
        };
        let value = encode(&Record::Memory(&mem));
        assert_eq!(value["used"], 400);
        assert_eq!(value["device"], "mem");
        assert_eq!(value["total"], 1000);
    }

    #[test]
    fn test_connection_uses_labels() {
        let conn = ConnectionRecord {
            protocol: Protocol::Tcp,
            local: "127.0.0.1:8080".parse().unwrap(),
            remote: "0.0.0.0:0".parse().unwrap(),
            state: ConnectionState::from_code(0x0A),
            uid: 0,
            user: "root".into(),
            inode: 1234,
            pid: Some(42),
            command: "nginx".into(),
            send_queue: 0,
            recv_queue: 0,
        };
        let value = encode(&Record::Connection(&conn));
        assert_eq!(value["state"], "LISTEN");
        assert_eq!(value["protocol"], "tcp");
        assert_eq!(value["local"], "127.0.0.1:8080");
        assert_eq!(value["pid"], 42);
    }

    #[test]
    fn test_session_hostname_type_and_command() {
        let dir = tempfile::tempdir().unwrap();
        let proc_dir = dir.path().join("proc/4321");
        std::fs::create_dir_all(&proc_dir).unwrap();
        std::fs::write(proc_dir.join("cmdline"), "/usr/bin/bash\0-l\0").unwrap();
        let ctx = Context::new(dir.path(), 100.0, SystemTime::UNIX_EPOCH).with_hostname("box");

        let mut raw = vec![0u8; crate::session::utmp::UTMP_RECORD_SIZE];
        raw[0..4].copy_from_slice(&7u32.to_le_bytes());
        raw[4..8].copy_from_slice(&4321i32.to_le_bytes());
        raw[8..13].copy_from_slice(b"pts/0");
        raw[340..344].copy_from_slice(&1_000u32.to_le_bytes());
        let local = SessionRecord::decode(&raw);
        assert_eq!(local.record_type, RecordType::UserProcess);

        let value = encode(&Record::Session(&local, &ctx));
        assert_eq!(value["hostname"], "box");
        assert_eq!(value["command"], "bash");
        assert_eq!(value["record_type"], "user");
        assert_eq!(value["login_time"], 1000);

        let remote = SessionRecord {
            host: "10.0.0.1".into(),
            record_type: RecordType::Unknown(99),
            pid: 0,
            ..local
        };
        let value = encode(&Record::Session(&remote, &ctx));
        assert_eq!(value["hostname"], "10.0.0.1");
        assert_eq!(value["command"], "");
        assert_eq!(value["record_type"], "***");
    }

    #[test]
    fn test_hardware_labels_and_routes() {
        let nic = InterfaceRecord {
            name: "lo".into(),
            up: true,
            mtu: 65536,
            hardware: Some(ArpHardware::Loopback),
            mac: "00:00:00:00:00:00".into(),
            addresses: vec!["::1".parse().unwrap()],
            counters: InterfaceCounters::default(),
        };
        let value = encode(&Record::Interface(&nic));
        assert_eq!(value["hardware"], "LOCAL");
        assert_eq!(value["addresses"][0], "::1");

        let route = RouteRecord {
            interface: "eth0".into(),
            destination: "0.0.0.0".parse().unwrap(),
            gateway: "192.168.1.1".parse().unwrap(),
            mask: "0.0.0.0".parse().unwrap(),
            prefix_len: 0,
            metric: 100,
        };
        assert_eq!(encode(&Record::Route(&route))["default"], true);
    }

    #[test]
    fn test_mismatched_kind_is_null() {
        let load = LoadAverage {
            one: 1.0,
            five: 0.5,
            fifteen: 0.25,
        };
        assert_eq!(encoder(RecordKind::Memory)(&Record::Load(&load)), Value::Null);
        assert_eq!(encode(&Record::Load(&load))["fifteen"], 0.25);
    }

    #[test]
    fn test_encode_all_and_last_login() {
        let logins = vec![
            LastLoginRecord {
                uid: 1000,
                seconds: 60,
                line: "pts/1".into(),
                host: b"gateway".to_vec(),
            },
            LastLoginRecord {
                uid: 1001,
                seconds: 0,
                line: String::new(),
                host: Vec::new(),
            },
        ];
        let value = encode_all(&logins, Record::LastLogin);
        assert_eq!(value[0]["host"], "gateway");
        assert_eq!(value[0]["login_time"], 60);
        assert_eq!(value[1]["login_time"], Value::Null);
    }

    #[test]
    fn test_encode_empty_snapshot() {
        let snap = Snapshot::empty(SystemTime::UNIX_EPOCH);
        let ctx = Context::new("/nonexistent", 100.0, SystemTime::UNIX_EPOCH);
        let value = encode_snapshot(&snap, &ctx);
        assert_eq!(value["refreshed_at"], Value::Null);
        assert_eq!(value["boot_time"], 0);
        assert_eq!(value["memory"]["used"], 0);
        assert_eq!(value["swap"]["device"], "swap");
        assert_eq!(value["processes"], json!([]));
        assert_eq!(value["sessions"]["current"], 0);
    }
}
