//! Login session records of `utmp` and `wtmp` (`struct utmp`, 384 bytes).
//!
//! | offset | size | field                         |
//! |--------|------|-------------------------------|
//! | 0      | 4    | record type                   |
//! | 4      | 4    | pid                           |
//! | 8      | 32   | terminal line                 |
//! | 40     | 4    | terminal id                   |
//! | 44     | 32   | user                          |
//! | 76     | 256  | remote host                   |
//! | 332    | 2    | terminal status               |
//! | 334    | 2    | exit status                   |
//! | 336    | 4    | session id                    |
//! | 340    | 4    | login seconds                 |
//! | 344    | 4    | login microseconds            |
//! | 348    | 16   | remote address                |
//! | 364    | 20   | unused                        |

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::record::{FixedRecord, Records, le_i16, le_i32, le_u32, text};
use crate::context::Context;
use crate::fsutil;
use crate::procfs::process::command_name;
use crate::procfs::{Error, Result};

pub const UTMP_RECORD_SIZE: usize = 384;

const LABELS: [&str; 9] = [
    "empty", "run", "boot", "new", "old", "init", "login", "user", "dead",
];

/// `ut_type` of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordType {
    Empty,
    RunLevel,
    BootTime,
    NewTime,
    OldTime,
    InitProcess,
    LoginProcess,
    UserProcess,
    DeadProcess,
    Unknown(u32),
}

impl RecordType {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => RecordType::Empty,
            1 => RecordType::RunLevel,
            2 => RecordType::BootTime,
            3 => RecordType::NewTime,
            4 => RecordType::OldTime,
            5 => RecordType::InitProcess,
            6 => RecordType::LoginProcess,
            7 => RecordType::UserProcess,
            8 => RecordType::DeadProcess,
            other => RecordType::Unknown(other),
        }
    }

    /// Short label; `***` for codes outside the known range.
    pub fn label(self) -> &'static str {
        match self {
            RecordType::Unknown(_) => "***",
            known => LABELS[known.code() as usize],
        }
    }

    pub fn code(self) -> u32 {
        match self {
            RecordType::Empty => 0,
            RecordType::RunLevel => 1,
            RecordType::BootTime => 2,
            RecordType::NewTime => 3,
            RecordType::OldTime => 4,
            RecordType::InitProcess => 5,
            RecordType::LoginProcess => 6,
            RecordType::UserProcess => 7,
            RecordType::DeadProcess => 8,
            RecordType::Unknown(code) => code,
        }
    }
}

/// One login/logout event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub record_type: RecordType,
    pub pid: i32,
    /// Terminal device, e.g. `pts/0`.
    pub line: String,
    pub id: String,
    pub user: String,
    /// Remote host; empty for local sessions.
    pub host: String,
    pub term_status: i16,
    pub exit_status: i16,
    pub session: i32,
    pub seconds: u32,
    pub microseconds: u32,
    pub address: Option<IpAddr>,
}

/// `ut_addr_v6`: an IPv4 address occupies the first word and leaves the rest zero.
fn decode_address(raw: &[u8]) -> Option<IpAddr> {
    if raw.iter().all(|b| *b == 0) {
        return None;
    }
    if raw[4..].iter().all(|b| *b == 0) {
        return Some(IpAddr::V4(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3])));
    }
    let octets: [u8; 16] = raw.try_into().ok()?;
    Some(IpAddr::V6(Ipv6Addr::from(octets)))
}

impl FixedRecord for SessionRecord {
    const SIZE: usize = UTMP_RECORD_SIZE;

    fn decode(buf: &[u8]) -> Self {
        Self {
            record_type: RecordType::from_code(le_u32(buf, 0)),
            pid: le_i32(buf, 4),
            line: text(&buf[8..40]),
            id: text(&buf[40..44]),
            user: text(&buf[44..76]),
            host: text(&buf[76..332]),
            term_status: le_i16(buf, 332),
            exit_status: le_i16(buf, 334),
            session: le_i32(buf, 336),
            seconds: le_u32(buf, 340),
            microseconds: le_u32(buf, 344),
            address: decode_address(&buf[348..364]),
        }
    }
}

impl SessionRecord {
    pub fn is_remote(&self) -> bool {
        !self.host.is_empty()
    }

    /// The remote host, or the local host name for local sessions.
    pub fn hostname<'a>(&'a self, ctx: &'a Context) -> &'a str {
        if self.is_remote() {
            &self.host
        } else {
            ctx.hostname()
        }
    }

    /// Name of the session's process. Empty once the process has exited.
    pub fn command(&self, ctx: &Context) -> String {
        u32::try_from(self.pid)
            .ok()
            .filter(|pid| *pid > 0)
            .and_then(|pid| command_name(ctx, pid))
            .unwrap_or_default()
    }

    pub fn login_time(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH
            + Duration::from_secs(u64::from(self.seconds))
            + Duration::from_micros(u64::from(self.microseconds))
    }

    /// A user session that is still open.
    pub fn is_user_process(&self) -> bool {
        self.record_type == RecordType::UserProcess
    }
}

/// Decodes every record of a `utmp`/`wtmp` file.
///
/// # Errors
///
/// Returns [`Error::UnavailableSource`] if the file is missing and [`Error::Io`] if
/// reading fails mid-stream.
pub fn read_sessions(path: impl AsRef<Path>) -> Result<Vec<SessionRecord>> {
    let path = path.as_ref();
    let reader = fsutil::open_file_reader(path)?;
    Records::<_, SessionRecord>::new(reader)
        .collect::<std::io::Result<_>>()
        .map_err(|e| Error::from_io(path, e))
}

/// Number of whole records in a `utmp`/`wtmp` file.
pub fn record_count(path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    let meta = std::fs::metadata(path).map_err(|e| Error::from_io(path, e))?;
    Ok(meta.len() / UTMP_RECORD_SIZE as u64)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn utmp_record(kind: u32, pid: i32, line: &str, user: &str, host: &str, secs: u32) -> Vec<u8> {
        let mut buf = vec![0u8; UTMP_RECORD_SIZE];
        buf[0..4].copy_from_slice(&kind.to_le_bytes());
        buf[4..8].copy_from_slice(&pid.to_le_bytes());
        buf[8..8 + line.len()].copy_from_slice(line.as_bytes());
        buf[40..42].copy_from_slice(b"ts");
        buf[44..44 + user.len()].copy_from_slice(user.as_bytes());
        buf[76..76 + host.len()].copy_from_slice(host.as_bytes());
        buf[332..334].copy_from_slice(&1i16.to_le_bytes());
        buf[334..336].copy_from_slice(&(-2i16).to_le_bytes());
        buf[336..340].copy_from_slice(&77i32.to_le_bytes());
        buf[340..344].copy_from_slice(&secs.to_le_bytes());
        buf[344..348].copy_from_slice(&250_000u32.to_le_bytes());
        buf
    }

    #[test]
    fn test_decode_crafted_record() {
        let mut buf = utmp_record(7, 4321, "pts/3", "alice", "10.1.2.3", 1_700_000_000);
        buf[348..352].copy_from_slice(&[10, 1, 2, 3]);

        let rec = SessionRecord::decode(&buf);
        assert_eq!(rec.record_type, RecordType::UserProcess);
        assert_eq!(rec.pid, 4321);
        assert_eq!(rec.line, "pts/3");
        assert_eq!(rec.id, "ts");
        assert_eq!(rec.user, "alice");
        assert_eq!(rec.host, "10.1.2.3");
        assert_eq!(rec.term_status, 1);
        assert_eq!(rec.exit_status, -2);
        assert_eq!(rec.session, 77);
        assert_eq!(rec.seconds, 1_700_000_000);
        assert_eq!(rec.address, Some(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))));
        assert_eq!(
            rec.login_time(),
            SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_250)
        );
        assert!(rec.is_remote());
        assert!(rec.is_user_process());
    }

    #[test]
    fn test_record_type_labels() {
        assert_eq!(RecordType::from_code(2).label(), "boot");
        assert_eq!(RecordType::from_code(8).label(), "dead");
        assert_eq!(RecordType::from_code(0).label(), "empty");
        assert_eq!(RecordType::from_code(42).label(), "***");
        assert_eq!(RecordType::from_code(42).code(), 42);
    }

    #[test]
    fn test_ipv6_address() {
        let mut raw = [0u8; 16];
        raw[0] = 0x20;
        raw[1] = 0x01;
        raw[15] = 1;
        assert_eq!(decode_address(&raw), Some(IpAddr::V6("2001::1".parse().unwrap())));
        assert_eq!(decode_address(&[0; 16]), None);
    }

    #[test]
    fn test_read_file_with_truncated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wtmp");
        let mut data = utmp_record(2, 0, "~", "reboot", "6.1.0", 100);
        data.extend(utmp_record(7, 99, "tty1", "root", "", 200));
        data.extend([1u8; 100]);
        std::fs::write(&path, &data).unwrap();

        let records = read_sessions(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_type.label(), "boot");
        assert_eq!(records[1].user, "root");
        assert!(!records[1].is_remote());
        assert_eq!(record_count(&path).unwrap(), 2);

        let ctx = Context::new(dir.path(), 100.0, SystemTime::UNIX_EPOCH).with_hostname("box");
        assert_eq!(records[1].hostname(&ctx), "box");
        assert_eq!(records[0].hostname(&ctx), "6.1.0");
        assert_eq!(records[1].command(&ctx), "");

        assert!(read_sessions(dir.path().join("utmp")).unwrap_err().is_unavailable());
    }
}
