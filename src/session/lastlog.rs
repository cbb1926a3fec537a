//! Last-login log (`struct lastlog`, 292 bytes per uid).
//!
//! The file is indexed by uid: record `n` belongs to uid `n`. It is usually sparse.

use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::record::{FixedRecord, le_u32, record_at, text, trim_nul};
use crate::fsutil;
use crate::procfs::{Error, Result};

pub const LASTLOG_RECORD_SIZE: usize = 292;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastLoginRecord {
    pub uid: u32,
    /// Seconds since the epoch; zero if the user never logged in.
    pub seconds: u32,
    pub line: String,
    /// Remote host as stored, NUL padding removed.
    pub host: Vec<u8>,
}

impl FixedRecord for LastLoginRecord {
    const SIZE: usize = LASTLOG_RECORD_SIZE;

    fn decode(buf: &[u8]) -> Self {
        Self {
            uid: 0,
            seconds: le_u32(buf, 0),
            line: text(&buf[4..36]),
            host: trim_nul(&buf[36..292]).to_vec(),
        }
    }
}

impl LastLoginRecord {
    /// Whether the user ever logged in.
    pub fn found(&self) -> bool {
        self.seconds != 0
    }

    pub fn login_time(&self) -> Option<SystemTime> {
        self.found()
            .then(|| SystemTime::UNIX_EPOCH + Duration::from_secs(u64::from(self.seconds)))
    }

    pub fn host(&self) -> String {
        String::from_utf8_lossy(&self.host).into_owned()
    }
}

/// Reads the records of the given uids from a `lastlog` file.
///
/// Each record is read at its own offset, so the cost does not depend on the file's
/// apparent size: a single login by a uid near `u32::MAX` makes the file sparse and
/// terabytes long. Uids past the end of the file have never logged in and are left out.
///
/// # Errors
///
/// Returns [`Error::UnavailableSource`] if the file cannot be opened and [`Error::Io`]
/// if a seek or read fails.
pub fn read_lastlog(
    path: impl AsRef<Path>,
    uids: impl IntoIterator<Item = u32>,
) -> Result<Vec<LastLoginRecord>> {
    let path = path.as_ref();
    let mut reader = fsutil::open_file_reader(path)?;
    let len = reader
        .get_ref()
        .metadata()
        .map_err(|e| Error::from_io(path, e))?
        .len();

    let mut uids: Vec<u32> = uids.into_iter().collect();
    uids.sort_unstable();
    uids.dedup();

    let mut out = Vec::new();
    for uid in uids {
        let record = record_at::<_, LastLoginRecord>(&mut reader, len, u64::from(uid))
            .map_err(|e| Error::from_io(path, e))?;
        if let Some(mut record) = record {
            record.uid = uid;
            out.push(record);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lastlog_record(secs: u32, line: &str, host: &str) -> Vec<u8> {
        let mut buf = vec![0u8; LASTLOG_RECORD_SIZE];
        buf[0..4].copy_from_slice(&secs.to_le_bytes());
        buf[4..4 + line.len()].copy_from_slice(line.as_bytes());
        buf[36..36 + host.len()].copy_from_slice(host.as_bytes());
        buf
    }

    #[test]
    fn test_never_logged_in() {
        let rec = LastLoginRecord::decode(&vec![0u8; LASTLOG_RECORD_SIZE]);
        assert!(!rec.found());
        assert_eq!(rec.login_time(), None);
        assert_eq!(rec.line, "");
        assert!(rec.host.is_empty());
    }

    #[test]
    fn test_read_lastlog_by_uid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lastlog");
        let mut data = lastlog_record(1_600_000_000, "pts/1", "gateway.example");
        data.extend(lastlog_record(0, "", ""));
        data.extend(lastlog_record(1_700_000_000, "tty2", ""));
        data.extend([0u8; 10]);
        std::fs::write(&path, &data).unwrap();

        let all = read_lastlog(&path, [2, 0, 1, 0, 3]).unwrap();
        assert_eq!(all.iter().map(|r| r.uid).collect::<Vec<_>>(), [0, 1, 2]);
        assert_eq!(all[0].host(), "gateway.example");
        assert_eq!(all[0].line, "pts/1");
        assert!(!all[1].found());
        assert_eq!(
            all[2].login_time(),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
    }

    #[test]
    fn test_sparse_file_reads_only_requested_records() {
        use std::io::{Seek, SeekFrom, Write};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lastlog");
        let high_uid: u32 = 4_000_000;
        let mut file = std::fs::File::create(&path).unwrap();
        file.set_len((u64::from(high_uid) + 1) * LASTLOG_RECORD_SIZE as u64)
            .unwrap();
        file.seek(SeekFrom::Start(u64::from(high_uid) * LASTLOG_RECORD_SIZE as u64))
            .unwrap();
        file.write_all(&lastlog_record(1_650_000_000, "pts/9", "nfs"))
            .unwrap();
        drop(file);

        let started = std::time::Instant::now();
        let records = read_lastlog(&path, [0, 1000, high_uid, u32::MAX]).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(records.len(), 3);
        assert!(!records[0].found());
        assert!(!records[1].found());
        assert_eq!(records[2].uid, high_uid);
        assert_eq!(records[2].host(), "nfs");
        assert!(read_lastlog(dir.path().join("missing"), [0]).unwrap_err().is_unavailable());
    }
}
