//! Session accounting: `utmp`, `wtmp` and `lastlog`.
//!
//! These are flat binary files of fixed-size little-endian records. [`record`] holds the
//! generic sequential reader; [`utmp`] and [`lastlog`] the two layouts.

pub mod lastlog;
pub mod record;
pub mod utmp;

use std::path::PathBuf;

use serde::Serialize;

pub use lastlog::{LastLoginRecord, read_lastlog};
pub use record::{FixedRecord, Records};
pub use utmp::{RecordType, SessionRecord, read_sessions, record_count};

use crate::context::Context;
use crate::error::ResultOkLogExt;
use crate::procfs::Result;
use crate::users::UserResolver;

/// `run/utmp`, or `var/run/utmp` on hosts without a top-level `/run`.
pub fn utmp_path(ctx: &Context) -> PathBuf {
    let run = ctx.root().join("run/utmp");
    if run.exists() {
        run
    } else {
        ctx.var_path("run/utmp")
    }
}

pub fn wtmp_path(ctx: &Context) -> PathBuf {
    ctx.var_path("log/wtmp")
}

pub fn lastlog_path(ctx: &Context) -> PathBuf {
    ctx.var_path("log/lastlog")
}

/// Everything the session accounting files say about logins.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Sessions {
    /// Records of `utmp`, in file order.
    pub logins: Vec<SessionRecord>,
    /// Records in `utmp`.
    pub current: u64,
    /// Records in `wtmp` since it was last rotated.
    pub total: u64,
    /// Last logins of known accounts that logged in at least once.
    pub last_logins: Vec<LastLoginRecord>,
}

impl Sessions {
    /// Number of open user sessions.
    pub fn users(&self) -> usize {
        self.logins.iter().filter(|l| l.is_user_process()).count()
    }
}

/// Reads `utmp`, the record counts and `lastlog`.
///
/// # Errors
///
/// Fails only if `utmp` cannot be read; `wtmp` and `lastlog` are optional.
pub fn read_all(ctx: &Context, users: &UserResolver) -> Result<Sessions> {
    let utmp = utmp_path(ctx);
    let logins = read_sessions(&utmp)?;
    let current = logins.len() as u64;
    let total = record_count(wtmp_path(ctx)).ok_log_debug().unwrap_or(0);
    let mut last_logins = read_lastlog(lastlog_path(ctx), users.uids())
        .ok_log_debug()
        .unwrap_or_default();
    last_logins.retain(LastLoginRecord::found);

    Ok(Sessions {
        logins,
        current,
        total,
        last_logins,
    })
}
