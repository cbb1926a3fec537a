//! Uid/gid to name resolution from the host's `etc/passwd` and `etc/group`.

use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::context::Context;
use crate::error::ResultOkLogExt;

/// Parses `name:x:id:...` lines into `(id, name)` pairs. Comments and malformed lines are
/// skipped.
fn parse_id_file(content: &str) -> impl Iterator<Item = (u32, String)> + '_ {
    content
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?;
            let id = fields.nth(1)?.parse().ok()?;
            (!name.is_empty()).then(|| (id, name.to_owned()))
        })
}

/// Concurrent uid/gid name cache shared by every collection task.
///
/// The tables are loaded with [`UserResolver::reload`], once per collection cycle, so
/// accounts created while the agent runs show up on the next cycle. An unknown id is a
/// lookup miss, never an error.
#[derive(Debug)]
pub struct UserResolver {
    passwd: PathBuf,
    group: PathBuf,
    users: DashMap<u32, String>,
    groups: DashMap<u32, String>,
}

impl UserResolver {
    pub fn new(ctx: &Context) -> Self {
        Self::with_paths(ctx.etc_path("passwd"), ctx.etc_path("group"))
    }

    pub fn with_paths(passwd: impl Into<PathBuf>, group: impl Into<PathBuf>) -> Self {
        Self {
            passwd: passwd.into(),
            group: group.into(),
            users: DashMap::new(),
            groups: DashMap::new(),
        }
    }

    fn load(path: &Path, into: &DashMap<u32, String>) {
        let Some(content) = std::fs::read_to_string(path)
            .map_err(|source| crate::fsutil::FileOpenError {
                path: path.to_path_buf(),
                source,
            })
            .ok_log_debug()
        else {
            return;
        };
        into.clear();
        for (id, name) in parse_id_file(&content) {
            // first entry wins, like getpwuid
            into.entry(id).or_insert(name);
        }
    }

    /// Re-reads both tables. A missing table keeps the previously loaded names.
    pub fn reload(&self) {
        Self::load(&self.passwd, &self.users);
        Self::load(&self.group, &self.groups);
        log::trace!(
            "loaded {} users and {} groups",
            self.users.len(),
            self.groups.len()
        );
    }

    /// Every known uid, ascending.
    pub fn uids(&self) -> Vec<u32> {
        let mut uids: Vec<u32> = self.users.iter().map(|entry| *entry.key()).collect();
        uids.sort_unstable();
        uids
    }

    pub fn user(&self, uid: u32) -> Option<String> {
        self.users.get(&uid).map(|name| name.value().clone())
    }

    pub fn group(&self, gid: u32) -> Option<String> {
        self.groups.get(&gid).map(|name| name.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_file() {
        let content = "\
# comment
root:x:0:0:root:/root:/bin/bash
broken line
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
toor:x:0:0::/root:/bin/sh
";
        let pairs: Vec<_> = parse_id_file(content).collect();
        assert_eq!(
            pairs,
            vec![
                (0, "root".to_owned()),
                (1, "daemon".to_owned()),
                (0, "toor".to_owned())
            ]
        );
    }

    #[test]
    fn test_resolver_lookups_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let passwd = dir.path().join("passwd");
        let group = dir.path().join("group");
        std::fs::write(&passwd, "root:x:0:0::/root:/bin/sh\ntoor:x:0:0::/:/bin/sh\n").unwrap();
        std::fs::write(&group, "wheel:x:10:root\n").unwrap();

        let resolver = UserResolver::with_paths(&passwd, &group);
        assert_eq!(resolver.user(0), None);

        resolver.reload();
        assert_eq!(resolver.user(0).as_deref(), Some("root"));
        assert_eq!(resolver.group(10).as_deref(), Some("wheel"));
        assert_eq!(resolver.user(1000), None);
        assert_eq!(resolver.uids(), [0]);

        std::fs::write(&passwd, "alice:x:1000:1000::/home/alice:/bin/sh\n").unwrap();
        resolver.reload();
        assert_eq!(resolver.user(0), None);
        assert_eq!(resolver.user(1000).as_deref(), Some("alice"));
        assert_eq!(resolver.uids(), [1000]);

        std::fs::remove_file(&passwd).unwrap();
        resolver.reload();
        assert_eq!(resolver.user(1000).as_deref(), Some("alice"));
    }
}
