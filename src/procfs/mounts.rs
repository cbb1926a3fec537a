//! Mounted filesystems from `/proc/mounts`.

use std::path::Path;

use serde::Serialize;

use super::table::{Delimiter, TableSpec};
use super::Result;
use crate::context::Context;
use crate::fsutil;

const MOUNTS: TableSpec = TableSpec::new(6, 0, Delimiter::Whitespace);
const SECTOR_SIZE: u64 = 512;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Filesystem {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub options: Vec<String>,
    pub dump: u32,
    pub check: u32,
    /// Size of the backing block device, when it has one.
    pub size_bytes: Option<u64>,
}

impl Filesystem {
    fn from_row(row: Vec<String>) -> Option<Self> {
        let [device, mount_point, fs_type, options, dump, check]: [String; 6] =
            row.try_into().ok()?;
        Some(Self {
            options: options.split(',').map(str::to_owned).collect(),
            dump: dump.parse().unwrap_or(0),
            check: check.parse().unwrap_or(0),
            device,
            mount_point,
            fs_type,
            size_bytes: None,
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.options.iter().any(|o| o == "ro")
    }
}

/// Size in bytes of block device `name` (`sda1`), from its sector count.
fn block_size(ctx: &Context, device: &str) -> Option<u64> {
    let name = Path::new(device.strip_prefix("/dev/")?).file_name()?;
    let sectors: u64 =
        fsutil::read_parsed_attribute(ctx.sys_path("class/block").join(name).join("size"))?;
    Some(sectors * SECTOR_SIZE)
}

/// Lists the mounted filesystems of the host.
///
/// # Arguments
///
/// * `ctx` - Host context; mounts come from `proc/mounts` and block device sizes from
///   `sys/class/block` under its root.
///
/// # Returns
///
/// One [`Filesystem`] per six-field mount row. `size_bytes` is `None` for mounts not backed by a
/// block device listed in sysfs.
///
/// # Errors
///
/// - [`Error::UnavailableSource`](super::Error::UnavailableSource) if `proc/mounts`
///   cannot be opened.
/// - [`Error::Io`](super::Error::Io) if reading fails part way through.
pub fn read_mounts(ctx: &Context) -> Result<Vec<Filesystem>> {
    let mut out = Vec::new();
    for row in MOUNTS.open(ctx.proc_path("mounts"))? {
        if let Some(mut fs) = Filesystem::from_row(row?) {
            fs.size_bytes = block_size(ctx, &fs.device);
            out.push(fs);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[test]
    fn test_read_mounts_with_block_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("proc")).unwrap();
        std::fs::create_dir_all(root.join("sys/class/block/sda1")).unwrap();
        std::fs::write(root.join("sys/class/block/sda1/size"), "2048\n").unwrap();
        std::fs::write(
            root.join("proc/mounts"),
            "/dev/sda1 / ext4 rw,relatime 0 1\n\
             proc /proc proc rw,nosuid,nodev,noexec 0 0\n\
             /dev/sdb1 /data xfs ro 0 2\n\
             garbage\n",
        )
        .unwrap();

        let ctx = Context::new(root, 100.0, SystemTime::UNIX_EPOCH);
        let mounts = read_mounts(&ctx).unwrap();
        assert_eq!(mounts.len(), 3);

        assert_eq!(mounts[0].mount_point, "/");
        assert_eq!(mounts[0].options, ["rw", "relatime"]);
        assert_eq!(mounts[0].check, 1);
        assert_eq!(mounts[0].size_bytes, Some(2048 * 512));

        assert_eq!(mounts[1].fs_type, "proc");
        assert_eq!(mounts[1].size_bytes, None);

        assert!(mounts[2].is_read_only());
        assert_eq!(mounts[2].size_bytes, None);
    }
}
