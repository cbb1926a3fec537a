//! Runtime environment detection.
//!
//! The agent reads the *host's* kernel state. When it runs inside a container the host's
//! root filesystem is expected to be bind-mounted (e.g. at `/rootfs`), and every
//! `proc/`, `sys/`, `etc/` and `var/` path is resolved under that mount instead of `/`.

use std::path::{Path, PathBuf};
use std::{env, fs};

/// Errors that may occur while probing the runtime environment.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to check if path `{path}` exists: {source}")]
    ExistenceCheck {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read namespace link `{path}`: {source}")]
    ReadNamespace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Where the agent is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnvironment {
    /// Directly on the host: kernel files are read from `/`.
    Host,
    /// Inside a container: kernel files are read from the mounted host root.
    Container,
}

/// Detects whether the agent runs on the host or inside a container.
///
/// Checks, in order: whether the mounted host root has its own `proc/` whose init
/// process lives in a different PID namespace, then well-known container marker files
/// and the `container` environment variable. Failed checks are logged and treated as
/// "no evidence".
pub fn detect_runtime_environment(host_root: impl AsRef<Path>) -> RuntimeEnvironment {
    let host_root = host_root.as_ref();
    match pid_namespace_differs(host_root) {
        Ok(true) => return RuntimeEnvironment::Container,
        Ok(false) => {}
        Err(err) => log::debug!("PID namespace check failed: {err}"),
    }

    if has_container_markers() {
        return RuntimeEnvironment::Container;
    }

    RuntimeEnvironment::Host
}

/// Picks the root under which kernel files are resolved.
///
/// Returns `host_root` when running in a container and the mount exists, `/` otherwise.
/// A container without the host mount still falls back to `/` with a warning, since the
/// container's own `/proc` is better than nothing.
pub fn resolve_rootfs(host_root: impl AsRef<Path>) -> PathBuf {
    let host_root = host_root.as_ref();
    match detect_runtime_environment(host_root) {
        RuntimeEnvironment::Host => PathBuf::from("/"),
        RuntimeEnvironment::Container if host_root.exists() => host_root.to_path_buf(),
        RuntimeEnvironment::Container => {
            log::warn!(
                "running in a container without host root mount at `{}`; reporting container-local state",
                host_root.display()
            );
            PathBuf::from("/")
        }
    }
}

fn pid_namespace_differs(host_root: &Path) -> Result<bool> {
    let host_proc = host_root.join("proc");
    let exists = host_proc.try_exists().map_err(|source| Error::ExistenceCheck {
        path: host_proc.clone(),
        source,
    })?;
    if !exists {
        return Ok(false);
    }

    let read_ns = |path: PathBuf| {
        fs::read_link(&path).map_err(|source| Error::ReadNamespace { path, source })
    };
    let own = read_ns(PathBuf::from("/proc/self/ns/pid"))?;
    let host = read_ns(host_proc.join("1/ns/pid"))?;
    Ok(own != host)
}

fn has_container_markers() -> bool {
    fs::metadata("/.dockerenv").is_ok()
        || fs::metadata("/run/.containerenv").is_ok()
        || env::var_os("container").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_host_proc_is_not_namespace_evidence() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!pid_namespace_differs(dir.path()).unwrap());
    }

    #[test]
    fn test_unreadable_namespace_link_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("proc/1/ns")).unwrap();
        let err = pid_namespace_differs(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ReadNamespace { .. }));
    }
}
