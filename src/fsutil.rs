use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Error that occurs when opening a kernel pseudo-file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl FileOpenError {
    /// Returns `true` if the file does not exist, i.e. the kernel does not expose it.
    pub fn is_not_found(&self) -> bool {
        self.source.kind() == io::ErrorKind::NotFound
    }
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use hostwatch::fsutil;
/// let reader = fsutil::open_file_reader("/proc/meminfo")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Reads a small single-value attribute file (sysfs, `comm`, ...) and trims surrounding
/// whitespace and NUL bytes.
///
/// Returns `None` if the file cannot be read.
pub fn read_attribute(path: impl AsRef<Path>) -> Option<String> {
    let raw = std::fs::read(path).ok()?;
    let text = String::from_utf8_lossy(&raw);
    Some(text.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_owned())
}

/// Reads an attribute file and parses it, returning `None` on any failure.
pub fn read_parsed_attribute<T: std::str::FromStr>(path: impl AsRef<Path>) -> Option<T> {
    read_attribute(path)?.parse().ok()
}

/// Returns the names of all numeric entries of a directory, i.e. the pids of `proc/`.
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the directory cannot be listed.
pub fn numeric_entries(dir: impl AsRef<Path>) -> Result<Vec<u32>, FileOpenError> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|source| FileOpenError {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut out: Vec<u32> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    out.sort_unstable();
    Ok(out)
}
