//! Fixed-arity row extraction from delimited kernel tables.
//!
//! Many kernel files are tables: `net/route` (tab separated), `net/arp`, `mounts`,
//! `net/if_inet6` (whitespace separated). [`Table`] turns such a file into a lazy,
//! finite, single-pass iterator of rows with an exact field count. Rows with the wrong
//! arity are skipped; an I/O error mid-stream is yielded once and ends the iteration.
//! Rows are decoded lossily: names are raw bytes to the kernel, so a non-UTF-8 mount
//! point or interface name keeps its row with replacement characters.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use super::{Error, Result};
use crate::fsutil;

/// How fields of a row are separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// Any run of whitespace separates fields; leading/trailing whitespace is ignored.
    Whitespace,
    /// A single character separates fields; each field is trimmed.
    Char(char),
}

impl Delimiter {
    fn split(self, line: &str) -> Vec<String> {
        match self {
            Delimiter::Whitespace => line.split_whitespace().map(str::to_owned).collect(),
            Delimiter::Char(c) => line.split(c).map(|f| f.trim().to_owned()).collect(),
        }
    }
}

/// How many fields a row must have to be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    /// At least this many; extra trailing fields are kept.
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exact(fields) => n == fields,
            Arity::AtLeast(fields) => n >= fields,
        }
    }
}

/// Shape of a kernel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub arity: Arity,
    /// Header lines to skip before the first row.
    pub skip_lines: usize,
    pub delimiter: Delimiter,
}

impl TableSpec {
    /// A table whose rows have exactly `fields` fields.
    pub const fn new(fields: usize, skip_lines: usize, delimiter: Delimiter) -> Self {
        Self {
            arity: Arity::Exact(fields),
            skip_lines,
            delimiter,
        }
    }

    /// A table whose rows have at least `fields` fields, like the socket tables where
    /// short-lived sockets print fewer trailing columns.
    pub const fn at_least(fields: usize, skip_lines: usize, delimiter: Delimiter) -> Self {
        Self {
            arity: Arity::AtLeast(fields),
            skip_lines,
            delimiter,
        }
    }

    /// Opens `path` and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnavailableSource`] if the file does not exist or cannot be opened.
    pub fn open(self, path: impl AsRef<Path>) -> Result<Table<std::io::BufReader<std::fs::File>>> {
        let path = path.as_ref();
        let reader = fsutil::open_file_reader(path)?;
        Ok(Table::new(reader, self, path))
    }
}

/// A lazy sequence of fixed-arity rows read from a table.
///
/// Not restartable: it consumes the underlying reader.
#[derive(Debug)]
pub struct Table<R> {
    reader: R,
    spec: TableSpec,
    path: PathBuf,
    line: Vec<u8>,
    header_skipped: bool,
    done: bool,
}

impl<R: BufRead> Table<R> {
    /// Wraps any buffered reader. `path` is only used in error messages.
    pub fn new(reader: R, spec: TableSpec, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            spec,
            path: path.into(),
            line: Vec::new(),
            header_skipped: false,
            done: false,
        }
    }

    fn read_line(&mut self) -> Option<Result<()>> {
        self.line.clear();
        match self.reader.read_until(b'\n', &mut self.line) {
            Ok(0) => None,
            Ok(_) => Some(Ok(())),
            Err(source) => Some(Err(Error::Io {
                path: self.path.clone(),
                source,
            })),
        }
    }
}

impl<R: BufRead> Iterator for Table<R> {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.header_skipped {
            self.header_skipped = true;
            for _ in 0..self.spec.skip_lines {
                match self.read_line() {
                    Some(Ok(())) => {}
                    Some(Err(err)) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                    None => {
                        self.done = true;
                        return None;
                    }
                }
            }
        }

        loop {
            match self.read_line() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                Some(Ok(())) => {
                    let line = String::from_utf8_lossy(&self.line);
                    let row = self.spec.delimiter.split(line.trim_end_matches(['\n', '\r']));
                    if self.spec.arity.accepts(row.len()) {
                        return Some(Ok(row));
                    }
                    log::trace!(
                        "skipping row with {} fields (expected {:?}) in `{}`",
                        row.len(),
                        self.spec.arity,
                        self.path.display()
                    );
                }
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for Table<R> {}
