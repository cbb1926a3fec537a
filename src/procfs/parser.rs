//! Generic parsing traits for kernel text files.
//!
//! - [`KeyValueStat`]: multi-line `key<sep> value [unit]` files such as `meminfo` and
//!   `/proc/<pid>/status`. Implementors register one handler per known key; unknown keys
//!   are ignored.
//! - [`SingleLineStat`]: files whose whole content is one line, such as `loadavg` and
//!   `uptime`.
//!
//! # Example: Implementing `KeyValueStat`
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::num::ParseIntError;
//! use std::sync::LazyLock;
//! use hostwatch::procfs::{FieldHandler, KeyValueStat};
//!
//! #[derive(Default)]
//! struct Limits {
//!     open_files: u64,
//! }
//!
//! fn set_open_files(s: &mut Limits, v: &str) -> Result<(), ParseIntError> {
//!     s.open_files = v.parse()?;
//!     Ok(())
//! }
//!
//! static HANDLERS: LazyLock<HashMap<&'static str, FieldHandler<Limits>>> =
//!     LazyLock::new(|| HashMap::from([("open_files", set_open_files as FieldHandler<Limits>)]));
//!
//! impl KeyValueStat for Limits {
//!     const SEPARATOR: char = '=';
//!     const SKIP_LINES: usize = 0;
//!     const ALLOW_DUPLICATE_KEYS: bool = false;
//!
//!     fn field_handlers() -> &'static HashMap<&'static str, FieldHandler<Self>> {
//!         &HANDLERS
//!     }
//! }
//!
//! let limits = Limits::from_reader(&mut "open_files=1024\n".as_bytes()).unwrap();
//! assert_eq!(limits.open_files, 1024);
//! ```

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::num::ParseIntError;

use super::StatParseError;

/// Applies the (trimmed) value of one key to the struct being populated.
pub type FieldHandler<S> = fn(&mut S, &str) -> Result<(), ParseIntError>;

/// A trait for parsing `key<SEPARATOR> value` style files line by line.
pub trait KeyValueStat: Default
where
    Self: 'static,
{
    /// Character between key and value, e.g. `':'` in `MemTotal:  16384 kB`.
    const SEPARATOR: char;

    /// The number of lines at the start of the file to skip before parsing begins.
    const SKIP_LINES: usize;

    /// If `false`, a repeated known key is an error, and parsing stops early once every
    /// known key has been seen.
    const ALLOW_DUPLICATE_KEYS: bool;

    /// Returns the map of known keys to their handlers.
    fn field_handlers() -> &'static HashMap<&'static str, FieldHandler<Self>>;

    /// Parses a buffered reader into a populated instance.
    ///
    /// Lines without a separator are skipped, unknown keys are passed to
    /// [`KeyValueStat::on_unknown_key`]. Invalid UTF-8 is replaced, not rejected.
    ///
    /// # Errors
    /// Returns an `io::Error` if reading fails, or a `StatParseError` wrapped in `io::Error`
    /// (kind `InvalidData`) if a known key carries an unparsable value.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut stat = Self::default();
        let handlers = Self::field_handlers();
        let field_count = handlers.len();
        let mut seen_keys = HashSet::with_capacity(field_count);

        let mut line = Vec::new();
        let mut lineno = 0;
        for _ in 0..Self::SKIP_LINES {
            buf.read_until(b'\n', &mut line)?;
            line.clear();
        }

        while buf.read_until(b'\n', &mut line)? != 0 {
            lineno += 1;
            // `comm` and other names are raw bytes to the kernel
            let text = String::from_utf8_lossy(&line);
            if let Some((key, value)) = text.split_once(Self::SEPARATOR) {
                Self::parse_and_set(
                    key.trim(),
                    value.trim(),
                    &mut stat,
                    lineno,
                    handlers,
                    &mut seen_keys,
                )?;
            }
            if !Self::ALLOW_DUPLICATE_KEYS && seen_keys.len() == field_count {
                break;
            }

            line.clear();
        }

        Ok(stat)
    }

    /// Applies a single key/value pair through its handler.
    ///
    /// # Errors
    /// Returns `StatParseError::InvalidKeyValue` if the handler rejects the value, or
    /// `StatParseError::DuplicateField` if the key repeats and duplicates are disallowed.
    fn parse_and_set(
        key: &str,
        val: &str,
        stat: &mut Self,
        lineno: usize,
        handlers: &HashMap<&'static str, FieldHandler<Self>>,
        seen_keys: &mut HashSet<&'static str>,
    ) -> std::io::Result<()> {
        let Some((k, handler)) = handlers.get_key_value(key) else {
            return Self::on_unknown_key(key, val, lineno);
        };
        if !seen_keys.insert(k) && !Self::ALLOW_DUPLICATE_KEYS {
            return Err(StatParseError::DuplicateField {
                field: key.to_string(),
                line: lineno,
            }
            .into());
        }
        handler(stat, val).map_err(|source| StatParseError::InvalidKeyValue {
            key: key.to_string(),
            value: val.to_string(),
            line: lineno,
            source,
        })?;
        Ok(())
    }

    /// Called for keys without a handler. Ignores them by default.
    #[inline]
    fn on_unknown_key(_key: &str, _val: &str, _lineno: usize) -> std::io::Result<()> {
        Ok(())
    }
}

/// Returns the first whitespace-delimited token of a value, e.g. `16384` of `16384 kB`
/// or the real uid of `1000\t1000\t1000\t1000`.
pub fn first_token(value: &str) -> &str {
    value.split_whitespace().next().unwrap_or("")
}

/// A trait for parsing files that consist of a single line.
pub trait SingleLineStat: Sized {
    /// Parses the statistic from the provided buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if reading fails or the line cannot be parsed.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self>;
}
