//! Sequential decoding of fixed-size little-endian binary records.

use std::io::{self, Read, Seek, SeekFrom};
use std::marker::PhantomData;

/// A record with a fixed on-disk size.
pub trait FixedRecord: Sized {
    const SIZE: usize;

    /// Decodes one record. `buf` is exactly [`FixedRecord::SIZE`] bytes long.
    fn decode(buf: &[u8]) -> Self;
}

/// Iterator over the records of a flat file of concatenated fixed-size records.
///
/// A short final read ends the iteration; it is a truncated tail, not an error.
#[derive(Debug)]
pub struct Records<R, T> {
    reader: R,
    buf: Vec<u8>,
    done: bool,
    _record: PhantomData<T>,
}

impl<R: Read, T: FixedRecord> Records<R, T> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0; T::SIZE],
            done: false,
            _record: PhantomData,
        }
    }

    /// Fills the buffer, returning the number of bytes read (less than `SIZE` at EOF).
    fn fill(&mut self) -> io::Result<usize> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }
}

impl<R: Read, T: FixedRecord> Iterator for Records<R, T> {
    type Item = io::Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fill() {
            Ok(n) if n == T::SIZE => Some(Ok(T::decode(&self.buf))),
            Ok(n) => {
                if n > 0 {
                    log::debug!("ignoring truncated record of {n} bytes (expected {})", T::SIZE);
                }
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<R: Read, T: FixedRecord> std::iter::FusedIterator for Records<R, T> {}

/// Reads the record at `index` of a file of `len` bytes without touching the records
/// before it. Returns `None` if the record lies past the end of the file.
pub fn record_at<R: Read + Seek, T: FixedRecord>(
    reader: &mut R,
    len: u64,
    index: u64,
) -> io::Result<Option<T>> {
    let size = T::SIZE as u64;
    let Some(end) = index.checked_mul(size).and_then(|start| start.checked_add(size)) else {
        return Ok(None);
    };
    if end > len {
        return Ok(None);
    }
    reader.seek(SeekFrom::Start(end - size))?;
    let mut buf = vec![0; T::SIZE];
    reader.read_exact(&mut buf)?;
    Ok(Some(T::decode(&buf)))
}

pub(crate) fn le_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

pub(crate) fn le_i32(buf: &[u8], at: usize) -> i32 {
    le_u32(buf, at) as i32
}

pub(crate) fn le_i16(buf: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([buf[at], buf[at + 1]])
}

/// Bytes of a fixed-width field with NUL padding stripped from both ends.
pub(crate) fn trim_nul(field: &[u8]) -> &[u8] {
    let start = field.iter().position(|b| *b != 0).unwrap_or(field.len());
    let end = field.iter().rposition(|b| *b != 0).map_or(start, |i| i + 1);
    &field[start..end]
}

/// A fixed-width text field, NUL-trimmed and decoded lossily.
pub(crate) fn text(field: &[u8]) -> String {
    String::from_utf8_lossy(trim_nul(field)).trim().to_owned()
}
