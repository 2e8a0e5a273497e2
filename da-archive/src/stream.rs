//! Read-only views over entry byte ranges

use std::io::{Cursor, Read, Seek, SeekFrom};

/// A seekable read-only view over one entry's bytes.
///
/// This is the surface the format readers consume; the view borrows the
/// archive's backing source and cannot outlive it.
pub struct EntryStream<'a> {
    data: Cursor<&'a [u8]>,
}

impl<'a> EntryStream<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data: Cursor::new(data),
        }
    }

    /// Total length of the underlying entry.
    pub fn len(&self) -> usize {
        self.data.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.get_ref().is_empty()
    }

    /// The whole entry as a slice, position-independent.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data.get_ref()
    }
}

impl Read for EntryStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.data.read(buf)
    }
}

impl Seek for EntryStream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.data.seek(pos)
    }
}
