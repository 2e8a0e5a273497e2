//! Backing byte sources for archives.
//!
//! An archive reads everything through one backing source: either an owned
//! buffer or a read-only memory map. Only the owned variant can append, so
//! patch and save are rejected on mapped archives at this seam.

use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};
use tracing::debug;

use crate::error::{Error, Result};

pub(crate) enum BackingSource {
    /// Mutable in-memory buffer
    Owned(Vec<u8>),
    /// Read-only memory-mapped file
    Mapped(Mmap),
}

impl BackingSource {
    /// Map `path` read-only.
    pub(crate) fn open_mapped(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the map is read-only and private to this process; the
        // archive owns it for the lifetime of every view handed out.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        debug!("memory-mapped {} ({} bytes)", path.display(), mmap.len());
        Ok(Self::Mapped(mmap))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Owned(buffer) => buffer,
            Self::Mapped(mmap) => mmap,
        }
    }

    pub(crate) fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }

    /// Bounds-checked view of `[offset, offset + length)`.
    pub(crate) fn slice(&self, offset: usize, length: usize) -> Result<&[u8]> {
        let bytes = self.as_bytes();
        match offset.checked_add(length) {
            Some(end) if end <= bytes.len() => Ok(&bytes[offset..end]),
            _ => Err(Error::InvalidRange {
                offset,
                length,
                len: bytes.len(),
            }),
        }
    }

    /// Append `payload` and return its offset. Owned backing only.
    pub(crate) fn append(&mut self, payload: &[u8]) -> Result<u32> {
        match self {
            Self::Owned(buffer) => {
                let offset = buffer.len() as u32;
                buffer.extend_from_slice(payload);
                Ok(offset)
            }
            Self::Mapped(_) => Err(Error::ReadOnlyArchive),
        }
    }
}
