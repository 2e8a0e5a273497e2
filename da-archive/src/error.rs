//! Error types for archive operations

use std::io;
use thiserror::Error;

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Archive error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Index inconsistent with the backing source
    #[error("malformed archive: {0}")]
    MalformedFrame(String),

    /// Byte range outside the backing source
    #[error("invalid range: offset {offset}, length {length}, backing is {len} bytes")]
    InvalidRange {
        offset: usize,
        length: usize,
        len: usize,
    },

    /// Entry name longer than the index can record
    #[error("entry name too long: {name:?} is {len} bytes, limit is 13")]
    NameTooLong { name: String, len: usize },

    /// Mutation attempted on a memory-mapped archive
    #[error("archive is memory-mapped and read-only")]
    ReadOnlyArchive,

    /// Operation on a closed archive
    #[error("archive has been closed")]
    Disposed,
}
