//! Error types for packet cipher operations

use thiserror::Error;

/// Result type for cipher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Cipher error types
#[derive(Error, Debug)]
pub enum Error {
    /// Offset/count outside the input buffer
    #[error("invalid range: offset {offset}, count {count}, buffer is {len} bytes")]
    InvalidRange {
        offset: usize,
        count: usize,
        len: usize,
    },

    /// Frame too short for its fixed fields, or hash tag mismatch in
    /// verified decryption
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}
