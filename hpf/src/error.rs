//! Error types for HPF coding

use thiserror::Error;

/// Result type for HPF operations
pub type Result<T> = std::result::Result<T, Error>;

/// HPF error types
#[derive(Error, Debug)]
pub enum Error {
    /// Header absent or the code stream cannot be walked to a terminator
    #[error("malformed HPF frame: {0}")]
    MalformedFrame(String),
}
