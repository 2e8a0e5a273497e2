//! Indexed `.dat` archive container for Dark Ages game data.
//!
//! The archive is the substrate every other reader consumes: an ordered,
//! case-insensitively keyed index over one backing byte source. Backing is
//! either an owned buffer (mutable: patch-append and save) or a read-only
//! memory map (lookups by offset slicing). The on-disk index records each
//! entry's start offset; lengths come from the following entry, with the
//! final recorded address doubling as the end-of-file sentinel.

pub mod archive;
pub mod entry;
pub mod error;
pub mod stream;

mod source;

pub use archive::{Archive, IndexFormat};
pub use entry::{Entry, MAX_NAME_LEN};
pub use error::{Error, Result};
pub use stream::EntryStream;
