//! Adaptive Huffman codec for Dark Ages HPF assets.
//!
//! HPF is the compressed container used for the game's tile and image data.
//! The payload is coded with an adaptive Huffman tree that both sides mutate
//! in lockstep after every symbol, so no code table is ever transmitted.
//! Round-trips are byte-exact: recompressing a decompressed legacy asset
//! reproduces the original blob.

pub mod compress;
pub mod decompress;
pub mod error;

mod bits;
mod tree;

pub use compress::compress;
pub use decompress::decompress;
pub use error::{Error, Result};

/// Magic bytes that open every HPF blob.
pub const HPF_MAGIC: [u8; 4] = [0x55, 0xAA, 0x02, 0xFF];
