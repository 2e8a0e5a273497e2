//! HPF compression

use tracing::debug;

use crate::bits::BitWriter;
use crate::tree::{AdaptiveTree, SYMBOL_BASE, TERMINATOR};
use crate::HPF_MAGIC;

/// Compress `data` into an HPF blob.
///
/// Emits the root-to-leaf code for every input byte, then the code for the
/// end-of-stream symbol, running the shared tree promote after each symbol
/// exactly as the decoder does. Bits are packed LSB-first and the final
/// partial byte is zero-padded; the 4-byte header is prepended.
///
/// Cannot fail on well-formed input, so the blob is returned directly.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut tree = AdaptiveTree::new();
    // Worst case early in the stream is ~9 bits per byte.
    let mut writer = BitWriter::with_capacity(data.len() * 9 / 8 + 8);
    let mut path = Vec::with_capacity(16);

    for &byte in data {
        let leaf = u16::from(byte) + SYMBOL_BASE;
        tree.path_to(leaf, &mut path);
        for &bit in &path {
            writer.push(bit);
        }
        tree.promote(leaf);
    }

    // Close the stream. The decoder stops here, so no promote follows.
    tree.path_to(TERMINATOR + SYMBOL_BASE, &mut path);
    for &bit in &path {
        writer.push(bit);
    }

    let payload = writer.finish();
    let mut blob = Vec::with_capacity(HPF_MAGIC.len() + payload.len());
    blob.extend_from_slice(&HPF_MAGIC);
    blob.extend_from_slice(&payload);

    debug!("HPF compress: {} bytes -> {} bytes", data.len(), blob.len());
    blob
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_always_present() {
        assert_eq!(&compress(&[])[..4], &HPF_MAGIC);
        assert_eq!(&compress(b"abc")[..4], &HPF_MAGIC);
    }

    #[test]
    fn empty_input_is_terminator_path_only() {
        // Depth-9 terminator path padded to two bytes.
        let blob = compress(&[]);
        assert_eq!(blob.len(), 4 + 2);
    }

    #[test]
    fn output_is_deterministic() {
        let data: Vec<u8> = (0..=255).cycle().take(1000).collect();
        assert_eq!(compress(&data), compress(&data));
    }
}
