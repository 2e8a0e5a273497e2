//! HPF decompression

use tracing::debug;

use crate::bits::BitReader;
use crate::error::{Error, Result};
use crate::tree::{AdaptiveTree, SYMBOL_BASE, TERMINATOR};
use crate::HPF_MAGIC;

/// Decompress an HPF blob.
///
/// Validates the `55 AA 02 FF` header, then walks the LSB-first bitstream
/// through the adaptive tree: each decoded leaf past node 0xFF yields the
/// symbol `node - 0x100`, the end-of-stream symbol stops decoding, and any
/// trailing bits are padding. The output grows without bound; the legacy
/// decoder capped it at ten times its 64 KiB scratch buffer instead.
///
/// # Errors
///
/// [`Error::MalformedFrame`] when the header is absent or the bitstream
/// runs out before the end-of-stream symbol.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < HPF_MAGIC.len() {
        return Err(Error::MalformedFrame(format!(
            "blob too short for header: {} bytes",
            data.len()
        )));
    }
    if data[..HPF_MAGIC.len()] != HPF_MAGIC {
        return Err(Error::MalformedFrame(format!(
            "bad header: expected {HPF_MAGIC:02x?}, got {:02x?}",
            &data[..HPF_MAGIC.len()]
        )));
    }

    let mut reader = BitReader::new(&data[HPF_MAGIC.len()..]);
    let mut tree = AdaptiveTree::new();
    let mut output = Vec::new();

    loop {
        let mut node = 0u16;
        while node <= 0xFF {
            let bit = reader.next().ok_or_else(|| {
                Error::MalformedFrame("bitstream ended before end-of-stream symbol".into())
            })?;
            node = if bit { tree.right(node) } else { tree.left(node) };
        }

        let symbol = node - SYMBOL_BASE;
        if symbol == TERMINATOR {
            break;
        }
        output.push(symbol as u8);
        tree.promote(node);
    }

    debug!("HPF decompress: {} bytes -> {} bytes", data.len(), output.len());
    Ok(output)
}
