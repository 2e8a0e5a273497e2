//! The per-connection packet cipher.
//!
//! A stream XOR driven by three tables: the seed-determined salt, the
//! 9-byte session keystream, and a per-packet keystream regenerated from
//! two nonces stamped into every frame. Client->server and server->client
//! frames differ only in layout and nonce masking constants; the transform
//! itself is its own inverse.

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::keystream::{
    default_keystream, derive_keystream2_table, packet_keystream, NonceSource, KEY_LEN, TABLE_LEN,
};
use crate::salt::{salt_table, SALT_LEN};

/// Frame assembly area reused across calls. Also the largest frame the
/// legacy client will assemble.
const SCRATCH_LEN: usize = 65_532;

/// Nonce masks for client->server frames.
const CLIENT_MASK_A: u16 = 0x7470;
const CLIENT_MASK_B: u8 = 0x23;

/// Nonce masks for server->client frames.
const SERVER_MASK_A: u16 = 0x6474;
const SERVER_MASK_B: u8 = 0x24;

/// Digest bytes appended to client frames, in tag order.
const HASH_TAG: [usize; 4] = [13, 3, 11, 7];

/// Client frame overhead beyond the payload: opcode, sequence, sentinel,
/// hash tag, nonce footer. The opcode echo adds one more under keystream2.
const CLIENT_FIXED_LEN: usize = 2 + 1 + HASH_TAG.len() + 3;

/// Server frame overhead: opcode, sequence, nonce footer.
const SERVER_FIXED_LEN: usize = 2 + 3;

/// Stateful symmetric cipher for one connection.
///
/// Single-owner: the scratch buffer is mutated in place on every call, so
/// concurrent use requires external serialization. Frames must be decrypted
/// in the order they were encrypted; the sequence byte and the per-packet
/// nonces bind each frame to its position in the stream.
pub struct PacketCipher {
    seed: u8,
    salt: [u8; SALT_LEN],
    keystream1: [u8; KEY_LEN],
    keystream2_table: [u8; TABLE_LEN],
    nonces: NonceSource,
    scratch: Vec<u8>,
}

impl PacketCipher {
    /// Create a cipher with the given seed and session keystream.
    pub fn new(seed: u8, keystream: [u8; KEY_LEN]) -> Self {
        Self {
            seed,
            salt: salt_table(seed),
            keystream1: keystream,
            keystream2_table: [0u8; TABLE_LEN],
            nonces: NonceSource::new(),
            scratch: vec![0u8; SCRATCH_LEN],
        }
    }

    /// Create a cipher with seed 0 and the stock client session key,
    /// corrupted bytes included. See [`default_keystream`].
    pub fn default_keyed() -> Self {
        Self::new(0, default_keystream())
    }

    /// The current seed.
    pub fn seed(&self) -> u8 {
        self.seed
    }

    /// Change the seed and regenerate the salt table in place.
    pub fn set_seed(&mut self, seed: u8) {
        self.seed = seed;
        self.salt = salt_table(seed);
        debug!("salt table regenerated for seed {seed}");
    }

    /// Derive the per-packet keystream table from the client name. Called
    /// once after login; frames encrypted under keystream2 before this use
    /// an all-zero table.
    pub fn generate_keystream2_table(&mut self, name: &str) {
        self.keystream2_table = derive_keystream2_table(name);
        debug!("keystream2 table derived ({} bytes)", TABLE_LEN);
    }

    /// Encrypt a client->server packet.
    ///
    /// `buf[offset]` is the opcode, the `count` bytes after it the payload.
    /// Returns the full wire frame: opcode, sequence, transformed payload,
    /// `0x00` sentinel, the opcode echoed when `use_keystream2`, four MD5
    /// tag bytes over everything prior, and the masked nonce footer.
    pub fn encrypt_client_data(
        &mut self,
        buf: &[u8],
        offset: usize,
        count: usize,
        sequence: u8,
        use_keystream2: bool,
    ) -> Result<Vec<u8>> {
        check_input_range(buf, offset, count)?;

        let opcode = buf[offset];
        let (a, b) = self.nonces.next_pair();
        let keystream = self.select_keystream(use_keystream2, a, b);

        let echo = usize::from(use_keystream2);
        let total = CLIENT_FIXED_LEN + echo + count;
        check_scratch_fit(offset, count, total, self.scratch.len())?;
        let frame = &mut self.scratch[..total];

        frame[0] = opcode;
        frame[1] = sequence;
        frame[2..2 + count].copy_from_slice(&buf[offset + 1..offset + 1 + count]);
        transform(&mut frame[2..2 + count], &self.salt, &keystream, sequence);

        let mut pos = 2 + count;
        frame[pos] = 0x00;
        pos += 1;
        if use_keystream2 {
            frame[pos] = opcode;
            pos += 1;
        }

        let digest = md5::compute(&frame[..pos]).0;
        for tag in HASH_TAG {
            frame[pos] = digest[tag];
            pos += 1;
        }

        let masked = a ^ CLIENT_MASK_A;
        frame[pos] = masked as u8;
        frame[pos + 1] = b ^ CLIENT_MASK_B;
        frame[pos + 2] = (masked >> 8) as u8;
        pos += 3;

        trace!("client encrypt: opcode {opcode:#04x}, {count} payload bytes, {pos} on wire");
        Ok(self.scratch[..pos].to_vec())
    }

    /// Decrypt a client->server frame, returning `[opcode, payload...]`.
    ///
    /// Reads the nonce footer first, regenerates the per-packet keystream
    /// when selected, inverse-transforms the payload, then strips hash tag,
    /// sentinel, and the optional opcode echo. The hash tag is accepted
    /// without checking, as the game does; use
    /// [`decrypt_client_data_verified`](Self::decrypt_client_data_verified)
    /// to reject tampered frames.
    pub fn decrypt_client_data(
        &mut self,
        buf: &[u8],
        offset: usize,
        count: usize,
        use_keystream2: bool,
    ) -> Result<Vec<u8>> {
        let frame = check_frame_range(buf, offset, count)?;
        let fixed = CLIENT_FIXED_LEN + usize::from(use_keystream2);
        if frame.len() < fixed {
            return Err(Error::MalformedFrame(format!(
                "client frame of {} bytes shorter than fixed fields ({fixed})",
                frame.len()
            )));
        }

        let (a, b) = read_footer(frame, CLIENT_MASK_A, CLIENT_MASK_B);
        let keystream = self.select_keystream(use_keystream2, a, b);
        let payload_len = frame.len() - fixed;
        check_scratch_fit(offset, count, payload_len, self.scratch.len())?;

        let opcode = frame[0];
        let sequence = frame[1];
        self.scratch[..payload_len].copy_from_slice(&frame[2..2 + payload_len]);
        transform(
            &mut self.scratch[..payload_len],
            &self.salt,
            &keystream,
            sequence,
        );

        trace!("client decrypt: opcode {opcode:#04x}, {payload_len} payload bytes");
        let mut out = Vec::with_capacity(1 + payload_len);
        out.push(opcode);
        out.extend_from_slice(&self.scratch[..payload_len]);
        Ok(out)
    }

    /// Decrypt a client->server frame and reject it unless its MD5 tag
    /// matches. Same output as [`decrypt_client_data`](Self::decrypt_client_data).
    pub fn decrypt_client_data_verified(
        &mut self,
        buf: &[u8],
        offset: usize,
        count: usize,
        use_keystream2: bool,
    ) -> Result<Vec<u8>> {
        let frame = check_frame_range(buf, offset, count)?;
        let fixed = CLIENT_FIXED_LEN + usize::from(use_keystream2);
        if frame.len() >= fixed {
            let tagged = frame.len() - 3 - HASH_TAG.len();
            let digest = md5::compute(&frame[..tagged]).0;
            for (i, tag) in HASH_TAG.into_iter().enumerate() {
                if frame[tagged + i] != digest[tag] {
                    return Err(Error::MalformedFrame("hash tag mismatch".into()));
                }
            }
        }
        self.decrypt_client_data(buf, offset, count, use_keystream2)
    }

    /// Encrypt a server->client packet: opcode, sequence, transformed
    /// payload, masked nonce footer. No hash, no sentinel.
    pub fn encrypt_server_data(
        &mut self,
        buf: &[u8],
        offset: usize,
        count: usize,
        sequence: u8,
        use_keystream2: bool,
    ) -> Result<Vec<u8>> {
        check_input_range(buf, offset, count)?;

        let opcode = buf[offset];
        let (a, b) = self.nonces.next_pair();
        let keystream = self.select_keystream(use_keystream2, a, b);

        let total = SERVER_FIXED_LEN + count;
        check_scratch_fit(offset, count, total, self.scratch.len())?;
        let frame = &mut self.scratch[..total];

        frame[0] = opcode;
        frame[1] = sequence;
        frame[2..2 + count].copy_from_slice(&buf[offset + 1..offset + 1 + count]);
        transform(&mut frame[2..2 + count], &self.salt, &keystream, sequence);

        let masked = a ^ SERVER_MASK_A;
        frame[2 + count] = masked as u8;
        frame[2 + count + 1] = b ^ SERVER_MASK_B;
        frame[2 + count + 2] = (masked >> 8) as u8;

        trace!("server encrypt: opcode {opcode:#04x}, {count} payload bytes, {total} on wire");
        Ok(self.scratch[..total].to_vec())
    }

    /// Decrypt a server->client frame, returning `[opcode, payload...]`.
    pub fn decrypt_server_data(
        &mut self,
        buf: &[u8],
        offset: usize,
        count: usize,
        use_keystream2: bool,
    ) -> Result<Vec<u8>> {
        let frame = check_frame_range(buf, offset, count)?;
        if frame.len() < SERVER_FIXED_LEN {
            return Err(Error::MalformedFrame(format!(
                "server frame of {} bytes shorter than fixed fields ({SERVER_FIXED_LEN})",
                frame.len()
            )));
        }

        let (a, b) = read_footer(frame, SERVER_MASK_A, SERVER_MASK_B);
        let keystream = self.select_keystream(use_keystream2, a, b);
        let payload_len = frame.len() - SERVER_FIXED_LEN;
        check_scratch_fit(offset, count, payload_len, self.scratch.len())?;

        let opcode = frame[0];
        let sequence = frame[1];
        self.scratch[..payload_len].copy_from_slice(&frame[2..2 + payload_len]);
        transform(
            &mut self.scratch[..payload_len],
            &self.salt,
            &keystream,
            sequence,
        );

        trace!("server decrypt: opcode {opcode:#04x}, {payload_len} payload bytes");
        let mut out = Vec::with_capacity(1 + payload_len);
        out.push(opcode);
        out.extend_from_slice(&self.scratch[..payload_len]);
        Ok(out)
    }

    fn select_keystream(&self, use_keystream2: bool, a: u16, b: u8) -> [u8; KEY_LEN] {
        if use_keystream2 {
            packet_keystream(&self.keystream2_table, a, b)
        } else {
            self.keystream1
        }
    }
}

/// Reject frames that would not fit the reusable scratch area.
fn check_scratch_fit(offset: usize, count: usize, total: usize, scratch_len: usize) -> Result<()> {
    if total > scratch_len {
        return Err(Error::InvalidRange {
            offset,
            count,
            len: scratch_len,
        });
    }
    Ok(())
}

/// The shared stream transform; running it twice with the same arguments
/// restores the input.
fn transform(buf: &mut [u8], salt: &[u8; SALT_LEN], keystream: &[u8; KEY_LEN], sequence: u8) {
    let seq_idx = usize::from(sequence);
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= salt[seq_idx];
        *byte ^= keystream[i % KEY_LEN];
        let salt_idx = (i / KEY_LEN) % SALT_LEN;
        if salt_idx != seq_idx {
            *byte ^= salt[salt_idx];
        }
    }
}

/// Validate opcode-plus-payload bounds for an encrypt call.
fn check_input_range(buf: &[u8], offset: usize, count: usize) -> Result<()> {
    let end = offset.checked_add(count).and_then(|v| v.checked_add(1));
    match end {
        Some(end) if end <= buf.len() => Ok(()),
        _ => Err(Error::InvalidRange {
            offset,
            count,
            len: buf.len(),
        }),
    }
}

/// Validate frame bounds for a decrypt call and return the frame slice.
fn check_frame_range(buf: &[u8], offset: usize, count: usize) -> Result<&[u8]> {
    match offset.checked_add(count) {
        Some(end) if end <= buf.len() => Ok(&buf[offset..end]),
        _ => Err(Error::InvalidRange {
            offset,
            count,
            len: buf.len(),
        }),
    }
}

/// Unmask the `(a, b)` nonces from a frame's trailing three bytes.
fn read_footer(frame: &[u8], mask_a: u16, mask_b: u8) -> (u16, u8) {
    let footer = &frame[frame.len() - 3..];
    let a = (u16::from(footer[0]) | u16::from(footer[2]) << 8) ^ mask_a;
    let b = footer[1] ^ mask_b;
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_is_an_involution() {
        let salt = salt_table(3);
        let keystream = default_keystream();
        let original: Vec<u8> = (0..100).collect();

        let mut data = original.clone();
        transform(&mut data, &salt, &keystream, 7);
        assert_ne!(data, original);
        transform(&mut data, &salt, &keystream, 7);
        assert_eq!(data, original);
    }

    #[test]
    fn transform_skips_salt_at_sequence_index() {
        // With sequence == 0 the first 9 positions land on salt index 0,
        // which must be skipped rather than applied a second time.
        let salt = salt_table(2); // salt[0] == 255
        let keystream = [0u8; KEY_LEN];
        let mut data = vec![0x55u8; 9];
        transform(&mut data, &salt, &keystream, 0);
        assert_eq!(data, vec![0x55 ^ 255; 9]);
    }

    #[test]
    fn encrypt_rejects_out_of_range() {
        let mut cipher = PacketCipher::default_keyed();
        let buf = [0u8; 4];
        assert!(matches!(
            cipher.encrypt_client_data(&buf, 0, 4, 0, false),
            Err(Error::InvalidRange { .. })
        ));
        assert!(matches!(
            cipher.encrypt_client_data(&buf, 4, 0, 0, false),
            Err(Error::InvalidRange { .. })
        ));
    }

    #[test]
    fn decrypt_rejects_out_of_range() {
        let mut cipher = PacketCipher::default_keyed();
        let buf = [0u8; 4];
        assert!(matches!(
            cipher.decrypt_client_data(&buf, 2, 3, false),
            Err(Error::InvalidRange { .. })
        ));
    }

    #[test]
    fn decrypt_rejects_frames_larger_than_scratch() {
        let mut cipher = PacketCipher::default_keyed();
        let buf = vec![0u8; SCRATCH_LEN + 100];
        assert!(matches!(
            cipher.decrypt_server_data(&buf, 0, buf.len(), false),
            Err(Error::InvalidRange { .. })
        ));
        assert!(matches!(
            cipher.decrypt_client_data(&buf, 0, buf.len(), false),
            Err(Error::InvalidRange { .. })
        ));
    }

    #[test]
    fn short_frame_is_malformed() {
        let mut cipher = PacketCipher::default_keyed();
        let buf = [0u8; 6];
        assert!(matches!(
            cipher.decrypt_client_data(&buf, 0, 6, false),
            Err(Error::MalformedFrame(_))
        ));
    }
}
