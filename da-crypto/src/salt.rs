//! Seed-parameterized salt table generation.
//!
//! Every connection carries a seed in 0..10 selecting one of ten formulas;
//! the 256-byte table it produces is mixed into every transform. Changing
//! the seed mid-session regenerates the table.

/// Number of distinct salt formulas; seeds are reduced modulo this.
pub const SEED_COUNT: u8 = 10;

/// Length of a salt table.
pub const SALT_LEN: usize = 256;

/// Generate the salt table for `seed`.
///
/// Formula values are computed in signed arithmetic and stored as their low
/// byte, matching the client's truncating casts.
pub fn salt_table(seed: u8) -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    for (index, slot) in salt.iter_mut().enumerate() {
        let i = index as i32;
        let sign = if i % 2 == 1 { -1 } else { 1 };
        let value: i32 = match seed % SEED_COUNT {
            0 => i,
            1 => sign * ((i + 1) / 2) + 128,
            2 => 255 - i,
            3 => sign * ((255 - i) / 2) + 128,
            4 => (i / 16) * (i / 16),
            5 => (2 * i) % 256,
            6 => 255 - (2 * i) % 256,
            7 => {
                if i > 127 {
                    2 * i - 256
                } else {
                    255 - 2 * i
                }
            }
            8 => {
                if i > 127 {
                    511 - 2 * i
                } else {
                    2 * i
                }
            }
            9 => 255 - ((i - 128) / 8).pow(2) % 256,
            _ => unreachable!("seed reduced modulo SEED_COUNT"),
        };
        *slot = value as u8;
    }
    salt
}
