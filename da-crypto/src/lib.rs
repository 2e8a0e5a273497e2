//! Packet encryption and decryption for the Dark Ages wire protocol.
//!
//! This crate provides:
//! - The per-connection [`PacketCipher`] for client and server datagrams
//! - Seed-parameterized salt table generation
//! - The session keystream and the per-packet keystream derived from a
//!   client name via iterated MD5
//!
//! The cipher is a wire-compatibility artifact, not a secure primitive.
//! Do not reuse it outside of talking to the game.

pub mod cipher;
pub mod error;
pub mod keystream;
pub mod salt;

pub use cipher::PacketCipher;
pub use error::{Error, Result};
