//! Serde adapters for the encodings used by the Engine API.
//!
//! Human-readable formats (JSON) get `0x`-prefixed hexadecimal strings.
//! Binary formats (`bincode`) get raw bytes or native integers.

pub mod prefixed_hex_bytes;
pub mod prefixed_hex_bytes_sequence;
pub mod prefixed_hex_quantity;

mod shared;
