//! # Body Serialization
//!
//! Bincode helpers for packet bodies and connect tokens.
//!
//! Everything on the hot path writes into fixed-capacity slices owned by the
//! caller, so overflow is an error rather than a reallocation. The encoding is
//! bincode's fixed-width little-endian form.
//!
//! ## Usage
//! ```rust
//! use secure_packet::core::serialization::{deserialize_from_slice, serialize_into_slice};
//!
//! let mut buffer = [0u8; 16];
//! let written = serialize_into_slice(&(7u32, 9u8), &mut buffer).unwrap();
//! assert_eq!(written, 5);
//!
//! let value: (u32, u8) = deserialize_from_slice(&buffer[..written]).unwrap();
//! assert_eq!(value, (7, 9));
//! ```

use crate::error::Result;
use bincode::Options;
use serde::{Deserialize, Serialize};

/// Upper bound on how many bytes a single decode may consume
const MAX_DECODE_BYTES: u64 = 64 * 1024;

#[inline]
fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

/// Serialize `value` into `out`, returning the number of bytes written.
///
/// Fails if the encoding does not fit; `out` may be partially written.
pub fn serialize_into_slice<T>(value: &T, out: &mut [u8]) -> Result<usize>
where
    T: Serialize + ?Sized,
{
    let capacity = out.len();
    let mut cursor: &mut [u8] = out;
    options().serialize_into(&mut cursor, value)?;
    Ok(capacity - cursor.len())
}

/// Deserialize a value that must occupy `data` exactly.
pub fn deserialize_from_slice<'a, T>(data: &'a [u8]) -> Result<T>
where
    T: Deserialize<'a>,
{
    Ok(options()
        .with_limit(MAX_DECODE_BYTES)
        .deserialize(data)?)
}

/// Deserialize a value from the front of a zero-padded block.
pub fn deserialize_padded<'a, T>(data: &'a [u8]) -> Result<T>
where
    T: Deserialize<'a>,
{
    Ok(options()
        .with_limit(MAX_DECODE_BYTES)
        .allow_trailing_bytes()
        .deserialize(data)?)
}

/// Encoded size of `value` without writing it
pub fn serialized_size<T>(value: &T) -> Result<usize>
where
    T: Serialize + ?Sized,
{
    Ok(options().serialized_size(value)? as usize)
}
