//! # Sequence Compression
//!
//! Encrypted frames carry their 64-bit sequence number in front of the
//! ciphertext, trimmed to the fewest bytes that represent it. Small,
//! slowly-incrementing sequences therefore cost one or two bytes.
//!
//! ## Prefix Byte
//! ```text
//!   bit 7      bits 0..6
//! [encrypted] [sequence byte count, 1..=8]
//! ```
//! The count is only meaningful when the encrypted bit is set. Compressed
//! bytes follow the prefix byte, least-significant first.

/// Largest number of bytes a compressed sequence can occupy
pub const MAX_SEQUENCE_BYTES: usize = 8;

/// Prefix byte plus the widest compressed sequence
pub const MAX_PREFIX_BYTES: usize = 1 + MAX_SEQUENCE_BYTES;

const ENCRYPTED_FLAG: u8 = 1 << 7;
const SEQUENCE_BYTES_MASK: u8 = !ENCRYPTED_FLAG;

/// A sequence number reduced to its significant low-order bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedSequence {
    len: u8,
    bytes: [u8; MAX_SEQUENCE_BYTES],
}

impl CompressedSequence {
    /// Length tag for the prefix byte. Never touches bit 7.
    #[inline]
    pub fn tag(&self) -> u8 {
        self.len
    }

    /// Number of compressed bytes (1..=8)
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false; even sequence 0 occupies one byte.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The compressed bytes, least-significant first
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Minimal number of bytes needed to hold `sequence` (at least one).
#[inline]
pub fn sequence_bytes(sequence: u64) -> usize {
    let significant_bits = 64 - sequence.leading_zeros() as usize;
    significant_bits.div_ceil(8).max(1)
}

/// Compress a sequence number to its minimal little-endian form.
pub fn compress_sequence(sequence: u64) -> CompressedSequence {
    let len = sequence_bytes(sequence);
    let mut bytes = [0u8; MAX_SEQUENCE_BYTES];
    bytes[..len].copy_from_slice(&sequence.to_le_bytes()[..len]);
    CompressedSequence {
        len: len as u8,
        bytes,
    }
}

/// Expand compressed bytes back to 64 bits.
///
/// The byte count comes from the low bits of `tag`; the encrypted flag is
/// ignored. Callers validate the tag with [`FramePrefix::from_byte`] first;
/// bytes beyond the tagged count are not read.
pub fn decompress_sequence(tag: u8, bytes: &[u8]) -> u64 {
    let len = ((tag & SEQUENCE_BYTES_MASK) as usize)
        .min(MAX_SEQUENCE_BYTES)
        .min(bytes.len());
    let mut wide = [0u8; MAX_SEQUENCE_BYTES];
    wide[..len].copy_from_slice(&bytes[..len]);
    u64::from_le_bytes(wide)
}

/// Logical view of a frame's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePrefix {
    /// Whether the rest of the frame is AEAD ciphertext
    pub encrypted: bool,
    /// Compressed sequence byte count; zero on unencrypted frames
    pub sequence_bytes: u8,
}

impl FramePrefix {
    /// Prefix for an unencrypted frame
    pub const UNENCRYPTED: FramePrefix = FramePrefix {
        encrypted: false,
        sequence_bytes: 0,
    };

    /// Prefix for an encrypted frame carrying `sequence`
    pub fn encrypted(sequence: &CompressedSequence) -> Self {
        Self {
            encrypted: true,
            sequence_bytes: sequence.tag(),
        }
    }

    /// Pack into the on-wire byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        let flag = if self.encrypted { ENCRYPTED_FLAG } else { 0 };
        flag | (self.sequence_bytes & SEQUENCE_BYTES_MASK)
    }

    /// Unpack an on-wire byte.
    ///
    /// Returns `None` for an encrypted prefix whose sequence byte count is
    /// outside `1..=8`. Unencrypted prefixes ignore the count bits.
    pub fn from_byte(byte: u8) -> Option<Self> {
        if byte & ENCRYPTED_FLAG == 0 {
            return Some(Self::UNENCRYPTED);
        }
        let sequence_bytes = byte & SEQUENCE_BYTES_MASK;
        if sequence_bytes == 0 || sequence_bytes as usize > MAX_SEQUENCE_BYTES {
            return None;
        }
        Some(Self {
            encrypted: true,
            sequence_bytes,
        })
    }

    /// Bytes occupied by the prefix byte and the compressed sequence
    #[inline]
    pub fn len(self) -> usize {
        1 + self.sequence_bytes as usize
    }

    /// Always false; a prefix is at least one byte.
    #[inline]
    pub fn is_empty(self) -> bool {
        false
    }
}
