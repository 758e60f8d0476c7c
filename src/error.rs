//! # Error Types
//!
//! Error handling for the secure packet layer.
//!
//! Every operation returns a typed outcome; nothing in this crate panics or
//! retries on bad input. Two focused enums describe the two hot components
//! and [`ProtocolError`] wraps them for callers that want a single type.
//!
//! ## Error Categories
//! - **Processor Errors** ([`ProcessorError`]): framing, encryption and whitelist failures
//! - **Token Errors** ([`TokenError`]): connect token issuance and validation
//! - **I/O Errors**: socket and file failures at the crate's outer edges
//! - **Configuration Errors**: invalid or unreadable configuration
//!
//! `DecryptFailed` and `ReadPacketFailed` are routine under adversarial input.
//! Callers drop the offending datagram and carry on.
//!
//! ## Example Usage
//! ```rust
//! use secure_packet::error::{ProcessorError, ProtocolError, Result};
//!
//! fn classify(err: ProcessorError) -> Result<()> {
//!     match err {
//!         ProcessorError::DecryptFailed | ProcessorError::ReadPacketFailed => Ok(()),
//!         other => Err(ProtocolError::from(other)),
//!     }
//! }
//!
//! assert!(classify(ProcessorError::DecryptFailed).is_ok());
//! assert!(classify(ProcessorError::KeyIsNull).is_err());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Synchronization errors
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";

    /// Packet framing errors
    pub const ERR_PROTOCOL_MISMATCH: &str = "Packet protocol id does not match";
    pub const ERR_PACKET_TYPE_NOT_ALLOWED: &str = "Packet type not allowed on this channel";
    pub const ERR_PACKET_HEADER_TRUNCATED: &str = "Packet header truncated";
    pub const ERR_PACKET_BUFFER_OVERFLOW: &str = "Packet does not fit in buffer";

    /// Nonce persistence errors
    pub const ERR_NONCE_FILE_READ: &str = "Failed to read nonce file";
    pub const ERR_NONCE_FILE_WRITE: &str = "Failed to write nonce file";
    pub const ERR_NONCE_FILE_PARSE: &str = "Failed to parse nonce file";

    /// Time errors
    pub const ERR_SYSTEM_TIME: &str = "System time error: time went backwards";
}

/// Failure codes reported by the packet processor.
///
/// The processor has no "none" variant: a successful call is `Ok`, and
/// `PacketProcessor::last_error` returns `None` after it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorError {
    /// Encryption or decryption requested without a key
    #[error("Packet key is null")]
    KeyIsNull,

    /// Serialization overflowed the buffer or the packet type is unknown
    #[error("Write packet failed")]
    WritePacketFailed,

    /// The AEAD encryption step failed
    #[error("Encrypt failed")]
    EncryptFailed,

    /// The frame is too short to hold a prefix, sequence and tag
    #[error("Packet too small")]
    PacketTooSmall,

    /// Authentication failed: tampered, truncated or wrong-key ciphertext
    #[error("Decrypt failed")]
    DecryptFailed,

    /// Deserialization failed or the packet type is not whitelisted
    #[error("Read packet failed")]
    ReadPacketFailed,
}

/// Failures while issuing or validating connect tokens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid client id")]
    InvalidClientId,

    #[error("No server addresses available")]
    NoServers,

    #[error("Too many server addresses: {0}")]
    TooManyServers(usize),

    #[error("Key generation failed")]
    KeyGeneration,

    #[error("Connect token encryption failed")]
    EncryptFailed,

    #[error("Connect token decryption failed")]
    DecryptFailed,

    #[error("Malformed connect token")]
    Malformed,

    #[error("Connect token expired")]
    Expired,

    #[error("Connect token protocol id mismatch")]
    ProtocolMismatch,

    #[error("Server address not listed in connect token")]
    ServerNotListed,

    #[error("Issuer nonce counter exhausted")]
    NonceExhausted,

    #[error("Nonce store error: {0}")]
    NonceStore(String),

    #[error("Synchronization primitive poisoned")]
    LockPoisoned,

    #[error("System clock is before the Unix epoch")]
    Clock,
}

// ProtocolError is the primary error type for all crate operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Packet processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Connect token error: {0}")]
    Token(#[from] TokenError),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Unknown packet type: {0}")]
    UnknownPacketType(u8),

    #[error("Packet error: {0}")]
    PacketError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processor_error_wraps_into_protocol_error() {
        let err: ProtocolError = ProcessorError::DecryptFailed.into();
        assert!(matches!(
            err,
            ProtocolError::Processor(ProcessorError::DecryptFailed)
        ));
        assert_eq!(
            err.to_string(),
            "Packet processor error: Decrypt failed"
        );
    }

    #[test]
    fn test_token_error_display() {
        assert_eq!(
            TokenError::TooManyServers(40).to_string(),
            "Too many server addresses: 40"
        );
        let err: ProtocolError = TokenError::InvalidClientId.into();
        assert!(matches!(err, ProtocolError::Token(TokenError::InvalidClientId)));
    }
}
