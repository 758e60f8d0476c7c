//! # Core Packet Components
//!
//! Frame layout, sequence compression, and the packet processor.
//!
//! This module provides the foundation of the crate: turning application
//! packets into authenticated datagram frames and back.
//!
//! ## Components
//! - **Sequence**: Minimal little-endian sequence encoding and the frame prefix byte
//! - **Packet**: Packet factory capability, type whitelists, and header layout
//! - **Policy**: Per-type encryption selection
//! - **Processor**: Frame writer/reader with AEAD sealing
//! - **Serialization**: Bounded bincode helpers for packet bodies and tokens
//!
//! ## Wire Format
//! ```text
//! unencrypted: [0x00] [ProtocolId(4)] [Type(1)] [Body(N)]
//! encrypted:   [0x80 | n] [Sequence(n)] [Ciphertext(ProtocolId, Type, Body)] [Tag(16)]
//! ```
//!
//! ## Security
//! - Altering the prefix or sequence of an encrypted frame changes its nonce and fails authentication
//! - Frame length is checked against the configured maximum before decryption
//! - Per-channel type whitelists reject packets arriving on the wrong channel

pub mod packet;
pub mod policy;
pub mod processor;
pub mod sequence;
pub mod serialization;
