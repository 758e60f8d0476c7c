//! # Secure Packet
//!
//! Authenticated, optionally encrypted datagram packets for client/server
//! games and real-time services, plus the connect token machinery that
//! hands clients their session keys.
//!
//! ## Layers
//! - [`core`]: sequence compression, packet framing, and the [`PacketProcessor`]
//! - [`protocol`]: connect tokens, the [`Matcher`] that issues them, and the
//!   client/server packet set
//! - [`transport`]: a tokio UDP endpoint around a processor
//! - [`utils`]: AEAD primitives, replay protection, logging, and metrics
//!
//! ## Example
//! ```rust
//! use secure_packet::core::processor::PacketProcessor;
//! use secure_packet::protocol::message::{ClientServerPacket, ClientServerPacketFactory};
//! use secure_packet::utils::crypto::generate_key;
//!
//! let factory = ClientServerPacketFactory;
//! let key = generate_key().unwrap();
//! let mut sender = PacketProcessor::new(factory, 0x1234, 1024);
//! let mut receiver = PacketProcessor::new(factory, 0x1234, 1024);
//!
//! let packet = ClientServerPacket::payload(b"hi".to_vec());
//! let frame = sender.write_packet(&packet, 1, true, Some(&key)).unwrap().to_vec();
//!
//! let read = receiver
//!     .read_packet(
//!         &frame,
//!         Some(&key),
//!         &factory.encrypted_packet_types(),
//!         &factory.unencrypted_packet_types(),
//!     )
//!     .unwrap();
//! assert_eq!(read.packet, packet);
//! assert_eq!(read.sequence, 1);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::config::NetworkConfig;
pub use crate::core::packet::{PacketFactory, PacketTypeSet};
pub use crate::core::policy::EncryptionPolicy;
pub use crate::core::processor::{PacketProcessor, ReadPacket};
pub use crate::error::{ProcessorError, ProtocolError, Result, TokenError};
pub use crate::protocol::matcher::{Matcher, SharedMatcher};
pub use crate::protocol::token::ConnectToken;
