//! # Transport Layer
//!
//! Datagram transport for processor frames.
//!
//! ## Components
//! - **UDP**: tokio `UdpSocket` endpoint that sends by encryption policy and
//!   drops datagrams the processor rejects
//!
//! Frames are self-delimiting datagrams; no stream framing is involved.

pub mod udp;

pub use udp::PacketEndpoint;
