//! UDP endpoint that moves processor frames over a tokio socket.
//!
//! Sends choose the encrypted or unencrypted channel from an
//! [`EncryptionPolicy`]. Receives run every datagram through the processor
//! and, in [`PacketEndpoint::recv_packet`], silently drop anything it
//! rejects. Malformed or forged datagrams are routine on an open port and
//! never end the receive loop.

use crate::config::NetworkConfig;
use crate::core::packet::{PacketFactory, PacketTypeSet};
use crate::core::policy::EncryptionPolicy;
use crate::core::processor::{PacketProcessor, ReadPacket};
use crate::error::{ProtocolError, Result};
use crate::utils::crypto::Key;
use std::net::SocketAddr;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::{debug, info, instrument, trace};

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM_BYTES: usize = 65_507;

pub struct PacketEndpoint<F: PacketFactory> {
    socket: UdpSocket,
    processor: PacketProcessor<F>,
    policy: EncryptionPolicy,
    encrypted_types: PacketTypeSet,
    unencrypted_types: PacketTypeSet,
    recv_buffer: Box<[u8]>,
}

impl<F: PacketFactory> PacketEndpoint<F> {
    /// Bind a socket and pair it with `processor`
    #[instrument(skip(addr, processor, policy))]
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        processor: PacketProcessor<F>,
        policy: EncryptionPolicy,
    ) -> Result<Self> {
        if processor.absolute_max_packet_size() > MAX_DATAGRAM_BYTES {
            return Err(ProtocolError::TransportError(format!(
                "Frames of up to {} bytes do not fit a UDP datagram",
                processor.absolute_max_packet_size()
            )));
        }

        let socket = UdpSocket::bind(addr).await?;
        let local = socket.local_addr()?;
        info!(%local, encryption = policy.is_enabled(), "UDP endpoint bound");

        // One spare byte so oversized datagrams are seen as oversized
        let recv_buffer = vec![0u8; processor.absolute_max_packet_size() + 1].into_boxed_slice();

        Ok(Self {
            socket,
            processor,
            encrypted_types: policy.encrypted_types(),
            unencrypted_types: policy.unencrypted_types(),
            policy,
            recv_buffer,
        })
    }

    /// Bind to `transport.bind_address` with a processor built from `processor`.
    ///
    /// `policy` applies only while `transport.encryption_enabled` is set.
    pub async fn from_config(
        factory: F,
        policy: EncryptionPolicy,
        config: &NetworkConfig,
    ) -> Result<Self> {
        let policy = if config.transport.encryption_enabled {
            policy
        } else {
            EncryptionPolicy::disabled(factory.num_packet_types())
        };
        let processor = PacketProcessor::from_config(factory, &config.processor);
        Self::bind(config.transport.bind_address.as_str(), processor, policy).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn policy(&self) -> &EncryptionPolicy {
        &self.policy
    }

    pub fn processor(&self) -> &PacketProcessor<F> {
        &self.processor
    }

    /// Frame `packet` and send it to `to`.
    ///
    /// `key` is required when the policy encrypts this packet type.
    #[instrument(skip(self, packet, key), fields(to = %to))]
    pub async fn send_packet(
        &mut self,
        to: SocketAddr,
        packet: &F::Packet,
        sequence: u64,
        key: Option<&Key>,
    ) -> Result<usize> {
        let packet_type = self.processor.factory().packet_type(packet);
        let encrypt = self.policy.should_encrypt(packet_type);

        let frame = self.processor.write_packet(packet, sequence, encrypt, key)?;
        let sent = self.socket.send_to(frame, to).await?;
        trace!(packet_type, encrypt, sent, "Sent packet");
        Ok(sent)
    }

    /// Receive one datagram and parse it, surfacing processor errors.
    pub async fn recv_packet_once(
        &mut self,
        key: Option<&Key>,
    ) -> Result<(SocketAddr, ReadPacket<F::Packet>)> {
        self.recv_packet_once_with(|_| key.copied()).await
    }

    /// Like [`recv_packet_once`](Self::recv_packet_once) with the key chosen per sender
    pub async fn recv_packet_once_with<K>(
        &mut self,
        mut key_for: K,
    ) -> Result<(SocketAddr, ReadPacket<F::Packet>)>
    where
        K: FnMut(&SocketAddr) -> Option<Key>,
    {
        let (len, from) = self.socket.recv_from(&mut self.recv_buffer).await?;
        let key = key_for(&from);

        let read = self.processor.read_packet(
            &self.recv_buffer[..len],
            key.as_ref(),
            &self.encrypted_types,
            &self.unencrypted_types,
        )?;
        Ok((from, read))
    }

    /// Receive the next packet that parses, dropping rejected datagrams.
    pub async fn recv_packet(
        &mut self,
        key: Option<&Key>,
    ) -> Result<(SocketAddr, ReadPacket<F::Packet>)> {
        self.recv_packet_with(|_| key.copied()).await
    }

    /// Like [`recv_packet`](Self::recv_packet) with the key chosen per sender
    pub async fn recv_packet_with<K>(
        &mut self,
        mut key_for: K,
    ) -> Result<(SocketAddr, ReadPacket<F::Packet>)>
    where
        K: FnMut(&SocketAddr) -> Option<Key>,
    {
        loop {
            match self.recv_packet_once_with(&mut key_for).await {
                Ok(received) => return Ok(received),
                Err(ProtocolError::Processor(err)) => {
                    debug!(error = %err, "Dropped datagram");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<F: PacketFactory> std::fmt::Debug for PacketEndpoint<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketEndpoint")
            .field("local_addr", &self.socket.local_addr().ok())
            .field("policy", &self.policy)
            .field("processor", &self.processor)
            .finish()
    }
}
