//! # Packet Processor
//!
//! Turns typed packets into wire frames and back, optionally sealing them
//! with ChaCha20-Poly1305 keyed per connection and direction.
//!
//! ## Wire Frames
//! ```text
//! unencrypted: [0x00] [ProtocolId(4)] [Type(1)] [Body(N)]
//! encrypted:   [0x80 | seq_len] [Sequence(seq_len)] [Ciphertext(M)] [Tag(16)]
//! ```
//! Encrypted frames use the packet sequence number, zero-extended to 64 bits,
//! as the AEAD nonce. The plaintext under the ciphertext is the serialized
//! packet without a prefix byte.
//!
//! ## Buffers
//! Two scratch buffers of `max_packet_size + MAX_PREFIX_BYTES + MAC_BYTES`
//! bytes are allocated once and reused by every call. Slices returned from
//! [`PacketProcessor::write_packet`] borrow the processor, so they cannot be
//! held across the next call. A processor is single-writer; use one per
//! connection and direction, or serialize access.
//!
//! ## Security
//! - Tampered, truncated and wrong-key ciphertexts all fail as `DecryptFailed`
//! - Packet types are checked against the whitelist of the channel they
//!   arrived on, after authentication
//! - Sequence numbers are not checked for monotonicity here; callers must
//!   never reuse one with the same key

use crate::config::ProcessorConfig;
use crate::core::packet::{self, PacketFactory, PacketTypeSet};
use crate::core::sequence::{
    compress_sequence, decompress_sequence, FramePrefix, MAX_PREFIX_BYTES,
};
use crate::error::ProcessorError;
use crate::utils::crypto::{self, Key, MAC_BYTES};
use crate::utils::metrics::global_metrics;
use tracing::{debug, trace};

/// A packet recovered from a wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPacket<P> {
    pub packet: P,
    /// Sequence number of an encrypted frame; 0 for unencrypted frames
    pub sequence: u64,
    pub encrypted: bool,
}

/// Which scratch buffer holds a finished frame
#[derive(Clone, Copy)]
enum Output {
    Packet,
    Scratch,
}

/// Round up to the next multiple of four
#[inline]
fn round_up_to_four(size: usize) -> usize {
    size.div_ceil(4) * 4
}

pub struct PacketProcessor<F: PacketFactory> {
    factory: F,
    protocol_id: u32,
    max_packet_size: usize,
    absolute_max_packet_size: usize,
    packet_buffer: Box<[u8]>,
    scratch_buffer: Box<[u8]>,
    last_error: Option<ProcessorError>,
}

impl<F: PacketFactory> PacketProcessor<F> {
    /// Create a processor. `max_packet_size` is rounded up to a multiple of 4.
    pub fn new(factory: F, protocol_id: u32, max_packet_size: usize) -> Self {
        let max_packet_size = round_up_to_four(max_packet_size);
        let absolute_max_packet_size = max_packet_size + MAX_PREFIX_BYTES + MAC_BYTES;

        debug!(
            protocol_id,
            max_packet_size, absolute_max_packet_size, "Packet processor created"
        );

        Self {
            factory,
            protocol_id,
            max_packet_size,
            absolute_max_packet_size,
            packet_buffer: vec![0u8; absolute_max_packet_size].into_boxed_slice(),
            scratch_buffer: vec![0u8; absolute_max_packet_size].into_boxed_slice(),
            last_error: None,
        }
    }

    pub fn from_config(factory: F, config: &ProcessorConfig) -> Self {
        Self::new(factory, config.protocol_id, config.max_packet_size)
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn protocol_id(&self) -> u32 {
        self.protocol_id
    }

    /// Largest serialized packet, before encryption
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Largest frame this processor will ever emit or accept
    pub fn absolute_max_packet_size(&self) -> usize {
        self.absolute_max_packet_size
    }

    /// Error from the most recent call, `None` if it succeeded
    pub fn last_error(&self) -> Option<ProcessorError> {
        self.last_error
    }

    /// Serialize `packet` into a wire frame.
    ///
    /// With `encrypt` set, the frame is sealed under `key` using `sequence` as
    /// nonce. Unencrypted frames ignore `sequence` and `key`.
    pub fn write_packet(
        &mut self,
        packet: &F::Packet,
        sequence: u64,
        encrypt: bool,
        key: Option<&Key>,
    ) -> Result<&[u8], ProcessorError> {
        self.last_error = None;

        let outcome = if encrypt {
            self.write_encrypted(packet, sequence, key)
        } else {
            self.write_unencrypted(packet)
        };

        match outcome {
            Ok((output, len)) => {
                debug_assert!(len <= self.absolute_max_packet_size);
                global_metrics().packet_written(len as u64, encrypt);
                Ok(match output {
                    Output::Packet => &self.packet_buffer[..len],
                    Output::Scratch => &self.scratch_buffer[..len],
                })
            }
            Err(err) => {
                self.last_error = Some(err);
                global_metrics().write_failed(err);
                Err(err)
            }
        }
    }

    fn write_encrypted(
        &mut self,
        packet: &F::Packet,
        sequence: u64,
        key: Option<&Key>,
    ) -> Result<(Output, usize), ProcessorError> {
        let key = key.ok_or(ProcessorError::KeyIsNull)?;

        let compressed = compress_sequence(sequence);
        let prefix = FramePrefix::encrypted(&compressed);
        let prefix_bytes = prefix.len();
        self.scratch_buffer[0] = prefix.to_byte();
        self.scratch_buffer[1..prefix_bytes].copy_from_slice(compressed.as_bytes());

        let packet_bytes = packet::write_packet(
            &self.factory,
            packet,
            self.protocol_id,
            &mut self.packet_buffer[..self.max_packet_size],
            0,
        )
        .map_err(|e| {
            debug!(error = %e, "Failed to serialize packet for encryption");
            ProcessorError::WritePacketFailed
        })?;

        let encrypted_bytes = crypto::encrypt(
            &self.packet_buffer[..packet_bytes],
            &mut self.scratch_buffer[prefix_bytes..],
            sequence,
            key,
        )
        .map_err(|_| ProcessorError::EncryptFailed)?;

        trace!(sequence, packet_bytes, encrypted_bytes, "Encrypted packet");
        Ok((Output::Scratch, prefix_bytes + encrypted_bytes))
    }

    fn write_unencrypted(&mut self, packet: &F::Packet) -> Result<(Output, usize), ProcessorError> {
        let packet_bytes = packet::write_packet(
            &self.factory,
            packet,
            self.protocol_id,
            &mut self.packet_buffer[..self.max_packet_size],
            1,
        )
        .map_err(|e| {
            debug!(error = %e, "Failed to serialize packet");
            ProcessorError::WritePacketFailed
        })?;

        self.packet_buffer[0] = FramePrefix::UNENCRYPTED.to_byte();
        Ok((Output::Packet, packet_bytes))
    }

    /// Parse a wire frame.
    ///
    /// Encrypted frames are opened with `key` and must carry a type in
    /// `encrypted_types`; unencrypted frames must carry a type in
    /// `unencrypted_types`.
    pub fn read_packet(
        &mut self,
        data: &[u8],
        key: Option<&Key>,
        encrypted_types: &PacketTypeSet,
        unencrypted_types: &PacketTypeSet,
    ) -> Result<ReadPacket<F::Packet>, ProcessorError> {
        self.last_error = None;

        let outcome = match data.first() {
            None => Err(ProcessorError::PacketTooSmall),
            Some(&byte) if byte & 0x80 != 0 => self.read_encrypted(data, key, encrypted_types),
            Some(_) => self.read_unencrypted(data, unencrypted_types),
        };

        match &outcome {
            Ok(read) => global_metrics().packet_read(data.len() as u64, read.encrypted),
            Err(err) => {
                self.last_error = Some(*err);
                global_metrics().read_failed(*err);
                trace!(error = %err, len = data.len(), "Dropped packet");
            }
        }
        outcome
    }

    fn read_encrypted(
        &mut self,
        data: &[u8],
        key: Option<&Key>,
        allowed: &PacketTypeSet,
    ) -> Result<ReadPacket<F::Packet>, ProcessorError> {
        let key = key.ok_or(ProcessorError::KeyIsNull)?;

        // an impossible sequence length is indistinguishable from tampering
        let prefix = FramePrefix::from_byte(data[0]).ok_or(ProcessorError::DecryptFailed)?;
        let prefix_bytes = prefix.len();

        if data.len() <= prefix_bytes + MAC_BYTES {
            return Err(ProcessorError::PacketTooSmall);
        }
        if data.len() > self.absolute_max_packet_size {
            return Err(ProcessorError::DecryptFailed);
        }

        let sequence = decompress_sequence(prefix.sequence_bytes, &data[1..prefix_bytes]);

        let decrypted_bytes = crypto::decrypt(
            &data[prefix_bytes..],
            &mut self.scratch_buffer,
            sequence,
            key,
        )
        .map_err(|_| ProcessorError::DecryptFailed)?;

        let packet = packet::read_packet(
            &self.factory,
            self.protocol_id,
            &self.scratch_buffer[..decrypted_bytes],
            0,
            allowed,
        )
        .map_err(|e| {
            debug!(error = %e, sequence, "Rejected encrypted packet");
            ProcessorError::ReadPacketFailed
        })?;

        Ok(ReadPacket {
            packet,
            sequence,
            encrypted: true,
        })
    }

    fn read_unencrypted(
        &mut self,
        data: &[u8],
        allowed: &PacketTypeSet,
    ) -> Result<ReadPacket<F::Packet>, ProcessorError> {
        if data.len() > self.absolute_max_packet_size {
            return Err(ProcessorError::ReadPacketFailed);
        }

        let packet = packet::read_packet(&self.factory, self.protocol_id, data, 1, allowed)
            .map_err(|e| {
                debug!(error = %e, "Rejected unencrypted packet");
                ProcessorError::ReadPacketFailed
            })?;

        Ok(ReadPacket {
            packet,
            sequence: 0,
            encrypted: false,
        })
    }
}

impl<F: PacketFactory> std::fmt::Debug for PacketProcessor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketProcessor")
            .field("protocol_id", &self.protocol_id)
            .field("max_packet_size", &self.max_packet_size)
            .field("absolute_max_packet_size", &self.absolute_max_packet_size)
            .field("last_error", &self.last_error)
            .finish()
    }
}
