//! # Packet Framing
//!
//! The application supplies its packet set through [`PacketFactory`]; this
//! module turns a packet into bytes and back without knowing what the
//! packets are.
//!
//! ## Serialized Packet
//! ```text
//! [Prefix(0 or 1)] [ProtocolId(4, LE)] [PacketType(1)] [Body(N)]
//! ```
//! The prefix byte is reserved for the processor's frame prefix and left as
//! zero here. Packet types are small integers `0..num_packet_types`; which of
//! them a reader accepts is decided by a [`PacketTypeSet`].

use crate::error::{constants, ProtocolError, Result};
use std::sync::Arc;

/// Protocol id plus packet type
pub const PACKET_HEADER_BYTES: usize = 5;

/// Capability that maps packet types to wire bodies and back.
///
/// `deserialize_packet` is the constructor: it receives the packet type and
/// body and returns a fully built packet.
pub trait PacketFactory {
    /// The application's packet representation
    type Packet;

    /// Number of packet types; valid types are `0..num_packet_types()`
    fn num_packet_types(&self) -> usize;

    /// Type identifier of `packet`
    fn packet_type(&self, packet: &Self::Packet) -> u8;

    /// Write the body of `packet` into `out`, returning the bytes written
    fn serialize_packet(&self, packet: &Self::Packet, out: &mut [u8]) -> Result<usize>;

    /// Build a packet of `packet_type` from its body
    fn deserialize_packet(&self, packet_type: u8, body: &[u8]) -> Result<Self::Packet>;
}

impl<T: PacketFactory + ?Sized> PacketFactory for &T {
    type Packet = T::Packet;

    fn num_packet_types(&self) -> usize {
        (**self).num_packet_types()
    }

    fn packet_type(&self, packet: &Self::Packet) -> u8 {
        (**self).packet_type(packet)
    }

    fn serialize_packet(&self, packet: &Self::Packet, out: &mut [u8]) -> Result<usize> {
        (**self).serialize_packet(packet, out)
    }

    fn deserialize_packet(&self, packet_type: u8, body: &[u8]) -> Result<Self::Packet> {
        (**self).deserialize_packet(packet_type, body)
    }
}

impl<T: PacketFactory + ?Sized> PacketFactory for Arc<T> {
    type Packet = T::Packet;

    fn num_packet_types(&self) -> usize {
        (**self).num_packet_types()
    }

    fn packet_type(&self, packet: &Self::Packet) -> u8 {
        (**self).packet_type(packet)
    }

    fn serialize_packet(&self, packet: &Self::Packet, out: &mut [u8]) -> Result<usize> {
        (**self).serialize_packet(packet, out)
    }

    fn deserialize_packet(&self, packet_type: u8, body: &[u8]) -> Result<Self::Packet> {
        (**self).deserialize_packet(packet_type, body)
    }
}

/// Set of packet types allowed on a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PacketTypeSet {
    bits: [u64; 4],
}

impl PacketTypeSet {
    /// The empty set
    pub const fn empty() -> Self {
        Self { bits: [0; 4] }
    }

    /// Every type in `0..num_packet_types`
    pub fn all(num_packet_types: usize) -> Self {
        (0..num_packet_types.min(256)).map(|t| t as u8).collect()
    }

    /// Add a packet type
    pub fn insert(&mut self, packet_type: u8) {
        self.bits[(packet_type >> 6) as usize] |= 1 << (packet_type & 63);
    }

    /// Remove a packet type
    pub fn remove(&mut self, packet_type: u8) {
        self.bits[(packet_type >> 6) as usize] &= !(1 << (packet_type & 63));
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, packet_type: u8) -> Self {
        self.insert(packet_type);
        self
    }

    /// Builder form of [`remove`](Self::remove)
    pub fn without(mut self, packet_type: u8) -> Self {
        self.remove(packet_type);
        self
    }

    #[inline]
    pub fn contains(&self, packet_type: u8) -> bool {
        self.bits[(packet_type >> 6) as usize] & (1 << (packet_type & 63)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&word| word == 0)
    }

    pub fn len(&self) -> usize {
        self.bits.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Members in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(move |&t| self.contains(t))
    }
}

impl FromIterator<u8> for PacketTypeSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = Self::empty();
        for packet_type in iter {
            set.insert(packet_type);
        }
        set
    }
}

/// Serialize `packet` into `buffer` after `prefix_bytes` zeroed bytes.
///
/// Returns the total length including the prefix.
pub fn write_packet<F>(
    factory: &F,
    packet: &F::Packet,
    protocol_id: u32,
    buffer: &mut [u8],
    prefix_bytes: usize,
) -> Result<usize>
where
    F: PacketFactory + ?Sized,
{
    let packet_type = factory.packet_type(packet);
    if packet_type as usize >= factory.num_packet_types() {
        return Err(ProtocolError::UnknownPacketType(packet_type));
    }

    let header_end = prefix_bytes + PACKET_HEADER_BYTES;
    if buffer.len() < header_end {
        return Err(ProtocolError::PacketError(
            constants::ERR_PACKET_BUFFER_OVERFLOW.into(),
        ));
    }

    buffer[..prefix_bytes].fill(0);
    buffer[prefix_bytes..prefix_bytes + 4].copy_from_slice(&protocol_id.to_le_bytes());
    buffer[prefix_bytes + 4] = packet_type;

    let body_bytes = factory.serialize_packet(packet, &mut buffer[header_end..])?;
    Ok(header_end + body_bytes)
}

/// Read a packet written by [`write_packet`], accepting only `allowed` types.
pub fn read_packet<F>(
    factory: &F,
    protocol_id: u32,
    data: &[u8],
    prefix_bytes: usize,
    allowed: &PacketTypeSet,
) -> Result<F::Packet>
where
    F: PacketFactory + ?Sized,
{
    let header_end = prefix_bytes + PACKET_HEADER_BYTES;
    if data.len() < header_end {
        return Err(ProtocolError::PacketError(
            constants::ERR_PACKET_HEADER_TRUNCATED.into(),
        ));
    }

    let mut id = [0u8; 4];
    id.copy_from_slice(&data[prefix_bytes..prefix_bytes + 4]);
    if u32::from_le_bytes(id) != protocol_id {
        return Err(ProtocolError::PacketError(
            constants::ERR_PROTOCOL_MISMATCH.into(),
        ));
    }

    let packet_type = data[prefix_bytes + 4];
    if packet_type as usize >= factory.num_packet_types() {
        return Err(ProtocolError::UnknownPacketType(packet_type));
    }
    if !allowed.contains(packet_type) {
        return Err(ProtocolError::PacketError(
            constants::ERR_PACKET_TYPE_NOT_ALLOWED.into(),
        ));
    }

    factory.deserialize_packet(packet_type, &data[header_end..])
}
