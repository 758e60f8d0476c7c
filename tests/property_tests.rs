//! Property-based tests using proptest
//!
//! These tests validate processor invariants across randomly generated
//! payloads, sequence numbers, and corruptions.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use secure_packet::core::processor::PacketProcessor;
use secure_packet::core::sequence::{compress_sequence, decompress_sequence, FramePrefix};
use secure_packet::error::ProcessorError;
use secure_packet::protocol::message::{ClientServerPacket, ClientServerPacketFactory};
use secure_packet::utils::crypto::Key;

const PROTOCOL_ID: u32 = 0x1234_1651;
const MAX_PACKET_SIZE: usize = 1200;

fn processor() -> PacketProcessor<ClientServerPacketFactory> {
    PacketProcessor::new(ClientServerPacketFactory, PROTOCOL_ID, MAX_PACKET_SIZE)
}

fn read(
    p: &mut PacketProcessor<ClientServerPacketFactory>,
    frame: &[u8],
    key: &Key,
) -> Result<(ClientServerPacket, u64), ProcessorError> {
    let factory = ClientServerPacketFactory;
    p.read_packet(
        frame,
        Some(key),
        &factory.encrypted_packet_types(),
        &factory.unencrypted_packet_types(),
    )
    .map(|read| (read.packet, read.sequence))
}

// Property: compressed sequences use the fewest bytes and decode losslessly
proptest! {
    #[test]
    fn prop_sequence_compression_minimal(sequence in any::<u64>()) {
        let compressed = compress_sequence(sequence);
        let expected_len = (64 - sequence.leading_zeros() as usize).div_ceil(8);
        prop_assert_eq!(compressed.len(), expected_len.max(1));
        prop_assert_eq!(decompress_sequence(compressed.tag(), compressed.as_bytes()), sequence);

        let prefix = FramePrefix::encrypted(&compressed);
        prop_assert_eq!(FramePrefix::from_byte(prefix.to_byte()), Some(prefix));
    }
}

// Property: sealed payloads open to the same packet and sequence
proptest! {
    #[test]
    fn prop_encrypted_payload_roundtrip(
        key in any::<[u8; 32]>(),
        sequence in any::<u64>(),
        data in prop::collection::vec(any::<u8>(), 0..1000),
    ) {
        let packet = ClientServerPacket::payload(data);
        let mut writer = processor();
        let frame = writer.write_packet(&packet, sequence, true, Some(&key)).unwrap().to_vec();
        prop_assert!(frame.len() <= writer.absolute_max_packet_size());

        let mut reader = processor();
        let (decoded, decoded_sequence) = read(&mut reader, &frame, &key).unwrap();
        prop_assert_eq!(decoded, packet);
        prop_assert_eq!(decoded_sequence, sequence);
    }
}

// Property: any single bit flip in a sealed frame is rejected
proptest! {
    #[test]
    fn prop_bit_flip_rejected(
        key in any::<[u8; 32]>(),
        sequence in any::<u64>(),
        data in prop::collection::vec(any::<u8>(), 1..200),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut writer = processor();
        let mut frame = writer
            .write_packet(&ClientServerPacket::payload(data), sequence, true, Some(&key))
            .unwrap()
            .to_vec();

        let index = position.index(frame.len());
        frame[index] ^= 1 << bit;

        let mut reader = processor();
        let result = read(&mut reader, &frame, &key);
        prop_assert!(result.is_err());
        if index > 0 {
            prop_assert_eq!(result.unwrap_err(), ProcessorError::DecryptFailed);
        }
    }
}

// Property: arbitrary input never panics and never authenticates
proptest! {
    #[test]
    fn prop_arbitrary_encrypted_input_rejected(
        key in any::<[u8; 32]>(),
        mut data in prop::collection::vec(any::<u8>(), 0..1500),
    ) {
        if let Some(first) = data.first_mut() {
            *first |= 0x80;
        }
        let mut reader = processor();
        prop_assert!(read(&mut reader, &data, &key).is_err());
        prop_assert!(reader.last_error().is_some());
    }
}

// Property: frames are deterministic for a given key and sequence
proptest! {
    #[test]
    fn prop_encryption_deterministic(
        key in any::<[u8; 32]>(),
        sequence in any::<u64>(),
        data in prop::collection::vec(any::<u8>(), 0..100),
    ) {
        let packet = ClientServerPacket::payload(data);
        let mut p = processor();
        let first = p.write_packet(&packet, sequence, true, Some(&key)).unwrap().to_vec();
        let second = p.write_packet(&packet, sequence, true, Some(&key)).unwrap().to_vec();
        prop_assert_eq!(first, second);
    }
}

// Property: connection requests travel in the clear and survive intact
proptest! {
    #[test]
    fn prop_connection_request_roundtrip(
        token in prop::collection::vec(any::<u8>(), 0..1024),
        nonce in any::<[u8; 8]>(),
    ) {
        let factory = ClientServerPacketFactory;
        let request = ClientServerPacket::connection_request(&token, nonce);

        let mut p = processor();
        let frame = p.write_packet(&request, 0, false, None).unwrap().to_vec();
        prop_assert_eq!(frame[0], 0x00);

        let read = p
            .read_packet(&frame, None, &factory.encrypted_packet_types(), &factory.unencrypted_packet_types())
            .unwrap();
        prop_assert_eq!(read.packet, request);
    }
}
