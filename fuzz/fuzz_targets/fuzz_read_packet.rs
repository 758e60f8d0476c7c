#![no_main]

use libfuzzer_sys::fuzz_target;
use secure_packet::core::processor::PacketProcessor;
use secure_packet::protocol::message::ClientServerPacketFactory;

const KEY: [u8; 32] = [7u8; 32];

fuzz_target!(|data: &[u8]| {
    // Arbitrary datagrams must be rejected or parsed, never panic
    let factory = ClientServerPacketFactory;
    let mut processor = PacketProcessor::new(factory, 0x1234_1651, 1200);
    let _ = processor.read_packet(
        data,
        Some(&KEY),
        &factory.encrypted_packet_types(),
        &factory.unencrypted_packet_types(),
    );
    let _ = processor.read_packet(
        data,
        None,
        &factory.encrypted_packet_types(),
        &factory.unencrypted_packet_types(),
    );
});
