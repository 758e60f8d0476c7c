use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use secure_packet::core::processor::PacketProcessor;
use secure_packet::protocol::matcher::{IssuerState, Matcher};
use secure_packet::protocol::message::{ClientServerPacket, ClientServerPacketFactory};
use secure_packet::utils::crypto::generate_key;
use std::hint::black_box;

const PROTOCOL_ID: u32 = 0x1234_1651;

#[allow(clippy::unwrap_used)]
fn bench_processor(c: &mut Criterion) {
    let mut group = c.benchmark_group("processor");
    let payload_sizes = [16usize, 256, 1024, 4000];
    let factory = ClientServerPacketFactory;
    let key = generate_key().unwrap();
    let encrypted = factory.encrypted_packet_types();
    let unencrypted = factory.unencrypted_packet_types();

    for &size in &payload_sizes {
        let packet = ClientServerPacket::payload(vec![0xAB; size]);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("write_encrypted_{size}b"), |b| {
            let mut processor = PacketProcessor::new(factory, PROTOCOL_ID, 4096);
            let mut sequence = 0u64;
            b.iter(|| {
                sequence += 1;
                let frame = processor
                    .write_packet(black_box(&packet), sequence, true, Some(&key))
                    .unwrap();
                black_box(frame.len());
            })
        });

        group.bench_function(format!("read_encrypted_{size}b"), |b| {
            let mut writer = PacketProcessor::new(factory, PROTOCOL_ID, 4096);
            let frame = writer
                .write_packet(&packet, 1, true, Some(&key))
                .unwrap()
                .to_vec();
            let mut reader = PacketProcessor::new(factory, PROTOCOL_ID, 4096);
            b.iter(|| {
                let read = reader
                    .read_packet(black_box(&frame), Some(&key), &encrypted, &unencrypted)
                    .unwrap();
                black_box(read.sequence);
            })
        });

        group.bench_function(format!("write_unencrypted_{size}b"), |b| {
            let mut processor = PacketProcessor::new(factory, PROTOCOL_ID, 4096);
            b.iter(|| {
                let frame = processor
                    .write_packet(black_box(&packet), 0, false, None)
                    .unwrap();
                black_box(frame.len());
            })
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_request_match(c: &mut Criterion) {
    let mut matcher = Matcher::new(IssuerState::generate().unwrap(), PROTOCOL_ID);
    matcher
        .registry_mut()
        .register("127.0.0.1:40000".parse().unwrap());

    let mut client_id = 0u64;
    c.bench_function("request_match", |b| {
        b.iter(|| {
            client_id += 1;
            black_box(matcher.request_match(client_id).unwrap());
        })
    });
}

criterion_group!(benches, bench_processor, bench_request_match);
criterion_main!(benches);
