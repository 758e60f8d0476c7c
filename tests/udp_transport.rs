#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use secure_packet::core::policy::EncryptionPolicy;
use secure_packet::core::processor::PacketProcessor;
use secure_packet::error::{ProcessorError, ProtocolError};
use secure_packet::protocol::message::{ClientServerPacket, ClientServerPacketFactory};
use secure_packet::transport::PacketEndpoint;
use secure_packet::utils::crypto::generate_key;
use secure_packet::NetworkConfig;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const PROTOCOL_ID: u32 = 0x1234_1651;
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn endpoint() -> PacketEndpoint<ClientServerPacketFactory> {
    let factory = ClientServerPacketFactory;
    PacketEndpoint::bind(
        "127.0.0.1:0",
        PacketProcessor::new(factory, PROTOCOL_ID, 1200),
        factory.encryption_policy(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_policy_selects_channel_per_packet_type() {
    let key = generate_key().unwrap();
    let mut client = endpoint().await;
    let mut server = endpoint().await;
    let server_addr = server.local_addr().unwrap();
    let client_addr = client.local_addr().unwrap();

    let request = ClientServerPacket::connection_request(&[5u8; 64], [1; 8]);
    client.send_packet(server_addr, &request, 0, None).await.unwrap();

    let (from, read) = timeout(RECV_TIMEOUT, server.recv_packet(Some(&key)))
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(from, client_addr);
    assert!(!read.encrypted);
    assert_eq!(read.packet, request);

    let payload = ClientServerPacket::payload(b"state update".to_vec());
    client
        .send_packet(server_addr, &payload, 11, Some(&key))
        .await
        .unwrap();

    let (_, read) = timeout(RECV_TIMEOUT, server.recv_packet(Some(&key)))
        .await
        .expect("timed out")
        .unwrap();
    assert!(read.encrypted);
    assert_eq!(read.sequence, 11);
    assert_eq!(read.packet, payload);
}

#[tokio::test]
async fn test_encrypted_send_without_key_fails() {
    let mut client = endpoint().await;
    let server = endpoint().await;

    let err = client
        .send_packet(
            server.local_addr().unwrap(),
            &ClientServerPacket::payload(vec![1]),
            0,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Processor(ProcessorError::KeyIsNull)
    ));
}

#[tokio::test]
async fn test_receive_loop_drops_bad_datagrams() {
    let key = generate_key().unwrap();
    let mut client = endpoint().await;
    let mut server = endpoint().await;
    let server_addr = server.local_addr().unwrap();

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    raw.send_to(&[], server_addr).await.unwrap();
    raw.send_to(&[0x81; 40], server_addr).await.unwrap();
    raw.send_to(&[0x00, 1, 2, 3, 4, 5], server_addr).await.unwrap();

    let payload = ClientServerPacket::payload(b"survivor".to_vec());
    client
        .send_packet(server_addr, &payload, 3, Some(&key))
        .await
        .unwrap();

    let (_, read) = timeout(RECV_TIMEOUT, server.recv_packet(Some(&key)))
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(read.packet, payload);
}

#[tokio::test]
async fn test_recv_once_surfaces_processor_error() {
    let key = generate_key().unwrap();
    let mut server = endpoint().await;
    let server_addr = server.local_addr().unwrap();

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    raw.send_to(&[0x81; 40], server_addr).await.unwrap();

    let err = timeout(RECV_TIMEOUT, server.recv_packet_once(Some(&key)))
        .await
        .expect("timed out")
        .unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Processor(ProcessorError::DecryptFailed)
    ));
}

#[tokio::test]
async fn test_per_sender_keys() {
    let key_a = generate_key().unwrap();
    let key_b = generate_key().unwrap();
    let mut a = endpoint().await;
    let mut b = endpoint().await;
    let mut server = endpoint().await;
    let server_addr = server.local_addr().unwrap();
    let a_addr = a.local_addr().unwrap();

    let packet = ClientServerPacket::payload(vec![9]);
    a.send_packet(server_addr, &packet, 1, Some(&key_a)).await.unwrap();
    let (from, _) = timeout(
        RECV_TIMEOUT,
        server.recv_packet_with(|from| Some(if *from == a_addr { key_a } else { key_b })),
    )
    .await
    .expect("timed out")
    .unwrap();
    assert_eq!(from, a_addr);

    b.send_packet(server_addr, &packet, 1, Some(&key_b)).await.unwrap();
    let (from, _) = timeout(
        RECV_TIMEOUT,
        server.recv_packet_with(|from| Some(if *from == a_addr { key_a } else { key_b })),
    )
    .await
    .expect("timed out")
    .unwrap();
    assert_eq!(from, b.local_addr().unwrap());
}

#[tokio::test]
async fn test_from_config_with_encryption_disabled() {
    let config = NetworkConfig::default_with_overrides(|c| {
        c.transport.bind_address = "127.0.0.1:0".into();
        c.transport.encryption_enabled = false;
    });
    let factory = ClientServerPacketFactory;

    let mut sender = PacketEndpoint::from_config(factory, factory.encryption_policy(), &config)
        .await
        .unwrap();
    let mut receiver = PacketEndpoint::from_config(factory, EncryptionPolicy::disabled(7), &config)
        .await
        .unwrap();
    assert!(!sender.policy().is_enabled());

    let payload = ClientServerPacket::payload(b"clear".to_vec());
    sender
        .send_packet(receiver.local_addr().unwrap(), &payload, 0, None)
        .await
        .unwrap();

    let (_, read) = timeout(RECV_TIMEOUT, receiver.recv_packet(None))
        .await
        .expect("timed out")
        .unwrap();
    assert!(!read.encrypted);
    assert_eq!(read.packet, payload);
}

#[tokio::test]
async fn test_bind_rejects_frames_larger_than_a_datagram() {
    let factory = ClientServerPacketFactory;
    let result = PacketEndpoint::bind(
        "127.0.0.1:0",
        PacketProcessor::new(factory, PROTOCOL_ID, 65_535),
        factory.encryption_policy(),
    )
    .await;

    assert!(matches!(result, Err(ProtocolError::TransportError(_))));
}
