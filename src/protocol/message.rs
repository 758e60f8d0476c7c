//! # Client/Server Packets
//!
//! The packet set spoken between a client holding a connect token and a
//! dedicated server. Connection requests travel unencrypted (the server has
//! no session keys until it opens the token inside); everything else is
//! sealed with the keys the token carries.
//!
//! | Type | Packet | Channel |
//! |------|--------|---------|
//! | 0 | `ConnectionRequest` | unencrypted |
//! | 1 | `ConnectionDenied` | encrypted |
//! | 2 | `ConnectionChallenge` | encrypted |
//! | 3 | `ConnectionResponse` | encrypted |
//! | 4 | `ConnectionKeepAlive` | encrypted |
//! | 5 | `ConnectionDisconnect` | encrypted |
//! | 6 | `Payload` | encrypted |

use crate::core::packet::{PacketFactory, PacketTypeSet};
use crate::core::policy::EncryptionPolicy;
use crate::core::serialization::{deserialize_from_slice, serialize_into_slice};
use crate::error::{ProtocolError, Result};
use crate::protocol::token::CONNECT_TOKEN_BYTES;
use crate::utils::crypto::NONCE_BYTES;
use serde::{Deserialize, Serialize};

/// Bytes of opaque challenge token echoed between server and client
pub const CHALLENGE_TOKEN_BYTES: usize = 256;

/// Wire identifiers of the client/server packet types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    ConnectionRequest = 0,
    ConnectionDenied = 1,
    ConnectionChallenge = 2,
    ConnectionResponse = 3,
    ConnectionKeepAlive = 4,
    ConnectionDisconnect = 5,
    Payload = 6,
}

impl PacketType {
    pub const COUNT: usize = 7;

    pub fn name(self) -> &'static str {
        match self {
            PacketType::ConnectionRequest => "CONNECTION_REQUEST",
            PacketType::ConnectionDenied => "CONNECTION_DENIED",
            PacketType::ConnectionChallenge => "CONNECTION_CHALLENGE",
            PacketType::ConnectionResponse => "CONNECTION_RESPONSE",
            PacketType::ConnectionKeepAlive => "CONNECTION_KEEP_ALIVE",
            PacketType::ConnectionDisconnect => "CONNECTION_DISCONNECT",
            PacketType::Payload => "PAYLOAD",
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => PacketType::ConnectionRequest,
            1 => PacketType::ConnectionDenied,
            2 => PacketType::ConnectionChallenge,
            3 => PacketType::ConnectionResponse,
            4 => PacketType::ConnectionKeepAlive,
            5 => PacketType::ConnectionDisconnect,
            6 => PacketType::Payload,
            other => return Err(ProtocolError::UnknownPacketType(other)),
        })
    }
}

/// Sent by the client, in the clear, to present its connect token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequestPacket {
    pub connect_token_data: Vec<u8>,
    pub connect_token_nonce: [u8; NONCE_BYTES],
}

/// Server challenge; the client must echo the token back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengePacket {
    pub challenge_token_data: Vec<u8>,
    pub challenge_token_nonce: [u8; NONCE_BYTES],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAlivePacket {
    pub client_index: u32,
    pub max_clients: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadPacket {
    pub data: Vec<u8>,
}

/// A packet of the client/server protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientServerPacket {
    ConnectionRequest(ConnectionRequestPacket),
    ConnectionDenied,
    ConnectionChallenge(ChallengePacket),
    ConnectionResponse(ChallengePacket),
    ConnectionKeepAlive(KeepAlivePacket),
    ConnectionDisconnect,
    Payload(PayloadPacket),
}

impl ClientServerPacket {
    pub fn connection_request(
        connect_token_data: &[u8],
        connect_token_nonce: [u8; NONCE_BYTES],
    ) -> Self {
        ClientServerPacket::ConnectionRequest(ConnectionRequestPacket {
            connect_token_data: connect_token_data.to_vec(),
            connect_token_nonce,
        })
    }

    pub fn payload(data: Vec<u8>) -> Self {
        ClientServerPacket::Payload(PayloadPacket { data })
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            ClientServerPacket::ConnectionRequest(_) => PacketType::ConnectionRequest,
            ClientServerPacket::ConnectionDenied => PacketType::ConnectionDenied,
            ClientServerPacket::ConnectionChallenge(_) => PacketType::ConnectionChallenge,
            ClientServerPacket::ConnectionResponse(_) => PacketType::ConnectionResponse,
            ClientServerPacket::ConnectionKeepAlive(_) => PacketType::ConnectionKeepAlive,
            ClientServerPacket::ConnectionDisconnect => PacketType::ConnectionDisconnect,
            ClientServerPacket::Payload(_) => PacketType::Payload,
        }
    }
}

/// [`PacketFactory`] for [`ClientServerPacket`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientServerPacketFactory;

impl ClientServerPacketFactory {
    /// Encryption on, except for connection requests
    pub fn encryption_policy(&self) -> EncryptionPolicy {
        EncryptionPolicy::for_factory(self)
            .disable_encryption_for(PacketType::ConnectionRequest as u8)
    }

    pub fn encrypted_packet_types(&self) -> PacketTypeSet {
        self.encryption_policy().encrypted_types()
    }

    pub fn unencrypted_packet_types(&self) -> PacketTypeSet {
        self.encryption_policy().unencrypted_types()
    }
}

fn check_length(actual: usize, max: usize) -> Result<()> {
    if actual > max {
        return Err(ProtocolError::OversizedPacket(actual));
    }
    Ok(())
}

fn expect_empty(body: &[u8], packet_type: PacketType) -> Result<()> {
    if !body.is_empty() {
        return Err(ProtocolError::PacketError(format!(
            "{} carries no body",
            packet_type.name()
        )));
    }
    Ok(())
}

impl PacketFactory for ClientServerPacketFactory {
    type Packet = ClientServerPacket;

    fn num_packet_types(&self) -> usize {
        PacketType::COUNT
    }

    fn packet_type(&self, packet: &ClientServerPacket) -> u8 {
        packet.packet_type() as u8
    }

    fn serialize_packet(&self, packet: &ClientServerPacket, out: &mut [u8]) -> Result<usize> {
        match packet {
            ClientServerPacket::ConnectionRequest(request) => {
                check_length(request.connect_token_data.len(), CONNECT_TOKEN_BYTES)?;
                serialize_into_slice(request, out)
            }
            ClientServerPacket::ConnectionChallenge(challenge)
            | ClientServerPacket::ConnectionResponse(challenge) => {
                check_length(challenge.challenge_token_data.len(), CHALLENGE_TOKEN_BYTES)?;
                serialize_into_slice(challenge, out)
            }
            ClientServerPacket::ConnectionKeepAlive(keep_alive) => {
                serialize_into_slice(keep_alive, out)
            }
            ClientServerPacket::Payload(payload) => serialize_into_slice(payload, out),
            ClientServerPacket::ConnectionDenied | ClientServerPacket::ConnectionDisconnect => {
                Ok(0)
            }
        }
    }

    fn deserialize_packet(&self, packet_type: u8, body: &[u8]) -> Result<ClientServerPacket> {
        let packet = match PacketType::try_from(packet_type)? {
            PacketType::ConnectionRequest => {
                let request: ConnectionRequestPacket = deserialize_from_slice(body)?;
                check_length(request.connect_token_data.len(), CONNECT_TOKEN_BYTES)?;
                ClientServerPacket::ConnectionRequest(request)
            }
            PacketType::ConnectionChallenge => {
                let challenge: ChallengePacket = deserialize_from_slice(body)?;
                check_length(challenge.challenge_token_data.len(), CHALLENGE_TOKEN_BYTES)?;
                ClientServerPacket::ConnectionChallenge(challenge)
            }
            PacketType::ConnectionResponse => {
                let response: ChallengePacket = deserialize_from_slice(body)?;
                check_length(response.challenge_token_data.len(), CHALLENGE_TOKEN_BYTES)?;
                ClientServerPacket::ConnectionResponse(response)
            }
            PacketType::ConnectionKeepAlive => {
                ClientServerPacket::ConnectionKeepAlive(deserialize_from_slice(body)?)
            }
            PacketType::Payload => ClientServerPacket::Payload(deserialize_from_slice(body)?),
            PacketType::ConnectionDenied => {
                expect_empty(body, PacketType::ConnectionDenied)?;
                ClientServerPacket::ConnectionDenied
            }
            PacketType::ConnectionDisconnect => {
                expect_empty(body, PacketType::ConnectionDisconnect)?;
                ClientServerPacket::ConnectionDisconnect
            }
        };
        Ok(packet)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn all_packets() -> Vec<ClientServerPacket> {
        vec![
            ClientServerPacket::connection_request(&[5u8; CONNECT_TOKEN_BYTES], [1; NONCE_BYTES]),
            ClientServerPacket::ConnectionDenied,
            ClientServerPacket::ConnectionChallenge(ChallengePacket {
                challenge_token_data: vec![2; CHALLENGE_TOKEN_BYTES],
                challenge_token_nonce: [3; NONCE_BYTES],
            }),
            ClientServerPacket::ConnectionResponse(ChallengePacket {
                challenge_token_data: vec![4; 16],
                challenge_token_nonce: [5; NONCE_BYTES],
            }),
            ClientServerPacket::ConnectionKeepAlive(KeepAlivePacket {
                client_index: 3,
                max_clients: 64,
            }),
            ClientServerPacket::ConnectionDisconnect,
            ClientServerPacket::payload(b"state update".to_vec()),
        ]
    }

    #[test]
    fn test_factory_body_roundtrip() {
        let factory = ClientServerPacketFactory;
        let mut buffer = vec![0u8; 2048];

        for packet in all_packets() {
            let n = factory.serialize_packet(&packet, &mut buffer).unwrap();
            let packet_type = factory.packet_type(&packet);
            let decoded = factory.deserialize_packet(packet_type, &buffer[..n]).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn test_packet_type_ids_are_dense() {
        for (expected, packet) in all_packets().iter().enumerate() {
            assert_eq!(packet.packet_type() as usize, expected);
            assert_eq!(PacketType::try_from(expected as u8).unwrap(), packet.packet_type());
        }
        assert!(PacketType::try_from(PacketType::COUNT as u8).is_err());
    }

    #[test]
    fn test_default_whitelists() {
        let factory = ClientServerPacketFactory;
        let unencrypted = factory.unencrypted_packet_types();
        let encrypted = factory.encrypted_packet_types();

        assert!(unencrypted.contains(PacketType::ConnectionRequest as u8));
        assert_eq!(unencrypted.len(), 1);
        assert!(!encrypted.contains(PacketType::ConnectionRequest as u8));
        assert_eq!(encrypted.len(), PacketType::COUNT - 1);
    }

    #[test]
    fn test_oversized_token_rejected() {
        let factory = ClientServerPacketFactory;
        let mut buffer = vec![0u8; 4096];
        let packet =
            ClientServerPacket::connection_request(&[0u8; CONNECT_TOKEN_BYTES + 1], [0; NONCE_BYTES]);
        assert!(matches!(
            factory.serialize_packet(&packet, &mut buffer),
            Err(ProtocolError::OversizedPacket(_))
        ));
    }

    #[test]
    fn test_bodyless_packet_with_body_rejected() {
        let factory = ClientServerPacketFactory;
        assert!(factory
            .deserialize_packet(PacketType::ConnectionDenied as u8, &[1])
            .is_err());
    }
}
