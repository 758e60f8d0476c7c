//! # Connect Tokens
//!
//! A connect token authorizes one client identity to join one of a short,
//! ordered list of dedicated servers. It carries two fresh session keys, one
//! per direction, which the client and server use to seal packets once the
//! connection is up.
//!
//! The plaintext token never crosses the network. The matcher encrypts it
//! under a private key shared only with the dedicated servers and hands the
//! client `(ciphertext, nonce)` together with the two session keys, out of
//! band.
//!
//! ## Plaintext Block
//! ```text
//! [ProtocolId(4)] [ClientId(8)] [ExpireTimestamp(8)]
//! [NumServers(8)] [ServerAddress..] [ClientToServerKey(32)] [ServerToClientKey(32)]
//! <zero pad to CONNECT_TOKEN_BYTES - MAC_BYTES>
//! ```
//! Each server address is tagged by family and keeps the IPv6 flow info and
//! scope id, so link-local servers survive the round trip:
//! ```text
//! V4: [Tag(4)=0] [Ip(4)] [Port(2)]
//! V6: [Tag(4)=1] [Ip(16)] [Port(2)] [FlowInfo(4)] [ScopeId(4)]
//! ```
//! Sealed, the block becomes exactly `CONNECT_TOKEN_BYTES` of ciphertext+tag.

use crate::core::serialization::{deserialize_padded, serialize_into_slice, serialized_size};
use crate::error::{constants, TokenError};
use crate::utils::crypto::{self, Key, MAC_BYTES, NONCE_BYTES};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of an encrypted connect token
pub const CONNECT_TOKEN_BYTES: usize = 1024;

/// Size of the zero-padded plaintext block
pub const CONNECT_TOKEN_PLAINTEXT_BYTES: usize = CONNECT_TOKEN_BYTES - MAC_BYTES;

/// Most servers a single token may list
pub const MAX_SERVERS_PER_CONNECT_TOKEN: usize = 8;

/// Seconds since the Unix epoch
pub fn unix_timestamp() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| {
            warn!("{}", constants::ERR_SYSTEM_TIME);
            TokenError::Clock
        })
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ConnectToken {
    pub protocol_id: u32,
    pub client_id: u64,
    /// Unix seconds after which servers refuse the token
    pub expire_timestamp: u64,
    /// Ordered; the first entry is the primary target
    #[zeroize(skip)]
    #[serde(with = "server_addresses_serde")]
    pub server_addresses: Vec<SocketAddr>,
    pub client_to_server_key: Key,
    pub server_to_client_key: Key,
}

impl ConnectToken {
    /// Build a token with two freshly generated session keys.
    pub fn generate(
        client_id: u64,
        protocol_id: u32,
        server_addresses: &[SocketAddr],
        expire_timestamp: u64,
    ) -> Result<Self, TokenError> {
        if client_id == 0 {
            return Err(TokenError::InvalidClientId);
        }
        check_server_count(server_addresses.len())?;

        let client_to_server_key =
            crypto::generate_key().map_err(|_| TokenError::KeyGeneration)?;
        let server_to_client_key =
            crypto::generate_key().map_err(|_| TokenError::KeyGeneration)?;

        Ok(Self {
            protocol_id,
            client_id,
            expire_timestamp,
            server_addresses: server_addresses.to_vec(),
            client_to_server_key,
            server_to_client_key,
        })
    }

    /// Serialize into the zero-padded plaintext block.
    pub fn write(&self, out: &mut [u8; CONNECT_TOKEN_PLAINTEXT_BYTES]) -> Result<(), TokenError> {
        let size = serialized_size(self).map_err(|_| TokenError::Malformed)?;
        if size > CONNECT_TOKEN_PLAINTEXT_BYTES {
            debug!(size, "Connect token does not fit its block");
            return Err(TokenError::Malformed);
        }

        out.fill(0);
        serialize_into_slice(self, out).map_err(|_| TokenError::Malformed)?;
        Ok(())
    }

    /// Parse a plaintext block.
    pub fn read(data: &[u8]) -> Result<Self, TokenError> {
        let token: ConnectToken = deserialize_padded(data).map_err(|_| TokenError::Malformed)?;
        check_server_count(token.server_addresses.len()).map_err(|_| TokenError::Malformed)?;
        if token.client_id == 0 {
            return Err(TokenError::Malformed);
        }
        Ok(token)
    }

    /// Seal the token under `key` with `nonce`.
    ///
    /// The caller owns nonce uniqueness for `key`.
    pub fn encrypt(&self, nonce: u64, key: &Key) -> Result<[u8; CONNECT_TOKEN_BYTES], TokenError> {
        let mut plaintext = [0u8; CONNECT_TOKEN_PLAINTEXT_BYTES];
        let mut sealed = [0u8; CONNECT_TOKEN_BYTES];

        let result = self
            .write(&mut plaintext)
            .and_then(|()| {
                crypto::encrypt(&plaintext, &mut sealed, nonce, key)
                    .map_err(|_| TokenError::EncryptFailed)
            });
        plaintext.zeroize();

        result.map(|_| sealed)
    }

    /// Open a sealed token received out of band.
    pub fn decrypt(
        data: &[u8],
        nonce: &[u8; NONCE_BYTES],
        key: &Key,
    ) -> Result<Self, TokenError> {
        if data.len() != CONNECT_TOKEN_BYTES {
            return Err(TokenError::DecryptFailed);
        }

        let mut plaintext = [0u8; CONNECT_TOKEN_PLAINTEXT_BYTES];
        let result = crypto::decrypt(data, &mut plaintext, u64::from_le_bytes(*nonce), key)
            .map_err(|_| TokenError::DecryptFailed)
            .and_then(|len| Self::read(&plaintext[..len]));
        plaintext.zeroize();

        result
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expire_timestamp
    }

    /// Server-side acceptance check for a decrypted token.
    pub fn validate(
        &self,
        protocol_id: u32,
        server_address: &SocketAddr,
        now: u64,
    ) -> Result<(), TokenError> {
        if self.protocol_id != protocol_id {
            return Err(TokenError::ProtocolMismatch);
        }
        if self.is_expired(now) {
            return Err(TokenError::Expired);
        }
        if !self.server_addresses.contains(server_address) {
            return Err(TokenError::ServerNotListed);
        }
        Ok(())
    }
}

/// Explicit address encoding; serde's own `SocketAddrV6` form drops the scope id.
#[derive(Serialize, Deserialize)]
enum WireAddress {
    V4 {
        ip: [u8; 4],
        port: u16,
    },
    V6 {
        ip: [u8; 16],
        port: u16,
        flowinfo: u32,
        scope_id: u32,
    },
}

impl From<&SocketAddr> for WireAddress {
    fn from(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => WireAddress::V4 {
                ip: v4.ip().octets(),
                port: v4.port(),
            },
            SocketAddr::V6(v6) => WireAddress::V6 {
                ip: v6.ip().octets(),
                port: v6.port(),
                flowinfo: v6.flowinfo(),
                scope_id: v6.scope_id(),
            },
        }
    }
}

impl From<WireAddress> for SocketAddr {
    fn from(wire: WireAddress) -> Self {
        match wire {
            WireAddress::V4 { ip, port } => SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(ip), port)),
            WireAddress::V6 {
                ip,
                port,
                flowinfo,
                scope_id,
            } => SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(ip), port, flowinfo, scope_id)),
        }
    }
}

mod server_addresses_serde {
    use super::WireAddress;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addresses: &[SocketAddr], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(addresses.iter().map(WireAddress::from))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<SocketAddr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = Vec::<WireAddress>::deserialize(deserializer)?;
        Ok(wire.into_iter().map(SocketAddr::from).collect())
    }
}

fn check_server_count(count: usize) -> Result<(), TokenError> {
    if count == 0 {
        return Err(TokenError::NoServers);
    }
    if count > MAX_SERVERS_PER_CONNECT_TOKEN {
        return Err(TokenError::TooManyServers(count));
    }
    Ok(())
}

impl fmt::Debug for ConnectToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectToken")
            .field("protocol_id", &self.protocol_id)
            .field("client_id", &self.client_id)
            .field("expire_timestamp", &self.expire_timestamp)
            .field("server_addresses", &self.server_addresses)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PROTOCOL_ID: u32 = 0x1234_1651;

    fn servers(n: usize) -> Vec<SocketAddr> {
        (0..n)
            .map(|i| format!("[::1]:{}", 50000 + i).parse().unwrap())
            .collect()
    }

    #[test]
    fn test_generate_rejects_zero_client_id() {
        assert_eq!(
            ConnectToken::generate(0, PROTOCOL_ID, &servers(1), 100).unwrap_err(),
            TokenError::InvalidClientId
        );
    }

    #[test]
    fn test_generate_bounds_server_list() {
        assert_eq!(
            ConnectToken::generate(1, PROTOCOL_ID, &[], 100).unwrap_err(),
            TokenError::NoServers
        );
        assert_eq!(
            ConnectToken::generate(1, PROTOCOL_ID, &servers(9), 100).unwrap_err(),
            TokenError::TooManyServers(9)
        );
    }

    #[test]
    fn test_keys_are_fresh_and_directional() {
        let a = ConnectToken::generate(1, PROTOCOL_ID, &servers(1), 100).unwrap();
        let b = ConnectToken::generate(1, PROTOCOL_ID, &servers(1), 100).unwrap();
        assert_ne!(a.client_to_server_key, a.server_to_client_key);
        assert_ne!(a.client_to_server_key, b.client_to_server_key);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip_with_max_servers() {
        let key = crypto::generate_key().unwrap();
        let mixed: Vec<SocketAddr> = servers(MAX_SERVERS_PER_CONNECT_TOKEN - 1)
            .into_iter()
            .chain(std::iter::once("10.0.0.1:40000".parse().unwrap()))
            .collect();
        let token = ConnectToken::generate(42, PROTOCOL_ID, &mixed, 1_000).unwrap();

        let sealed = token.encrypt(5, &key).unwrap();
        assert_eq!(sealed.len(), CONNECT_TOKEN_BYTES);

        let opened = ConnectToken::decrypt(&sealed, &5u64.to_le_bytes(), &key).unwrap();
        assert_eq!(opened, token);
    }

    #[test]
    fn test_scoped_ipv6_server_survives_roundtrip() {
        let key = crypto::generate_key().unwrap();
        let link_local = SocketAddr::V6(SocketAddrV6::new(
            "fe80::1".parse().unwrap(),
            50000,
            0x0012_3456,
            3,
        ));
        let token = ConnectToken::generate(1, 7, &[link_local], 1_000).unwrap();

        let sealed = token.encrypt(0, &key).unwrap();
        let opened = ConnectToken::decrypt(&sealed, &0u64.to_le_bytes(), &key).unwrap();

        assert_eq!(opened.server_addresses, vec![link_local]);
        assert_eq!(opened, token);
        assert!(opened.validate(7, &link_local, 0).is_ok());

        let unscoped: SocketAddr = "[fe80::1]:50000".parse().unwrap();
        assert_eq!(
            opened.validate(7, &unscoped, 0).unwrap_err(),
            TokenError::ServerNotListed
        );
    }

    #[test]
    fn test_decrypt_with_wrong_nonce_or_key_fails() {
        let key = crypto::generate_key().unwrap();
        let token = ConnectToken::generate(7, PROTOCOL_ID, &servers(1), 1_000).unwrap();
        let sealed = token.encrypt(1, &key).unwrap();

        assert_eq!(
            ConnectToken::decrypt(&sealed, &2u64.to_le_bytes(), &key).unwrap_err(),
            TokenError::DecryptFailed
        );
        let other = crypto::generate_key().unwrap();
        assert_eq!(
            ConnectToken::decrypt(&sealed, &1u64.to_le_bytes(), &other).unwrap_err(),
            TokenError::DecryptFailed
        );
        assert_eq!(
            ConnectToken::decrypt(&sealed[..100], &1u64.to_le_bytes(), &key).unwrap_err(),
            TokenError::DecryptFailed
        );
    }

    #[test]
    fn test_validate() {
        let list = servers(2);
        let token = ConnectToken::generate(3, PROTOCOL_ID, &list, 500).unwrap();

        assert!(token.validate(PROTOCOL_ID, &list[1], 499).is_ok());
        assert_eq!(
            token.validate(PROTOCOL_ID, &list[0], 500).unwrap_err(),
            TokenError::Expired
        );
        assert_eq!(
            token.validate(PROTOCOL_ID + 1, &list[0], 0).unwrap_err(),
            TokenError::ProtocolMismatch
        );
        let stranger: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert_eq!(
            token.validate(PROTOCOL_ID, &stranger, 0).unwrap_err(),
            TokenError::ServerNotListed
        );
    }

    #[test]
    fn test_debug_hides_keys() {
        let token = ConnectToken::generate(3, PROTOCOL_ID, &servers(1), 500).unwrap();
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("client_to_server_key"));
        assert!(rendered.contains("client_id: 3"));
    }

    #[test]
    fn test_read_rejects_garbage() {
        assert_eq!(
            ConnectToken::read(&[0xFF; 64]).unwrap_err(),
            TokenError::Malformed
        );
        assert_eq!(
            ConnectToken::read(&[0u8; CONNECT_TOKEN_PLAINTEXT_BYTES]).unwrap_err(),
            TokenError::Malformed
        );
    }
}
