//! # Matcher
//!
//! Issues connect tokens for authenticated client identities.
//!
//! The matcher owns the private token key and a strictly increasing nonce
//! counter. Each successful request produces a token sealed under
//! `(private_key, nonce)`; the counter advances only after a successful seal,
//! so a failed request never consumes a nonce.
//!
//! ## Nonce Durability
//! A matcher whose private key outlives the process must also persist its
//! counter, otherwise a restart repeats nonces under the same key. A
//! [`NonceStore`] leases nonces in blocks: before the counter reaches the
//! persisted high-water mark, a new mark `counter + reservation` is written.
//! After a restart the counter resumes at the last mark. A crash therefore
//! skips at most one block and never reuses one.
//!
//! ## Concurrency
//! [`Matcher`] is single-threaded. [`SharedMatcher`] serializes requests
//! behind a mutex so the read-increment of the nonce is atomic with respect
//! to other callers.

use crate::config::MatcherConfig;
use crate::error::{constants, ProtocolError, Result, TokenError};
use crate::protocol::token::{
    unix_timestamp, ConnectToken, CONNECT_TOKEN_BYTES, MAX_SERVERS_PER_CONNECT_TOKEN,
};
use crate::utils::crypto::{self, Key, NONCE_BYTES};
use crate::utils::metrics::{global_metrics, Timer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Clients a dedicated server accepts
pub const MAX_CLIENTS: usize = 64;

/// On-disk form of the nonce high-water mark
#[derive(Debug, Serialize, Deserialize)]
struct NonceRecord {
    next_nonce: u64,
}

/// TOML file that persists the issuer's nonce high-water mark.
#[derive(Debug, Clone)]
pub struct NonceStore {
    path: PathBuf,
    reservation: u64,
}

impl NonceStore {
    pub fn new<P: AsRef<Path>>(path: P, reservation: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            reservation: reservation.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reservation(&self) -> u64 {
        self.reservation
    }

    /// Persisted mark, or 0 when the file does not exist yet.
    pub fn load(&self) -> std::result::Result<u64, TokenError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(TokenError::NonceStore(format!(
                    "{}: {e}",
                    constants::ERR_NONCE_FILE_READ
                )))
            }
        };

        toml::from_str::<NonceRecord>(&contents)
            .map(|record| record.next_nonce)
            .map_err(|e| TokenError::NonceStore(format!("{}: {e}", constants::ERR_NONCE_FILE_PARSE)))
    }

    /// Write `mark` through a synced temporary file and rename it into place.
    ///
    /// The mark is on stable storage before this returns.
    pub fn save(&self, mark: u64) -> std::result::Result<(), TokenError> {
        let contents = toml::to_string(&NonceRecord { next_nonce: mark }).map_err(|e| {
            TokenError::NonceStore(format!("{}: {e}", constants::ERR_NONCE_FILE_WRITE))
        })?;

        let tmp = self.path.with_extension("tmp");
        write_synced(&tmp, contents.as_bytes())
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .and_then(|()| sync_parent_dir(&self.path))
            .map_err(|e| {
                TokenError::NonceStore(format!("{}: {e}", constants::ERR_NONCE_FILE_WRITE))
            })
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// The rename itself is only durable once the directory entry is flushed.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Private token key plus the nonce counter it is used with.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct IssuerState {
    private_key: Key,
    next_nonce: u64,
    reserved_until: u64,
    #[zeroize(skip)]
    store: Option<NonceStore>,
}

impl IssuerState {
    /// In-memory counter starting at 0.
    ///
    /// Only safe when `private_key` is never reused by another process.
    pub fn new(private_key: Key) -> Self {
        Self::with_next_nonce(private_key, 0)
    }

    /// In-memory counter starting at `next_nonce`
    pub fn with_next_nonce(private_key: Key, next_nonce: u64) -> Self {
        Self {
            private_key,
            next_nonce,
            reserved_until: u64::MAX,
            store: None,
        }
    }

    /// Counter resumed from, and leased through, `store`
    pub fn with_nonce_store(
        private_key: Key,
        store: NonceStore,
    ) -> std::result::Result<Self, TokenError> {
        let next_nonce = store.load()?;
        info!(path = %store.path().display(), next_nonce, "Resumed issuer nonce");
        Ok(Self {
            private_key,
            next_nonce,
            reserved_until: next_nonce,
            store: Some(store),
        })
    }

    /// Fresh random private key with an in-memory counter
    pub fn generate() -> std::result::Result<Self, TokenError> {
        let key = crypto::generate_key().map_err(|_| TokenError::KeyGeneration)?;
        Ok(Self::new(key))
    }

    pub fn private_key(&self) -> &Key {
        &self.private_key
    }

    /// Nonce the next successful issuance will use
    pub fn next_nonce(&self) -> u64 {
        self.next_nonce
    }

    fn ensure_reserved(&mut self) -> std::result::Result<(), TokenError> {
        if self.next_nonce < self.reserved_until {
            return Ok(());
        }
        let Some(store) = self.store.as_ref() else {
            return Ok(());
        };

        let mark = self.next_nonce.saturating_add(store.reservation());
        store.save(mark)?;
        debug!(mark, "Leased nonce block");
        self.reserved_until = mark;
        Ok(())
    }

    /// Seal `token` with the next nonce and advance the counter.
    pub fn seal(
        &mut self,
        token: &ConnectToken,
    ) -> std::result::Result<([u8; CONNECT_TOKEN_BYTES], [u8; NONCE_BYTES]), TokenError> {
        if self.next_nonce == u64::MAX {
            return Err(TokenError::NonceExhausted);
        }
        self.ensure_reserved()?;

        let nonce = self.next_nonce;
        let data = token.encrypt(nonce, &self.private_key)?;
        self.next_nonce += 1;

        Ok((data, nonce.to_le_bytes()))
    }
}

impl fmt::Debug for IssuerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuerState")
            .field("next_nonce", &self.next_nonce)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// A dedicated server and the clients it currently hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherServerData {
    server_address: SocketAddr,
    connected_clients: Vec<u64>,
}

impl MatcherServerData {
    pub fn new(server_address: SocketAddr) -> Self {
        Self {
            server_address,
            connected_clients: Vec::new(),
        }
    }

    pub fn server_address(&self) -> SocketAddr {
        self.server_address
    }

    pub fn connected_clients(&self) -> &[u64] {
        &self.connected_clients
    }

    pub fn num_connected_clients(&self) -> usize {
        self.connected_clients.len()
    }

    pub fn is_full(&self) -> bool {
        self.connected_clients.len() >= MAX_CLIENTS
    }

    pub fn has_client(&self, client_id: u64) -> bool {
        self.connected_clients.contains(&client_id)
    }

    /// Returns false if full or already connected
    pub fn add_client(&mut self, client_id: u64) -> bool {
        if self.is_full() || self.has_client(client_id) {
            return false;
        }
        self.connected_clients.push(client_id);
        true
    }

    pub fn remove_client(&mut self, client_id: u64) -> bool {
        match self.connected_clients.iter().position(|&id| id == client_id) {
            Some(index) => {
                self.connected_clients.swap_remove(index);
                true
            }
            None => false,
        }
    }
}

/// Known dedicated servers, ordered by address.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: BTreeMap<SocketAddr, MatcherServerData>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the server was already registered
    pub fn register(&mut self, server_address: SocketAddr) -> bool {
        if self.servers.contains_key(&server_address) {
            return false;
        }
        self.servers
            .insert(server_address, MatcherServerData::new(server_address));
        info!(%server_address, "Registered dedicated server");
        true
    }

    pub fn remove(&mut self, server_address: &SocketAddr) -> Option<MatcherServerData> {
        let removed = self.servers.remove(server_address);
        if removed.is_some() {
            info!(%server_address, "Removed dedicated server");
        }
        removed
    }

    pub fn get(&self, server_address: &SocketAddr) -> Option<&MatcherServerData> {
        self.servers.get(server_address)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatcherServerData> {
        self.servers.values()
    }

    /// Record a client joining `server_address`
    pub fn client_connected(&mut self, server_address: &SocketAddr, client_id: u64) -> bool {
        self.servers
            .get_mut(server_address)
            .is_some_and(|server| server.add_client(client_id))
    }

    /// Record a client leaving `server_address`
    pub fn client_disconnected(&mut self, server_address: &SocketAddr, client_id: u64) -> bool {
        self.servers
            .get_mut(server_address)
            .is_some_and(|server| server.remove_client(client_id))
    }

    /// Up to `limit` servers, rotated by `start`, servers with room first.
    pub fn select(&self, start: usize, limit: usize) -> Vec<SocketAddr> {
        let count = self.servers.len();
        if count == 0 || limit == 0 {
            return Vec::new();
        }

        let ordered: Vec<&MatcherServerData> = self.servers.values().collect();
        let ordered = &ordered;
        let offset = start % count;
        let rotated = move || (0..count).map(move |i| ordered[(offset + i) % count]);

        rotated()
            .filter(|server| !server.is_full())
            .chain(rotated().filter(|server| server.is_full()))
            .map(MatcherServerData::server_address)
            .take(limit)
            .collect()
    }
}

/// What the client receives, out of band, for one match request.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MatchResponse {
    pub connect_token_data: [u8; CONNECT_TOKEN_BYTES],
    pub connect_token_nonce: [u8; NONCE_BYTES],
    pub client_to_server_key: Key,
    pub server_to_client_key: Key,
    #[zeroize(skip)]
    pub server_addresses: Vec<SocketAddr>,
    pub expire_timestamp: u64,
}

impl fmt::Debug for MatchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchResponse")
            .field("connect_token_nonce", &u64::from_le_bytes(self.connect_token_nonce))
            .field("server_addresses", &self.server_addresses)
            .field("expire_timestamp", &self.expire_timestamp)
            .finish_non_exhaustive()
    }
}

/// Connect token issuer.
#[derive(Debug)]
pub struct Matcher {
    issuer: IssuerState,
    registry: ServerRegistry,
    protocol_id: u32,
    token_expiry: Duration,
    max_servers_per_token: usize,
    cursor: usize,
}

impl Matcher {
    pub fn new(issuer: IssuerState, protocol_id: u32) -> Self {
        Self {
            issuer,
            registry: ServerRegistry::new(),
            protocol_id,
            token_expiry: Duration::from_secs(30),
            max_servers_per_token: 1,
            cursor: 0,
        }
    }

    /// Build from configuration, opening the nonce file if one is set
    pub fn from_config(
        private_key: Key,
        protocol_id: u32,
        config: &MatcherConfig,
    ) -> Result<Self> {
        let issuer = match config.nonce_file.as_deref() {
            Some(path) => IssuerState::with_nonce_store(
                private_key,
                NonceStore::new(path, config.nonce_reservation),
            )?,
            None => {
                warn!("Matcher nonce counter is not persisted");
                IssuerState::new(private_key)
            }
        };

        let mut matcher = Self::new(issuer, protocol_id)
            .with_token_expiry(config.token_expiry)
            .with_max_servers_per_token(config.max_servers_per_token);

        for address in config.parsed_server_addresses()? {
            matcher.registry.register(address);
        }
        if matcher.registry.is_empty() {
            return Err(ProtocolError::ConfigError(
                "Matcher needs at least one server address".into(),
            ));
        }

        Ok(matcher)
    }

    pub fn with_token_expiry(mut self, token_expiry: Duration) -> Self {
        self.token_expiry = token_expiry;
        self
    }

    /// Clamped to `1..=MAX_SERVERS_PER_CONNECT_TOKEN`
    pub fn with_max_servers_per_token(mut self, max_servers: usize) -> Self {
        self.max_servers_per_token = max_servers.clamp(1, MAX_SERVERS_PER_CONNECT_TOKEN);
        self
    }

    pub fn protocol_id(&self) -> u32 {
        self.protocol_id
    }

    pub fn issuer(&self) -> &IssuerState {
        &self.issuer
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ServerRegistry {
        &mut self.registry
    }

    /// Issue a connect token for `client_id`.
    ///
    /// The client id must be nonzero and at least one server registered.
    #[instrument(skip(self), fields(protocol_id = self.protocol_id))]
    pub fn request_match(&mut self, client_id: u64) -> std::result::Result<MatchResponse, TokenError> {
        let _timer = Timer::start("request_match");
        match self.issue(client_id) {
            Ok(response) => {
                global_metrics().token_issued();
                debug!(
                    nonce = u64::from_le_bytes(response.connect_token_nonce),
                    servers = response.server_addresses.len(),
                    "Issued connect token"
                );
                Ok(response)
            }
            Err(e) => {
                global_metrics().token_failed();
                warn!(error = %e, "Connect token request refused");
                Err(e)
            }
        }
    }

    fn issue(&mut self, client_id: u64) -> std::result::Result<MatchResponse, TokenError> {
        if client_id == 0 {
            return Err(TokenError::InvalidClientId);
        }

        let server_addresses = self
            .registry
            .select(self.cursor, self.max_servers_per_token);
        if server_addresses.is_empty() {
            return Err(TokenError::NoServers);
        }

        let expire_timestamp = unix_timestamp()?.saturating_add(self.token_expiry.as_secs());
        let token = ConnectToken::generate(
            client_id,
            self.protocol_id,
            &server_addresses,
            expire_timestamp,
        )?;

        let (connect_token_data, connect_token_nonce) = self.issuer.seal(&token)?;
        self.cursor = self.cursor.wrapping_add(1);

        Ok(MatchResponse {
            connect_token_data,
            connect_token_nonce,
            client_to_server_key: token.client_to_server_key,
            server_to_client_key: token.server_to_client_key,
            server_addresses,
            expire_timestamp,
        })
    }
}

/// Thread-safe handle to a [`Matcher`].
#[derive(Debug, Clone)]
pub struct SharedMatcher {
    inner: Arc<Mutex<Matcher>>,
}

impl SharedMatcher {
    pub fn new(matcher: Matcher) -> Self {
        Self {
            inner: Arc::new(Mutex::new(matcher)),
        }
    }

    pub fn request_match(&self, client_id: u64) -> std::result::Result<MatchResponse, TokenError> {
        self.with_matcher(|matcher| matcher.request_match(client_id))?
    }

    /// Run `f` with exclusive access to the matcher
    pub fn with_matcher<R>(
        &self,
        f: impl FnOnce(&mut Matcher) -> R,
    ) -> std::result::Result<R, TokenError> {
        let mut guard = self.inner.lock().map_err(|_| {
            warn!("{}", constants::ERR_LOCK_POISONED);
            TokenError::LockPoisoned
        })?;
        Ok(f(&mut guard))
    }
}
