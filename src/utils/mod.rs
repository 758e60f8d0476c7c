//! # Utility Modules
//!
//! Supporting utilities for cryptography, logging, replay protection, and metrics.
//!
//! ## Components
//! - **Crypto**: ChaCha20-Poly1305 AEAD with 64-bit nonces
//! - **Logging**: Tracing subscriber setup from configuration
//! - **Replay Protection**: Sliding-window sequence tracking for sessions
//! - **Metrics**: Thread-safe observability counters
//!
//! ## Security
//! - Cryptographically secure RNG (getrandom)
//! - Memory zeroing for sensitive data (zeroize crate)

pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod replay_protection;

pub use replay_protection::ReplayProtection;
