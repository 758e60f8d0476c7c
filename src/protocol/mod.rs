//! # Protocol Layer
//!
//! Connect token issuance and the client/server packet set.
//!
//! ## Components
//! - **Token**: Connect token layout, sealing, and server-side validation
//! - **Matcher**: Token issuer with a durable nonce counter and server registry
//! - **Message**: Client/server packet types and their factory
//!
//! ## Flow
//! 1. An authenticated client asks the matcher for a match
//! 2. The matcher returns a sealed connect token plus two session keys
//! 3. The client sends the token to a listed server in an unencrypted `ConnectionRequest`
//! 4. Both sides seal every later packet with the session keys

pub mod matcher;
pub mod message;
pub mod token;
