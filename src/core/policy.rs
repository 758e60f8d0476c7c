//! Per-packet-type encryption policy.
//!
//! A policy decides, for each packet type, whether it travels encrypted or in
//! the clear, and derives the two reader whitelists from that single choice.
//! A type is never on both channels, so a packet that must be replayable
//! (a connection request) cannot be confused with one that must be sealed.

use crate::core::packet::{PacketFactory, PacketTypeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionPolicy {
    enabled: bool,
    all_types: PacketTypeSet,
    unencrypted: PacketTypeSet,
}

impl EncryptionPolicy {
    /// Every type travels encrypted.
    pub fn enabled(num_packet_types: usize) -> Self {
        Self {
            enabled: true,
            all_types: PacketTypeSet::all(num_packet_types),
            unencrypted: PacketTypeSet::empty(),
        }
    }

    /// Every type travels in the clear.
    pub fn disabled(num_packet_types: usize) -> Self {
        Self {
            enabled: false,
            all_types: PacketTypeSet::all(num_packet_types),
            unencrypted: PacketTypeSet::empty(),
        }
    }

    /// Encryption enabled for every type the factory knows.
    pub fn for_factory<F: PacketFactory + ?Sized>(factory: &F) -> Self {
        Self::enabled(factory.num_packet_types())
    }

    /// Send `packet_type` unencrypted even while encryption is enabled.
    pub fn disable_encryption_for(mut self, packet_type: u8) -> Self {
        self.unencrypted.insert(packet_type);
        self
    }

    /// Undo [`disable_encryption_for`](Self::disable_encryption_for).
    pub fn enable_encryption_for(mut self, packet_type: u8) -> Self {
        self.unencrypted.remove(packet_type);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a packet of this type is written encrypted
    pub fn should_encrypt(&self, packet_type: u8) -> bool {
        self.enabled && self.all_types.contains(packet_type) && !self.unencrypted.contains(packet_type)
    }

    /// Whitelist for the encrypted channel
    pub fn encrypted_types(&self) -> PacketTypeSet {
        if !self.enabled {
            return PacketTypeSet::empty();
        }
        self.all_types.iter().filter(|&t| !self.unencrypted.contains(t)).collect()
    }

    /// Whitelist for the unencrypted channel
    pub fn unencrypted_types(&self) -> PacketTypeSet {
        if !self.enabled {
            return self.all_types;
        }
        self.all_types.iter().filter(|&t| self.unencrypted.contains(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitelists_are_disjoint() {
        let policy = EncryptionPolicy::enabled(5).disable_encryption_for(0);

        let encrypted = policy.encrypted_types();
        let unencrypted = policy.unencrypted_types();

        assert_eq!(unencrypted.iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(encrypted.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert!(encrypted.iter().all(|t| !unencrypted.contains(t)));

        assert!(!policy.should_encrypt(0));
        assert!(policy.should_encrypt(3));
    }

    #[test]
    fn test_disabled_policy_sends_everything_clear() {
        let policy = EncryptionPolicy::disabled(3);
        assert!(!policy.is_enabled());
        assert!(policy.encrypted_types().is_empty());
        assert_eq!(policy.unencrypted_types().len(), 3);
        assert!(!policy.should_encrypt(1));
    }

    #[test]
    fn test_reenable_type() {
        let policy = EncryptionPolicy::enabled(2)
            .disable_encryption_for(1)
            .enable_encryption_for(1);
        assert!(policy.should_encrypt(1));
        assert!(policy.unencrypted_types().is_empty());
    }

    #[test]
    fn test_unknown_type_never_encrypted() {
        let policy = EncryptionPolicy::enabled(2);
        assert!(!policy.should_encrypt(9));
        assert!(!policy.encrypted_types().contains(9));
    }
}
