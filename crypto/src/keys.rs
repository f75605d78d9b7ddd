//! Deterministic Ed25519 key derivation.

use ed25519_dalek::SigningKey;
use kestrel_types::{KeyPair, PrivateKey, PublicKey};

/// Derive the public key from a private key.
pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    let signing_key = SigningKey::from_bytes(&private.0);
    PublicKey(signing_key.verifying_key().to_bytes())
}

/// Derive a key pair from a 32-byte seed.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing_key = SigningKey::from_bytes(seed);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_derivation_is_deterministic() {
        let a = keypair_from_seed(&[3u8; 32]);
        let b = keypair_from_seed(&[3u8; 32]);
        assert_eq!(a.public, b.public);
        assert_ne!(a.public, keypair_from_seed(&[4u8; 32]).public);
    }

    #[test]
    fn public_from_private_matches_pair() {
        let kp = keypair_from_seed(&[9u8; 32]);
        assert_eq!(public_from_private(&kp.private), kp.public);
    }
}
