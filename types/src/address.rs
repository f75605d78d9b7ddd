//! Wallet address type with `kst_` prefix.

use crate::error::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A Kestrel wallet address, always prefixed with `kst_`.
///
/// Derived from the wallet's public key via Blake2b hashing + base32 encoding
/// (see `kestrel_crypto::derive_address`). Never changes once set.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// The standard prefix for all Kestrel addresses.
    pub const PREFIX: &'static str = "kst_";

    /// Create a new address from a raw string.
    ///
    /// # Panics
    /// Panics if the string does not start with `kst_`.
    pub fn new(raw: impl Into<String>) -> Self {
        let s = raw.into();
        assert!(s.starts_with(Self::PREFIX), "address must start with kst_");
        Self(s)
    }

    /// Parse an address from untrusted input.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        let candidate = Self(raw.to_string());
        if candidate.is_valid() {
            Ok(candidate)
        } else {
            Err(TypeError::InvalidAddress(raw.to_string()))
        }
    }

    /// Return the raw address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate that this address is well-formed.
    pub fn is_valid(&self) -> bool {
        self.0.starts_with(Self::PREFIX) && self.0.len() > Self::PREFIX.len()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
