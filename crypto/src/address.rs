//! Address derivation from public keys.
//!
//! Address format: `kst_` + base32(public_key ++ checksum)
//!
//! Checksum: first 5 bytes of Blake2b-256(public_key). The 37 input bytes
//! (296 bits) encode to 60 base32 characters, so every address is 64 long.

use kestrel_types::{Address, PublicKey};

const ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";
const CHECKSUM_LEN: usize = 5;
const ENCODED_LEN: usize = 60;

fn encode_base32(bytes: &[u8]) -> String {
    let bits = bytes.len() * 8;
    (0..bits.div_ceil(5))
        .map(|chunk| {
            let value = (0..5).fold(0usize, |acc, offset| {
                let bit = chunk * 5 + offset;
                let set = bit < bits && bytes[bit / 8] & (0x80 >> (bit % 8)) != 0;
                (acc << 1) | set as usize
            });
            ALPHABET[value] as char
        })
        .collect()
}

fn payload(public_key: &PublicKey) -> [u8; 32 + CHECKSUM_LEN] {
    let mut out = [0u8; 32 + CHECKSUM_LEN];
    out[..32].copy_from_slice(public_key.as_bytes());
    out[32..].copy_from_slice(&crate::blake2b_256(public_key.as_bytes())[..CHECKSUM_LEN]);
    out
}

/// Derive the `kst_`-prefixed address of a public key.
pub fn derive_address(public_key: &PublicKey) -> Address {
    Address::new(format!("{}{}", Address::PREFIX, encode_base32(&payload(public_key))))
}

/// Whether `address` is the address of `public_key`.
pub fn validate_address(address: &Address, public_key: &PublicKey) -> bool {
    address.as_str().len() == Address::PREFIX.len() + ENCODED_LEN
        && *address == derive_address(public_key)
}
