//! Cryptographic utilities
//!
//! This module provides:
//! - SHA-256 hashing and id derivation (double hash, reversed display order)
//! - ECDSA key management (secp256k1)

pub mod hash;
pub mod keys;

pub use hash::{
    block_hash_hex, double_sha256, id_to_internal_bytes, reversed_hex, sha256, txid_hex,
};
pub use keys::{pubkey_hash, KeyError, KeyPair};
