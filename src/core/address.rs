//! Address encoding and decoding
//!
//! One underlying 20-byte public-key (or script) hash has two equivalent
//! textual encodings: the currency-network form and the token-network form.
//! Both are base58check with distinct version bytes, so either form decodes
//! back to the same hash and kind. An `Address` is immutable once created.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{double_sha256, KeyPair};

// Version bytes per (kind, textual form)
const VERSION_CASH_P2PKH: u8 = 0x6f;
const VERSION_CASH_P2SH: u8 = 0xc4;
const VERSION_SLP_P2PKH: u8 = 0x76;
const VERSION_SLP_P2SH: u8 = 0xc8;

/// Address-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Unsupported address kind (version byte 0x{0:02x})")]
    UnsupportedAddressKind(u8),
    #[error("Invalid base58 encoding")]
    InvalidEncoding,
    #[error("Checksum mismatch")]
    BadChecksum,
    #[error("Invalid payload length: {0}")]
    BadLength(usize),
}

/// The spending-condition kind an address commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    /// Pay to public key hash
    PubKeyHash,
    /// Pay to script hash
    ScriptHash,
}

/// A semantic address: one 20-byte hash plus its spending-condition kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    hash: [u8; 20],
    kind: AddressKind,
}

impl Address {
    /// Build a pay-to-key-hash address from a 20-byte hash
    pub fn from_pubkey_hash(hash: [u8; 20]) -> Self {
        Self {
            hash,
            kind: AddressKind::PubKeyHash,
        }
    }

    /// Build a pay-to-script-hash address from a 20-byte hash
    pub fn from_script_hash(hash: [u8; 20]) -> Self {
        Self {
            hash,
            kind: AddressKind::ScriptHash,
        }
    }

    /// Derive the pay-to-key-hash address of a key pair
    pub fn from_key(key_pair: &KeyPair) -> Self {
        Self::from_pubkey_hash(key_pair.pubkey_hash())
    }

    /// Decode either textual form back into an address
    pub fn decode(encoded: &str) -> Result<Self, AddressError> {
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|_| AddressError::InvalidEncoding)?;
        if bytes.len() != 25 {
            return Err(AddressError::BadLength(bytes.len()));
        }

        let (payload, checksum) = bytes.split_at(21);
        let expected = &double_sha256(payload)[..4];
        if checksum != expected {
            return Err(AddressError::BadChecksum);
        }

        let kind = match payload[0] {
            VERSION_CASH_P2PKH | VERSION_SLP_P2PKH => AddressKind::PubKeyHash,
            VERSION_CASH_P2SH | VERSION_SLP_P2SH => AddressKind::ScriptHash,
            other => return Err(AddressError::UnsupportedAddressKind(other)),
        };

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        Ok(Self { hash, kind })
    }

    /// The 20-byte hash this address commits to
    pub fn hash(&self) -> &[u8; 20] {
        &self.hash
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    /// Currency-network textual form
    pub fn cash_address(&self) -> String {
        let version = match self.kind {
            AddressKind::PubKeyHash => VERSION_CASH_P2PKH,
            AddressKind::ScriptHash => VERSION_CASH_P2SH,
        };
        encode_base58check(version, &self.hash)
    }

    /// Token-network textual form (same hash, different version byte)
    pub fn slp_address(&self) -> String {
        let version = match self.kind {
            AddressKind::PubKeyHash => VERSION_SLP_P2PKH,
            AddressKind::ScriptHash => VERSION_SLP_P2SH,
        };
        encode_base58check(version, &self.hash)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cash_address())
    }
}

fn encode_base58check(version: u8, hash: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(25);
    payload.push(version);
    payload.extend_from_slice(hash);
    let checksum = double_sha256(&payload);
    payload.extend_from_slice(&checksum[..4]);
    bs58::encode(payload).into_string()
}
