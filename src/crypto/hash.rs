//! Cryptographic hashing utilities
//!
//! Provides the SHA-256 based hashing used for transaction ids and block
//! hashes. Ids are double SHA-256 of the serialized form, and their display
//! encoding is the byte-reversed digest in hex (Bitcoin convention).

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// Hex encoding of the byte-reversed digest.
///
/// Node RPC interfaces and the graph-search service identify transactions
/// and blocks in this display order, so every id string in this crate uses
/// it as well.
pub fn reversed_hex(digest: &[u8]) -> String {
    let mut bytes = digest.to_vec();
    bytes.reverse();
    hex::encode(bytes)
}

/// Transaction id of raw transaction bytes.
///
/// The id is derived from the payload itself, never trusted from any id
/// field carried alongside it.
pub fn txid_hex(raw_tx: &[u8]) -> String {
    reversed_hex(&double_sha256(raw_tx))
}

/// Block hash of raw block bytes (header-inclusive serialization).
pub fn block_hash_hex(raw_block: &[u8]) -> String {
    reversed_hex(&double_sha256(raw_block))
}

/// Decode a display-order id back into internal (little-endian) byte order.
pub fn id_to_internal_bytes(id_hex: &str) -> Result<[u8; 32], hex::FromHexError> {
    let mut bytes: Vec<u8> = hex::decode(id_hex)?;
    if bytes.len() != 32 {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    bytes.reverse();
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}
