//! Transaction wire codec and signing
//!
//! Implements the Bitcoin-Cash wire serialization used on regtest:
//! raw bytes in, raw bytes out, with the transaction id derived by double
//! SHA-256 of the serialization. `PendingTransaction` is the in-memory,
//! not-yet-final form: it remembers the locking script of every spent
//! output so the whole transaction can be mutated and re-signed with one
//! key, which the double-spend scenario relies on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{double_sha256, id_to_internal_bytes, reversed_hex, txid_hex, KeyPair};

// =============================================================================
// Constants
// =============================================================================

/// Transaction version emitted by this wallet
pub const TX_VERSION: i32 = 2;

/// Sequence number marking an input final
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Minimal output value that carries a token annotation
pub const DUST_VALUE: u64 = 546;

/// SIGHASH_ALL with the Bitcoin-Cash fork id bit
pub const SIGHASH_ALL_FORKID: u8 = 0x41;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction codec and signing errors
#[derive(Error, Debug)]
pub enum TxError {
    #[error("Truncated transaction bytes at offset {0}")]
    Truncated(usize),
    #[error("Varint too large")]
    OversizedVarint,
    #[error("Invalid transaction id: {0}")]
    InvalidTxid(String),
    #[error("Output index {0} out of range")]
    OutputIndexOutOfRange(usize),
    #[error("Input count does not match spent-script count")]
    MissingSpentScripts,
    #[error("Trailing bytes after transaction")]
    TrailingBytes,
    #[error("Key error: {0}")]
    Key(#[from] crate::crypto::KeyError),
}

// =============================================================================
// Outpoint
// =============================================================================

/// (transaction id, output index) — the universal key for spendable value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: String,
    pub vout: u32,
}

impl Outpoint {
    pub fn new(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            txid: txid.into(),
            vout,
        }
    }
}

impl std::fmt::Display for Outpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

// =============================================================================
// Inputs and Outputs
// =============================================================================

/// Transaction input (reference to a previous output)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    /// Previous transaction id, display order
    pub prev_txid: String,
    /// Output index in the previous transaction
    pub prev_vout: u32,
    /// Unlocking script (empty until signed)
    pub script: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    pub fn outpoint(&self) -> Outpoint {
        Outpoint::new(self.prev_txid.clone(), self.prev_vout)
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    /// Value in satoshis
    pub value: u64,
    /// Locking script
    pub script: Vec<u8>,
}

// =============================================================================
// Transaction
// =============================================================================

/// A wire-format transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub locktime: u32,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            version: TX_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            locktime: 0,
        }
    }

    /// Serialize to wire bytes
    pub fn serialize(&self) -> Result<Vec<u8>, TxError> {
        let mut out = Vec::with_capacity(self.estimated_size());
        out.extend_from_slice(&self.version.to_le_bytes());

        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            let prev = id_to_internal_bytes(&input.prev_txid)
                .map_err(|_| TxError::InvalidTxid(input.prev_txid.clone()))?;
            out.extend_from_slice(&prev);
            out.extend_from_slice(&input.prev_vout.to_le_bytes());
            write_varint(&mut out, input.script.len() as u64);
            out.extend_from_slice(&input.script);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_varint(&mut out, output.script.len() as u64);
            out.extend_from_slice(&output.script);
        }

        out.extend_from_slice(&self.locktime.to_le_bytes());
        Ok(out)
    }

    /// Parse wire bytes, rejecting trailing garbage
    pub fn parse(bytes: &[u8]) -> Result<Self, TxError> {
        let mut cursor = Cursor::new(bytes);

        let version = i32::from_le_bytes(cursor.take_array::<4>()?);

        let n_inputs = cursor.read_varint()?;
        let mut inputs = Vec::with_capacity(n_inputs.min(1024) as usize);
        for _ in 0..n_inputs {
            let prev = cursor.take_array::<32>()?;
            let prev_vout = u32::from_le_bytes(cursor.take_array::<4>()?);
            let script_len = cursor.read_varint()? as usize;
            let script = cursor.take(script_len)?.to_vec();
            let sequence = u32::from_le_bytes(cursor.take_array::<4>()?);
            inputs.push(TxIn {
                prev_txid: reversed_hex(&prev),
                prev_vout,
                script,
                sequence,
            });
        }

        let n_outputs = cursor.read_varint()?;
        let mut outputs = Vec::with_capacity(n_outputs.min(1024) as usize);
        for _ in 0..n_outputs {
            let value = u64::from_le_bytes(cursor.take_array::<8>()?);
            let script_len = cursor.read_varint()? as usize;
            let script = cursor.take(script_len)?.to_vec();
            outputs.push(TxOut { value, script });
        }

        let locktime = u32::from_le_bytes(cursor.take_array::<4>()?);
        if !cursor.is_empty() {
            return Err(TxError::TrailingBytes);
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            locktime,
        })
    }

    /// Transaction id in display order
    pub fn txid(&self) -> Result<String, TxError> {
        Ok(txid_hex(&self.serialize()?))
    }

    /// Total currency value across outputs
    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Rough wire size used for fee estimation before signing.
    /// A signed P2PKH input occupies about 148 bytes.
    pub fn estimated_size(&self) -> usize {
        let outputs: usize = self.outputs.iter().map(|o| 9 + o.script.len()).sum();
        10 + self.inputs.len() * 148 + outputs
    }

    /// Legacy SIGHASH_ALL preimage hash for one input.
    ///
    /// Every input script is blanked except the one being signed, which
    /// carries the locking script of the output it spends; the hash type
    /// is appended as a 32-bit little-endian word before double hashing.
    pub fn sighash(&self, input_index: usize, spent_script: &[u8]) -> Result<Vec<u8>, TxError> {
        let mut copy = self.clone();
        for (i, input) in copy.inputs.iter_mut().enumerate() {
            input.script = if i == input_index {
                spent_script.to_vec()
            } else {
                Vec::new()
            };
        }
        let mut preimage = copy.serialize()?;
        preimage.extend_from_slice(&(SIGHASH_ALL_FORKID as u32).to_le_bytes());
        Ok(double_sha256(&preimage))
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Pending Transaction
// =============================================================================

/// A not-yet-broadcast transaction, mutable and re-signable.
///
/// Holds the locking script of every spent output alongside the
/// transaction itself, so that `sign` can be called again after any
/// output mutation. Signing is deterministic, so re-signing an unchanged
/// transaction is a no-op while any output change yields new unlocking
/// scripts and therefore a new id.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    tx: Transaction,
    spent_scripts: Vec<Vec<u8>>,
}

impl PendingTransaction {
    pub fn new() -> Self {
        Self {
            tx: Transaction::new(),
            spent_scripts: Vec::new(),
        }
    }

    /// Rebuild a pending transaction from wire bytes plus the spent scripts
    pub fn from_parts(tx: Transaction, spent_scripts: Vec<Vec<u8>>) -> Result<Self, TxError> {
        if tx.inputs.len() != spent_scripts.len() {
            return Err(TxError::MissingSpentScripts);
        }
        Ok(Self { tx, spent_scripts })
    }

    /// Add an input spending `outpoint`, remembering its locking script
    pub fn add_input(&mut self, outpoint: Outpoint, spent_script: Vec<u8>) {
        self.tx.inputs.push(TxIn {
            prev_txid: outpoint.txid,
            prev_vout: outpoint.vout,
            script: Vec::new(),
            sequence: SEQUENCE_FINAL,
        });
        self.spent_scripts.push(spent_script);
    }

    /// Append an output
    pub fn add_output(&mut self, value: u64, script: Vec<u8>) {
        self.tx.outputs.push(TxOut { value, script });
    }

    /// Replace the destination script of an existing output
    pub fn set_output_script(&mut self, index: usize, script: Vec<u8>) -> Result<(), TxError> {
        let output = self
            .tx
            .outputs
            .get_mut(index)
            .ok_or(TxError::OutputIndexOutOfRange(index))?;
        output.script = script;
        Ok(())
    }

    /// Sign every input with one private key.
    ///
    /// Unlock script: `push(DER signature ‖ hash type)` `push(pubkey)`.
    pub fn sign(&mut self, key_pair: &KeyPair) -> Result<(), TxError> {
        let pubkey = key_pair.public_key_bytes();
        for i in 0..self.tx.inputs.len() {
            let digest = self.tx.sighash(i, &self.spent_scripts[i])?;
            let mut sig = key_pair.sign(&digest)?;
            sig.push(SIGHASH_ALL_FORKID);

            let mut script = Vec::with_capacity(sig.len() + pubkey.len() + 2);
            script.push(sig.len() as u8);
            script.extend_from_slice(&sig);
            script.push(pubkey.len() as u8);
            script.extend_from_slice(&pubkey);
            self.tx.inputs[i].script = script;
        }
        Ok(())
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// Unlocking script of input `i`, for conflict assertions
    pub fn input_script(&self, i: usize) -> Option<&[u8]> {
        self.tx.inputs.get(i).map(|input| input.script.as_slice())
    }

    pub fn serialize(&self) -> Result<Vec<u8>, TxError> {
        self.tx.serialize()
    }

    pub fn txid(&self) -> Result<String, TxError> {
        self.tx.txid()
    }
}

impl Default for PendingTransaction {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Varint codec
// =============================================================================

fn write_varint(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TxError> {
        if self.pos + n > self.bytes.len() {
            return Err(TxError::Truncated(self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], TxError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_varint(&mut self) -> Result<u64, TxError> {
        let first = self.take(1)?[0];
        let value = match first {
            0xfd => u16::from_le_bytes(self.take_array::<2>()?) as u64,
            0xfe => u32::from_le_bytes(self.take_array::<4>()?) as u64,
            0xff => u64::from_le_bytes(self.take_array::<8>()?),
            b => b as u64,
        };
        // sanity bound: nothing in a regtest transaction approaches this
        if value > 0x0200_0000 {
            return Err(TxError::OversizedVarint);
        }
        Ok(value)
    }

    fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
