//! Core transaction-level components
//!
//! This module contains the building blocks under the wallet:
//! - Addresses (one hash, two textual encodings)
//! - Locking-script codec (P2PKH, P2SH, OP_RETURN recognition)
//! - Transaction wire codec, pending transactions, and signing

pub mod address;
pub mod script;
pub mod transaction;

pub use address::{Address, AddressError, AddressKind};
pub use script::{address_from_script, is_op_return, spending_script_for, OP_RETURN};
pub use transaction::{
    Outpoint, PendingTransaction, Transaction, TxError, TxIn, TxOut, DUST_VALUE,
    SEQUENCE_FINAL, SIGHASH_ALL_FORKID, TX_VERSION,
};
