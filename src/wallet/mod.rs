//! Wallet layer
//!
//! This module contains the wallet-facing half of the system:
//! - The UTXO ledger (classified output tracking and spend selection)
//! - Wallet state and node operations (funding, refresh, submission)
//! - The token transaction builder (genesis, mint, send)

pub mod builder;
pub mod ledger;
pub mod wallet;

pub use builder::{TOKEN_NAME, TOKEN_TICKER};
pub use ledger::{SpendableSet, Utxo, UtxoLedger};
pub use wallet::{Wallet, WalletError, LOW_BALANCE_SATS, MATURITY_BLOCKS};
