//! Token output classification
//!
//! Given an outpoint, decides whether that output carries token value and
//! if so which kind and amount. Validity is judged per transaction and
//! cached; facets are re-derived per output on every call, because they
//! are a property of the output, not the transaction.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Outpoint, Transaction, TxError};
use crate::rpc::{RawTxFetcher, RpcError};

use super::message::{SlpError, SlpMessage};

/// Classification errors.
///
/// Malformed messages never show up here; they classify as "no facet".
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("SLP error: {0}")]
    Slp(#[from] SlpError),
    #[error("Transaction codec error: {0}")]
    Tx(#[from] TxError),
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
}

/// The operation that produced a token output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Genesis,
    Mint,
    Send,
}

/// Token annotation on one output.
///
/// `amount` is only meaningful when `is_minting_authority` is false; the
/// baton output carries authority, not supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFacet {
    pub token_id: String,
    pub amount: u64,
    pub kind: TokenKind,
    pub is_minting_authority: bool,
}

/// Derive the facet of output `vout` from a decoded message.
///
/// Pure function of (message, containing txid, output count); the three
/// kinds are strictly disjoint, an output is never reachable through
/// another kind's arm.
pub fn facet_for(
    msg: &SlpMessage,
    txid: &str,
    vout: u32,
    n_outputs: usize,
) -> Option<TokenFacet> {
    if vout as usize >= n_outputs {
        return None;
    }
    match msg {
        SlpMessage::Genesis {
            baton_vout,
            quantity,
            ..
        } => {
            // a genesis output is denominated in the genesis tx's own id
            if vout == 1 && *quantity > 0 {
                Some(TokenFacet {
                    token_id: txid.to_string(),
                    amount: *quantity,
                    kind: TokenKind::Genesis,
                    is_minting_authority: false,
                })
            } else if baton_vout.map(u32::from) == Some(vout) {
                Some(TokenFacet {
                    token_id: txid.to_string(),
                    amount: 0,
                    kind: TokenKind::Genesis,
                    is_minting_authority: true,
                })
            } else {
                None
            }
        }
        SlpMessage::Mint {
            token_id,
            baton_vout,
            quantity,
        } => {
            if vout == 1 && *quantity > 0 {
                Some(TokenFacet {
                    token_id: token_id.clone(),
                    amount: *quantity,
                    kind: TokenKind::Mint,
                    is_minting_authority: false,
                })
            } else if baton_vout.map(u32::from) == Some(vout) {
                Some(TokenFacet {
                    token_id: token_id.clone(),
                    amount: 0,
                    kind: TokenKind::Mint,
                    is_minting_authority: true,
                })
            } else {
                None
            }
        }
        SlpMessage::Send { token_id, amounts } => {
            if vout == 0 {
                return None;
            }
            let idx = (vout - 1) as usize;
            match amounts.get(idx) {
                Some(&amount) if amount > 0 => Some(TokenFacet {
                    token_id: token_id.clone(),
                    amount,
                    kind: TokenKind::Send,
                    is_minting_authority: false,
                }),
                _ => None,
            }
        }
    }
}

// =============================================================================
// Shared caches
// =============================================================================

/// Shared, append-only caches keyed by transaction id.
///
/// Entries are never evicted or invalidated: a transaction's bytes and its
/// validity are immutable once known, so concurrent read/insert across
/// wallets is safe behind the mutexes. Construct one per test (or per
/// process) and inject it; nothing here is global.
#[derive(Default)]
pub struct TokenCache {
    validity: Mutex<HashSet<String>>,
    raw_txs: Mutex<HashMap<String, Vec<u8>>>,
}

impl TokenCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_known_valid(&self, txid: &str) -> bool {
        self.validity.lock().expect("cache poisoned").contains(txid)
    }

    pub fn mark_valid(&self, txid: &str) {
        self.validity
            .lock()
            .expect("cache poisoned")
            .insert(txid.to_string());
    }

    pub fn raw_tx(&self, txid: &str) -> Option<Vec<u8>> {
        self.raw_txs.lock().expect("cache poisoned").get(txid).cloned()
    }

    pub fn store_raw_tx(&self, txid: &str, raw: Vec<u8>) {
        self.raw_txs
            .lock()
            .expect("cache poisoned")
            .entry(txid.to_string())
            .or_insert(raw);
    }
}

// =============================================================================
// Classifier
// =============================================================================

/// Validity judgment for a token transaction id
#[async_trait::async_trait]
pub trait SlpValidity: Send + Sync {
    async fn is_valid_slp_tx(&self, txid: &str) -> Result<bool, ClassifyError>;
}

/// Classifies outputs as plain currency or typed token outputs
pub struct TokenClassifier {
    validator: Arc<dyn SlpValidity>,
    fetcher: Arc<dyn RawTxFetcher>,
    cache: Arc<TokenCache>,
}

impl TokenClassifier {
    pub fn new(
        validator: Arc<dyn SlpValidity>,
        fetcher: Arc<dyn RawTxFetcher>,
        cache: Arc<TokenCache>,
    ) -> Self {
        Self {
            validator,
            fetcher,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Classify one output.
    ///
    /// Returns `None` for plain currency, out-of-range indices, and
    /// malformed messages; fails only on collaborator errors or an
    /// unhandled token kind.
    pub async fn classify(
        &self,
        outpoint: &Outpoint,
    ) -> Result<Option<TokenFacet>, ClassifyError> {
        let txid = &outpoint.txid;

        // cache hit skips whole-transaction validation, never facet derivation
        if !self.cache.is_known_valid(txid) {
            if !self.validator.is_valid_slp_tx(txid).await? {
                return Ok(None);
            }
            self.cache.mark_valid(txid);
        }

        let raw = self.fetch_cached(txid).await?;
        let tx = Transaction::parse(&raw)?;
        let first_output = match tx.outputs.first() {
            Some(output) => output,
            None => return Ok(None),
        };

        let msg = match SlpMessage::parse(&first_output.script) {
            Ok(msg) => msg,
            Err(SlpError::Malformed(_)) => return Ok(None),
            Err(err @ SlpError::UnhandledTokenKind(_)) => return Err(err.into()),
        };

        Ok(facet_for(&msg, txid, outpoint.vout, tx.outputs.len()))
    }

    async fn fetch_cached(&self, txid: &str) -> Result<Vec<u8>, ClassifyError> {
        if let Some(raw) = self.cache.raw_tx(txid) {
            return Ok(raw);
        }
        let raw = self.fetcher.fetch_raw_tx(txid).await?;
        self.cache.store_raw_tx(txid, raw.clone());
        Ok(raw)
    }
}
