//! Token DAG validity
//!
//! A recursive, memoized validity judge over the raw-transaction fetch:
//! a GENESIS stands on its own, a MINT must consume a baton output of its
//! token's lineage, and a SEND must be covered by the token value of its
//! inputs. Results are memoized in the shared cache by transaction id, so
//! long mint chains are walked once.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::core::{Transaction, TxIn};
use crate::rpc::{RawTxFetcher, RpcError};

use super::classify::{facet_for, ClassifyError, SlpValidity, TokenCache, TokenFacet};
use super::message::{SlpError, SlpMessage};

/// Walks the token ancestry of a transaction to judge its validity
pub struct DagValidator {
    fetcher: Arc<dyn RawTxFetcher>,
    cache: Arc<TokenCache>,
}

impl DagValidator {
    pub fn new(fetcher: Arc<dyn RawTxFetcher>, cache: Arc<TokenCache>) -> Self {
        Self { fetcher, cache }
    }

    /// Judge one transaction id; memoizes positive results.
    fn validate<'a>(
        &'a self,
        txid: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, ClassifyError>> + Send + 'a>> {
        Box::pin(async move {
            if self.cache.is_known_valid(txid) {
                return Ok(true);
            }

            let raw = match self.fetch(txid).await {
                Ok(raw) => raw,
                Err(ClassifyError::Rpc(RpcError::TxNotFound(_))) => return Ok(false),
                Err(err) => return Err(err),
            };
            let tx = Transaction::parse(&raw)?;
            let first_output = match tx.outputs.first() {
                Some(output) => output,
                None => return Ok(false),
            };
            let msg = match SlpMessage::parse(&first_output.script) {
                Ok(msg) => msg,
                Err(SlpError::Malformed(_)) => return Ok(false),
                Err(err @ SlpError::UnhandledTokenKind(_)) => return Err(err.into()),
            };

            let valid = match &msg {
                SlpMessage::Genesis { .. } => true,
                SlpMessage::Mint { token_id, .. } => {
                    self.spends_baton_of(&tx, token_id).await?
                }
                SlpMessage::Send { token_id, amounts } => {
                    let declared: u128 = amounts.iter().map(|a| u128::from(*a)).sum();
                    let mut contributed: u128 = 0;
                    for input in &tx.inputs {
                        contributed += self.token_contribution(input, token_id).await?;
                    }
                    contributed >= declared
                }
            };

            if valid {
                self.cache.mark_valid(txid);
            }
            Ok(valid)
        })
    }

    /// Whether any input consumes the minting baton of `token_id`'s lineage
    async fn spends_baton_of(
        &self,
        tx: &Transaction,
        token_id: &str,
    ) -> Result<bool, ClassifyError> {
        for input in &tx.inputs {
            if let Some(facet) = self.input_facet(input).await? {
                if facet.is_minting_authority && facet.token_id == token_id {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Token value `input` contributes toward `token_id` transfers
    async fn token_contribution(
        &self,
        input: &TxIn,
        token_id: &str,
    ) -> Result<u128, ClassifyError> {
        match self.input_facet(input).await? {
            Some(facet) if !facet.is_minting_authority && facet.token_id == token_id => {
                Ok(u128::from(facet.amount))
            }
            _ => Ok(0),
        }
    }

    /// Facet of the parent output an input spends, if the parent is a
    /// valid token transaction at all.
    async fn input_facet(&self, input: &TxIn) -> Result<Option<TokenFacet>, ClassifyError> {
        if !self.validate(&input.prev_txid).await? {
            return Ok(None);
        }
        let raw = match self.fetch(&input.prev_txid).await {
            Ok(raw) => raw,
            Err(ClassifyError::Rpc(RpcError::TxNotFound(_))) => return Ok(None),
            Err(err) => return Err(err),
        };
        let parent = Transaction::parse(&raw)?;
        let msg = match parent.outputs.first() {
            Some(output) => match SlpMessage::parse(&output.script) {
                Ok(msg) => msg,
                Err(_) => return Ok(None),
            },
            None => return Ok(None),
        };
        Ok(facet_for(
            &msg,
            &input.prev_txid,
            input.prev_vout,
            parent.outputs.len(),
        ))
    }

    async fn fetch(&self, txid: &str) -> Result<Vec<u8>, ClassifyError> {
        if let Some(raw) = self.cache.raw_tx(txid) {
            return Ok(raw);
        }
        let raw = self.fetcher.fetch_raw_tx(txid).await?;
        self.cache.store_raw_tx(txid, raw.clone());
        Ok(raw)
    }
}

#[async_trait::async_trait]
impl SlpValidity for DagValidator {
    async fn is_valid_slp_tx(&self, txid: &str) -> Result<bool, ClassifyError> {
        self.validate(txid).await
    }
}
