//! Wallet state and node-facing operations
//!
//! A wallet owns one key pair, tracks the outputs paid to its address, and
//! talks to exactly one node. A second, untracked mining address absorbs
//! block rewards that exist only to mature earlier coinbases, so they never
//! pollute the tracked output set.

use std::sync::Arc;

use thiserror::Error;

use crate::core::{Address, PendingTransaction, TxError};
use crate::crypto::KeyPair;
use crate::rpc::{NodeClient, NodeFetcher, RpcError};
use crate::slp::{ClassifyError, DagValidator, TokenCache, TokenClassifier};

use super::ledger::{SpendableSet, UtxoLedger};

/// Balance floor below which the wallet mines itself fresh funds
pub const LOW_BALANCE_SATS: u64 = 10_000_000;

/// Blocks mined past a coinbase before it becomes spendable
pub const MATURITY_BLOCKS: u32 = 100;

/// Wallet operation errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Insufficient funds: have {have} sat, need {need} sat")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("Insufficient token balance: have {have}, need {need}")]
    InsufficientTokenBalance { have: u128, need: u128 },
    #[error("No minting baton found for token {0}")]
    NoMintingBatonFound(String),
    #[error("Too many token recipients: {0}")]
    TooManyRecipients(usize),
    #[error("Token amount overflow")]
    AmountOverflow,
    #[error("Node reported txid {node}, locally derived {local}")]
    TxidMismatch { local: String, node: String },
    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Transaction error: {0}")]
    Tx(#[from] TxError),
}

/// A single-key wallet bound to one node
pub struct Wallet {
    key_pair: KeyPair,
    address: Address,
    mining_address: Address,
    node: Arc<dyn NodeClient>,
    classifier: TokenClassifier,
    ledger: UtxoLedger,
}

impl Wallet {
    /// Create a wallet with a fresh key and mine it a starting balance.
    ///
    /// The token cache is injected so that wallets sharing one network can
    /// share validity knowledge, and separate tests never do.
    pub async fn create(
        node: Arc<dyn NodeClient>,
        cache: Arc<TokenCache>,
    ) -> Result<Self, WalletError> {
        let key_pair = KeyPair::generate();
        let address = Address::from_key(&key_pair);
        let mining_address = Address::from_key(&KeyPair::generate());

        let fetcher = Arc::new(NodeFetcher(node.clone()));
        let validator = Arc::new(DagValidator::new(fetcher.clone(), cache.clone()));
        let classifier = TokenClassifier::new(validator, fetcher, cache);

        let mut ledger = UtxoLedger::new();
        ledger.add_owned(address.clone());

        let mut wallet = Self {
            key_pair,
            address,
            mining_address,
            node,
            classifier,
            ledger,
        };
        wallet.ensure_funded().await?;
        log::info!("wallet ready at {}", wallet.address);
        Ok(wallet)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn node(&self) -> &Arc<dyn NodeClient> {
        &self.node
    }

    pub fn classifier(&self) -> &TokenClassifier {
        &self.classifier
    }

    /// Sign (or re-sign) a pending transaction with this wallet's key
    pub fn sign(&self, tx: &mut PendingTransaction) -> Result<(), WalletError> {
        tx.sign(&self.key_pair)?;
        Ok(())
    }

    /// Resync the tracked output set from the node
    pub async fn refresh(&mut self) -> Result<(), WalletError> {
        self.ledger
            .refresh(self.node.as_ref(), &self.classifier, &self.address)
            .await?;
        Ok(())
    }

    /// Broadcast a signed transaction and fold it into the ledger.
    ///
    /// The raw bytes are cached under their id before the broadcast so the
    /// classifier can resolve them even while the node is still relaying.
    pub async fn submit(&mut self, tx: &PendingTransaction) -> Result<String, WalletError> {
        let raw = tx.serialize()?;
        self.classifier.cache().store_raw_tx(&tx.txid()?, raw.clone());

        let txid = self.node.send_raw_transaction(&raw).await?;
        let applied = self.ledger.apply_submission(&raw, &self.classifier).await?;
        if applied != txid {
            // the ledger is now keyed under the local id; a disagreeing
            // node means the view cannot be trusted until a refresh
            log::error!("node reported txid {txid}, ledger derived {applied}");
            return Err(WalletError::TxidMismatch {
                local: applied,
                node: txid,
            });
        }
        log::info!("submitted {txid}");
        Ok(txid)
    }

    /// Currency balance of the tracked output set, in satoshis
    pub fn balance(&self) -> u64 {
        self.ledger
            .utxos()
            .filter(|u| u.token.is_none())
            .map(|u| u.value)
            .sum()
    }

    /// Total units held of one token
    pub fn token_balance(&self, token_id: &str) -> u128 {
        self.ledger
            .select_spendable(&self.address, Some(token_id))
            .token_total()
    }

    /// Number of minting batons held for one token (0 or 1 when healthy)
    pub fn baton_count(&self, token_id: &str) -> usize {
        self.ledger
            .select_spendable(&self.address, Some(token_id))
            .minting_baton
            .len()
    }

    /// Refresh and return the spendable partitions, mining fresh funds
    /// first if the currency balance has fallen below the floor.
    pub(super) async fn spendable_or_fund(
        &mut self,
        token_id: Option<&str>,
    ) -> Result<SpendableSet, WalletError> {
        self.ensure_funded().await?;
        Ok(self.ledger.select_spendable(&self.address, token_id))
    }

    /// Mine a block to this wallet plus a maturity run to the untracked
    /// mining address whenever the balance is below the floor. One attempt;
    /// a balance still below the floor afterwards is an error.
    async fn ensure_funded(&mut self) -> Result<(), WalletError> {
        self.refresh().await?;
        let have = self.balance();
        if have >= LOW_BALANCE_SATS {
            return Ok(());
        }

        log::info!("balance {have} sat below floor, mining for funds");
        self.node
            .generate_to_address(1, &self.address.cash_address())
            .await?;
        self.node
            .generate_to_address(MATURITY_BLOCKS, &self.mining_address.cash_address())
            .await?;

        self.refresh().await?;
        let have = self.balance();
        if have < LOW_BALANCE_SATS {
            return Err(WalletError::InsufficientFunds {
                have,
                need: LOW_BALANCE_SATS,
            });
        }
        Ok(())
    }
}
