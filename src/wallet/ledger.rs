//! UTXO ledger
//!
//! Per-wallet mapping from outpoint to classified output. The ledger is
//! kept consistent from locally-originated transactions alone: a
//! submission immediately removes the outputs it spends and inserts the
//! outputs it creates, because test scenarios chain transactions faster
//! than the node confirms them. A full `refresh` against the node's
//! unspent listing is the recovery path when the cached view is stale.

use std::collections::{HashMap, HashSet};

use crate::core::{address_from_script, Address, Outpoint, Transaction};
use crate::rpc::NodeClient;
use crate::slp::{ClassifyError, TokenClassifier, TokenFacet};

/// One spendable output owned by the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: Outpoint,
    pub address: Address,
    /// Currency value in satoshis
    pub value: u64,
    /// Token annotation; `None` means plain currency
    pub token: Option<TokenFacet>,
}

/// The three mutually exclusive spendable partitions for one token id
#[derive(Debug, Default)]
pub struct SpendableSet {
    /// Plain currency, sorted by descending value to minimize input count
    pub currency: Vec<Utxo>,
    /// Token units of the requested token, without minting authority
    pub token_units: Vec<Utxo>,
    /// The minting baton of the requested token, if the wallet holds it
    pub minting_baton: Vec<Utxo>,
}

impl SpendableSet {
    pub fn currency_total(&self) -> u64 {
        self.currency.iter().map(|u| u.value).sum()
    }

    pub fn token_total(&self) -> u128 {
        self.token_units
            .iter()
            .filter_map(|u| u.token.as_ref())
            .map(|t| u128::from(t.amount))
            .sum()
    }
}

/// Exclusively-owned view of a wallet's spendable outputs
#[derive(Default)]
pub struct UtxoLedger {
    utxos: HashMap<Outpoint, Utxo>,
    owned: HashSet<Address>,
}

impl UtxoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an address whose outputs belong to this wallet
    pub fn add_owned(&mut self, address: Address) {
        self.owned.insert(address);
    }

    pub fn is_owned(&self, address: &Address) -> bool {
        self.owned.contains(address)
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    pub fn utxos(&self) -> impl Iterator<Item = &Utxo> {
        self.utxos.values()
    }

    /// Full resync from the node's unspent listing, reclassifying every
    /// entry. Expensive; only used when the cached view is known stale.
    pub async fn refresh(
        &mut self,
        node: &dyn NodeClient,
        classifier: &TokenClassifier,
        address: &Address,
    ) -> Result<(), ClassifyError> {
        let unspent = node.list_unspent(&address.cash_address()).await?;
        log::debug!(
            "refreshing ledger for {}: {} unspent entries",
            address,
            unspent.len()
        );

        self.utxos.clear();
        for entry in unspent {
            let outpoint = Outpoint::new(entry.txid, entry.vout);
            let token = classifier.classify(&outpoint).await?;
            self.utxos.insert(
                outpoint.clone(),
                Utxo {
                    outpoint,
                    address: address.clone(),
                    value: entry.value,
                    token,
                },
            );
        }
        Ok(())
    }

    /// Apply a locally-submitted transaction: spend its inputs, classify
    /// and insert its wallet-owned outputs. Returns the transaction id.
    ///
    /// The raw bytes must already be in the classifier's transaction
    /// cache, since the node may not serve them yet.
    pub async fn apply_submission(
        &mut self,
        raw: &[u8],
        classifier: &TokenClassifier,
    ) -> Result<String, ClassifyError> {
        let tx = Transaction::parse(raw)?;
        let txid = tx.txid()?;

        for input in &tx.inputs {
            self.utxos.remove(&input.outpoint());
        }

        for (vout, output) in tx.outputs.iter().enumerate() {
            let address = match address_from_script(&output.script) {
                Some(address) if self.is_owned(&address) => address,
                _ => continue,
            };
            let outpoint = Outpoint::new(txid.clone(), vout as u32);
            let token = classifier.classify(&outpoint).await?;
            self.utxos.insert(
                outpoint.clone(),
                Utxo {
                    outpoint,
                    address,
                    value: output.value,
                    token,
                },
            );
        }

        Ok(txid)
    }

    /// Partition the current view into currency, token units, and baton.
    ///
    /// A utxo lands in exactly one partition; token outputs of other
    /// tokens land in none.
    pub fn select_spendable(&self, address: &Address, token_id: Option<&str>) -> SpendableSet {
        let mut set = SpendableSet::default();
        for utxo in self.utxos.values() {
            if &utxo.address != address {
                continue;
            }
            match (&utxo.token, token_id) {
                (None, _) => set.currency.push(utxo.clone()),
                (Some(facet), Some(id)) if facet.token_id == id => {
                    if facet.is_minting_authority {
                        set.minting_baton.push(utxo.clone());
                    } else {
                        set.token_units.push(utxo.clone());
                    }
                }
                _ => {}
            }
        }
        set.currency.sort_by(|a, b| b.value.cmp(&a.value));
        set
    }
}
