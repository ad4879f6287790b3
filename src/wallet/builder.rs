//! Token transaction construction
//!
//! Builds the three token operations as fully signed pending transactions.
//! Every build follows the same shape: the token message at output 0, dust
//! carrier outputs in the exact order the message indexes them, then a
//! currency change output when it clears dust. The declared token amounts
//! never exceed the token value consumed, and each build renews at most
//! one minting baton.

use crate::core::{spending_script_for, Address, PendingTransaction, DUST_VALUE};
use crate::slp::{SlpMessage, MAX_SEND_OUTPUTS};

use super::ledger::Utxo;
use super::wallet::{Wallet, WalletError};

/// Ticker of tokens issued by `build_genesis`
pub const TOKEN_TICKER: &[u8] = b"TEST";

/// Human-readable name of tokens issued by `build_genesis`
pub const TOKEN_NAME: &[u8] = b"This is a test";

/// Output index the minting baton is renewed at in every genesis and mint
const BATON_VOUT: u8 = 2;

/// Wire-size allowance for the change output added during finalization
const CHANGE_OUTPUT_SIZE: usize = 34;

impl Wallet {
    /// Build a signed genesis issuing `quantity` units and a minting baton.
    ///
    /// Outputs: message, initial supply to self, baton to self, change.
    pub async fn build_genesis(&mut self, quantity: u64) -> Result<PendingTransaction, WalletError> {
        let spendable = self.spendable_or_fund(None).await?;

        let msg = SlpMessage::Genesis {
            ticker: TOKEN_TICKER.to_vec(),
            name: TOKEN_NAME.to_vec(),
            doc_uri: Vec::new(),
            doc_hash: Vec::new(),
            decimals: 0,
            baton_vout: Some(BATON_VOUT),
            quantity,
        };

        let own_script = spending_script_for(self.address());
        let mut tx = PendingTransaction::new();
        let total_in = add_inputs(&mut tx, &spendable.currency);
        tx.add_output(0, msg.encode());
        tx.add_output(DUST_VALUE, own_script.clone());
        tx.add_output(DUST_VALUE, own_script);

        self.finalize(&mut tx, total_in)?;
        Ok(tx)
    }

    /// Build a signed mint of `quantity` units to `recipient`, consuming
    /// the held baton and renewing it at `baton_vout` (always output 2 in
    /// transactions this builder shapes; the index is declared in the
    /// message, so the caller owns the choice).
    ///
    /// Outputs: message, minted units to recipient, renewed baton to self,
    /// change.
    pub async fn build_mint(
        &mut self,
        token_id: &str,
        recipient: &Address,
        quantity: u64,
        baton_vout: u8,
    ) -> Result<PendingTransaction, WalletError> {
        let spendable = self.spendable_or_fund(Some(token_id)).await?;
        let baton = spendable
            .minting_baton
            .first()
            .ok_or_else(|| WalletError::NoMintingBatonFound(token_id.to_string()))?;

        let msg = SlpMessage::Mint {
            token_id: token_id.to_string(),
            baton_vout: Some(baton_vout),
            quantity,
        };

        let mut tx = PendingTransaction::new();
        // baton first, then currency for fees
        let mut total_in = add_inputs(&mut tx, std::slice::from_ref(baton));
        total_in += add_inputs(&mut tx, &spendable.currency);
        tx.add_output(0, msg.encode());
        tx.add_output(DUST_VALUE, spending_script_for(recipient));
        tx.add_output(DUST_VALUE, spending_script_for(self.address()));

        self.finalize(&mut tx, total_in)?;
        Ok(tx)
    }

    /// Build a signed transfer covering `transfers`, with any leftover
    /// token value returned to self as a trailing transfer. No change
    /// transfer is declared when the inputs are consumed exactly.
    ///
    /// Outputs: message, one dust carrier per transfer in declaration
    /// order, change.
    pub async fn build_send(
        &mut self,
        token_id: &str,
        transfers: &[(Address, u64)],
    ) -> Result<PendingTransaction, WalletError> {
        let spendable = self.spendable_or_fund(Some(token_id)).await?;

        let need: u128 = transfers.iter().map(|(_, amount)| u128::from(*amount)).sum();
        let have = spendable.token_total();
        if have < need {
            return Err(WalletError::InsufficientTokenBalance { have, need });
        }
        let token_change = u64::try_from(have - need).map_err(|_| WalletError::AmountOverflow)?;

        let mut recipients: Vec<(Address, u64)> = transfers.to_vec();
        if token_change > 0 {
            recipients.push((self.address().clone(), token_change));
        }
        if recipients.len() > MAX_SEND_OUTPUTS {
            return Err(WalletError::TooManyRecipients(recipients.len()));
        }

        let msg = SlpMessage::Send {
            token_id: token_id.to_string(),
            amounts: recipients.iter().map(|(_, amount)| *amount).collect(),
        };

        let mut tx = PendingTransaction::new();
        let mut total_in = add_inputs(&mut tx, &spendable.token_units);
        total_in += add_inputs(&mut tx, &spendable.currency);
        tx.add_output(0, msg.encode());
        for (address, _) in &recipients {
            tx.add_output(DUST_VALUE, spending_script_for(address));
        }

        self.finalize(&mut tx, total_in)?;
        Ok(tx)
    }

    /// Issue a new token; returns its token id
    pub async fn genesis(&mut self, quantity: u64) -> Result<String, WalletError> {
        let tx = self.build_genesis(quantity).await?;
        self.submit(&tx).await
    }

    /// Mint units to a recipient with the baton renewed at the standard
    /// index; returns the mint transaction id
    pub async fn mint(
        &mut self,
        token_id: &str,
        recipient: &Address,
        quantity: u64,
    ) -> Result<String, WalletError> {
        let tx = self
            .build_mint(token_id, recipient, quantity, BATON_VOUT)
            .await?;
        self.submit(&tx).await
    }

    /// Transfer token units; returns the send transaction id
    pub async fn send_tokens(
        &mut self,
        token_id: &str,
        transfers: &[(Address, u64)],
    ) -> Result<String, WalletError> {
        let tx = self.build_send(token_id, transfers).await?;
        self.submit(&tx).await
    }

    /// Settle fee and currency change, then sign.
    ///
    /// Fee is one satoshi per estimated wire byte, sized as if the change
    /// output were present. Change below dust is forfeited to the fee.
    fn finalize(&self, tx: &mut PendingTransaction, total_in: u64) -> Result<(), WalletError> {
        let committed = tx.transaction().total_output();
        let fee = (tx.transaction().estimated_size() + CHANGE_OUTPUT_SIZE) as u64;
        let need = committed + fee;
        if total_in < need {
            return Err(WalletError::InsufficientFunds {
                have: total_in,
                need,
            });
        }

        let change = total_in - need;
        if change >= DUST_VALUE {
            tx.add_output(change, spending_script_for(self.address()));
        }
        self.sign(tx)
    }
}

fn add_inputs(tx: &mut PendingTransaction, utxos: &[Utxo]) -> u64 {
    let mut total = 0;
    for utxo in utxos {
        tx.add_input(utxo.outpoint.clone(), spending_script_for(&utxo.address));
        total += utxo.value;
    }
    total
}
