//! Double-spend orchestration
//!
//! Drives two wallets on two nodes through a controlled conflict: the
//! network is partitioned, each side is handed one of two transactions
//! spending the same outpoints, and the partition is healed with a block
//! on the second side. The orchestrator then waits for both nodes to
//! converge on the second transaction and for the first to vanish, and
//! cross-checks the winner against the graph-search service.

use thiserror::Error;

use crate::core::{spending_script_for, Address, TxError};
use crate::crypto::KeyPair;
use crate::rpc::{AddNodeCommand, GraphSearchClient, RpcError};
use crate::wallet::{Wallet, WalletError};

use super::poll::Poller;

/// Scenario failures; `Assertion` names the first step that did not hold
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Scenario assertion failed: {0}")]
    Assertion(String),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Transaction error: {0}")]
    Tx(#[from] TxError),
}

fn ensure(condition: bool, step: &str) -> Result<(), ScenarioError> {
    if condition {
        Ok(())
    } else {
        log::error!("scenario failed at: {step}");
        Err(ScenarioError::Assertion(step.to_string()))
    }
}

/// Outcome of a completed double-spend run
#[derive(Debug, Clone)]
pub struct DoubleSpendReport {
    /// The transaction both nodes ultimately reject
    pub first_txid: String,
    /// The transaction both nodes converge on
    pub second_txid: String,
    /// Token transactions in the winner's ancestry, winner included
    pub dag_size: usize,
}

/// Issue a token and extend its lineage with a run of mints to self.
///
/// Every mint consumes the current baton and renews it, so the resulting
/// ancestry is one unbroken chain. Returns the token id.
pub async fn run_long_mint_chain(
    wallet: &mut Wallet,
    mints: u32,
    quantity_per_mint: u64,
) -> Result<String, ScenarioError> {
    let token_id = wallet.genesis(1).await?;
    log::info!("issued token {token_id}");

    let recipient = wallet.address().clone();
    for i in 0..mints {
        wallet.mint(&token_id, &recipient, quantity_per_mint).await?;
        ensure(
            wallet.baton_count(&token_id) == 1,
            &format!("exactly one baton after mint {}", i + 1),
        )?;
    }
    Ok(token_id)
}

/// Run the full double-spend conflict over `token_id`.
///
/// `wallet1` holds the token balance and signs both conflicting
/// transactions; `wallet2` sits on the node reachable from wallet1's node
/// as `peer_addr` and receives the redirected transfer.
pub async fn run_double_spend(
    wallet1: &mut Wallet,
    wallet2: &mut Wallet,
    peer_addr: &str,
    graph: &dyn GraphSearchClient,
    poller: &Poller,
    token_id: &str,
) -> Result<DoubleSpendReport, ScenarioError> {
    let node1 = wallet1.node().clone();
    let node2 = wallet2.node().clone();

    wallet1.refresh().await?;
    let total = u64::try_from(wallet1.token_balance(token_id))
        .map_err(|_| WalletError::AmountOverflow)?;
    ensure(total > 0, "wallet1 holds token units to conflict over")?;

    // partition the network; the command is idempotent in effect and may
    // itself need repeating, so it is re-issued before every re-check
    log::info!("partitioning: disconnecting {peer_addr}");
    let outcome = poller
        .wait_for(|| {
            let node1 = node1.clone();
            let peer = peer_addr.to_string();
            async move {
                if let Err(err) = node1.disconnect_node(&peer).await {
                    log::warn!("disconnect request failed, retrying: {err}");
                }
                Ok::<_, RpcError>(node1.get_peer_info().await?.is_empty())
            }
        })
        .await?;
    ensure(outcome.is_satisfied(), "partition observed on node1")?;

    // first spend: the full balance back to self, via node1
    let t1 = wallet1
        .build_send(token_id, &[(wallet1.address().clone(), total)])
        .await?;
    let first_txid = wallet1.submit(&t1).await?;
    log::info!("first spend {first_txid} in node1 mempool");

    // second spend: same inputs, transfer redirected to wallet2, re-signed
    let mut t2 = t1.clone();
    t2.set_output_script(1, spending_script_for(wallet2.address()))?;
    wallet1.sign(&mut t2)?;

    ensure(
        t2.input_script(0) != t1.input_script(0),
        "mutation changed the unlocking scripts",
    )?;
    let second_txid = t2.txid()?;
    ensure(second_txid != first_txid, "mutation changed the id")?;

    let submitted = wallet2.submit(&t2).await?;
    ensure(
        submitted == second_txid,
        "node2 accepted the conflicting spend",
    )?;
    log::info!("second spend {second_txid} in node2 mempool");

    // heal the partition and let node2 win with one block; reconnection
    // is slow on a real network, so the request repeats per re-check too
    let outcome = poller
        .wait_for(|| {
            let node1 = node1.clone();
            let peer = peer_addr.to_string();
            async move {
                if let Err(err) = node1.add_node(&peer, AddNodeCommand::Add).await {
                    log::warn!("reconnect request failed, retrying: {err}");
                }
                Ok::<_, RpcError>(!node1.get_peer_info().await?.is_empty())
            }
        })
        .await?;
    ensure(outcome.is_satisfied(), "reconnect observed on node1")?;

    let miner = Address::from_key(&KeyPair::generate());
    node2.generate_to_address(1, &miner.cash_address()).await?;

    // both nodes must converge: the first spend gone, the second known
    let outcome = poller
        .wait_for(|| {
            let node1 = node1.clone();
            let node2 = node2.clone();
            let first = first_txid.clone();
            let second = second_txid.clone();
            async move {
                let evicted1 = matches!(
                    node1.get_raw_transaction(&first).await,
                    Err(RpcError::TxNotFound(_))
                );
                let evicted2 = matches!(
                    node2.get_raw_transaction(&first).await,
                    Err(RpcError::TxNotFound(_))
                );
                let adopted1 = node1.get_raw_transaction(&second).await.is_ok();
                let adopted2 = node2.get_raw_transaction(&second).await.is_ok();
                Ok::<_, RpcError>(evicted1 && evicted2 && adopted1 && adopted2)
            }
        })
        .await?;
    ensure(outcome.is_satisfied(), "nodes converged on the second spend")?;
    log::info!("converged: {first_txid} evicted, {second_txid} adopted");

    // graph search must agree once it has indexed up to the tip
    let target_height = node2.get_blockchain_info().await?.blocks;
    let outcome = poller
        .wait_for(move || async move {
            Ok::<_, RpcError>(graph.get_status().await?.block_height >= target_height)
        })
        .await?;
    ensure(outcome.is_satisfied(), "graph search caught up to the tip")?;

    ensure(
        graph.trusted_validation_for(&second_txid).await?,
        "graph search validates the winner",
    )?;
    let dag = graph.graph_search_for(&second_txid).await?;

    // drop the stale views that still contain the evicted spend
    wallet1.refresh().await?;
    wallet2.refresh().await?;

    Ok(DoubleSpendReport {
        first_txid,
        second_txid,
        dag_size: dag.len(),
    })
}
