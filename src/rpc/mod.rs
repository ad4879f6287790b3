//! External collaborator interfaces
//!
//! The full node, the graph-search indexer, and the raw-transaction fetch
//! are consumed through narrow async traits; the core never talks to a
//! socket directly. The data types mirror the JSON-RPC response shapes the
//! node exposes, with one deliberate difference: currency values are
//! satoshis (`u64`), never floating-point coin units.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[cfg(test)]
pub(crate) mod mock;

/// Payload published on a node's notification feed
#[derive(Debug, Clone)]
pub enum Notification {
    /// Raw bytes of a transaction accepted into the mempool
    RawTx(Vec<u8>),
    /// Raw bytes of a newly connected block
    RawBlock(Vec<u8>),
}

/// Errors surfaced by collaborator calls
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("Transaction not found: {0}")]
    TxNotFound(String),
    #[error("Rejected by node: {0}")]
    Rejected(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// `getblockchaininfo` response subset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockchainInfo {
    pub chain: String,
    pub blocks: u64,
    #[serde(rename = "bestblockhash")]
    pub best_block_hash: String,
}

/// `getpeerinfo` entry subset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    pub addr: String,
    /// Whether the connection came from an explicit addnode request
    #[serde(rename = "addnode")]
    pub manually_added: bool,
}

/// `listunspent` entry, with the amount already converted to satoshis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnspentEntry {
    pub txid: String,
    pub vout: u32,
    pub address: String,
    pub value: u64,
}

/// `addnode` subcommand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddNodeCommand {
    Add,
    Remove,
    OneTry,
}

impl AddNodeCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddNodeCommand::Add => "add",
            AddNodeCommand::Remove => "remove",
            AddNodeCommand::OneTry => "onetry",
        }
    }
}

/// Query/command surface of one full node
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError>;
    async fn get_peer_info(&self) -> Result<Vec<PeerEntry>, RpcError>;
    async fn add_node(&self, addr: &str, command: AddNodeCommand) -> Result<(), RpcError>;
    async fn disconnect_node(&self, addr: &str) -> Result<(), RpcError>;
    async fn list_unspent(&self, address: &str) -> Result<Vec<UnspentEntry>, RpcError>;
    async fn get_raw_transaction(&self, txid: &str) -> Result<Vec<u8>, RpcError>;
    /// Broadcast raw bytes; returns the node-assigned transaction id
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, RpcError>;
    async fn generate_to_address(
        &self,
        nblocks: u32,
        address: &str,
    ) -> Result<Vec<String>, RpcError>;
}

/// Raw-transaction lookup, the only node capability the token layer needs
#[async_trait]
pub trait RawTxFetcher: Send + Sync {
    async fn fetch_raw_tx(&self, txid: &str) -> Result<Vec<u8>, RpcError>;
}

/// Adapter exposing a node client as a raw-transaction fetcher
pub struct NodeFetcher(pub Arc<dyn NodeClient>);

#[async_trait]
impl RawTxFetcher for NodeFetcher {
    async fn fetch_raw_tx(&self, txid: &str) -> Result<Vec<u8>, RpcError> {
        self.0.get_raw_transaction(txid).await
    }
}

/// Graph-search indexer status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSearchStatus {
    pub block_height: u64,
}

/// Validation and DAG-query surface of the graph-search service
#[async_trait]
pub trait GraphSearchClient: Send + Sync {
    async fn get_status(&self) -> Result<GraphSearchStatus, RpcError>;
    async fn trusted_validation_for(&self, txid: &str) -> Result<bool, RpcError>;
    /// Raw bytes of the transaction's token ancestry, itself included
    async fn graph_search_for(&self, txid: &str) -> Result<Vec<Vec<u8>>, RpcError>;
}
