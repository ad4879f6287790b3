//! In-process regtest network used by the test suite.
//!
//! Models just enough node behavior for the scenarios: per-node mempools,
//! block generation with coinbase payouts, transaction relay between
//! connected peers, and longest-chain adoption on reconnect with eviction
//! of mempool transactions that conflict with newly confirmed ones. All
//! nodes hang off one `MockNet`, which also fans out raw-transaction and
//! raw-block notifications.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::{address_from_script, spending_script_for, Address, Outpoint, Transaction, TxIn, TxOut, SEQUENCE_FINAL};
use crate::crypto::{block_hash_hex, id_to_internal_bytes, txid_hex};
use crate::slp::{DagValidator, SlpMessage, SlpValidity, TokenCache};

use super::{
    AddNodeCommand, BlockchainInfo, GraphSearchClient, GraphSearchStatus, NodeClient,
    Notification, PeerEntry, RawTxFetcher, RpcError, UnspentEntry,
};

const COINBASE_REWARD: u64 = 5_000_000_000;
const GENESIS_HASH: &str = "regtest-genesis";

struct NodeState {
    mempool: HashMap<String, Vec<u8>>,
    confirmed: HashMap<String, Vec<u8>>,
    /// Block hashes from genesis to tip
    blocks: Vec<String>,
    peers: HashSet<String>,
}

impl NodeState {
    fn new() -> Self {
        Self {
            mempool: HashMap::new(),
            confirmed: HashMap::new(),
            blocks: vec![GENESIS_HASH.to_string()],
            peers: HashSet::new(),
        }
    }

    fn raw_tx(&self, txid: &str) -> Option<&Vec<u8>> {
        self.mempool.get(txid).or_else(|| self.confirmed.get(txid))
    }

    /// Outpoints consumed by any known transaction
    fn spent_outpoints(&self) -> HashSet<Outpoint> {
        let mut spent = HashSet::new();
        for raw in self.mempool.values().chain(self.confirmed.values()) {
            if let Ok(tx) = Transaction::parse(raw) {
                for input in &tx.inputs {
                    spent.insert(input.outpoint());
                }
            }
        }
        spent
    }

    /// Whether `tx` double-spends an outpoint this node already saw spent
    fn conflicts(&self, tx: &Transaction, own_txid: &str) -> bool {
        let mut spent = HashSet::new();
        for (txid, raw) in self.mempool.iter().chain(self.confirmed.iter()) {
            if txid == own_txid {
                continue;
            }
            if let Ok(known) = Transaction::parse(raw) {
                for input in &known.inputs {
                    spent.insert(input.outpoint());
                }
            }
        }
        tx.inputs.iter().any(|input| spent.contains(&input.outpoint()))
    }
}

/// The shared fabric all mock nodes belong to
pub(crate) struct MockNet {
    nodes: Mutex<HashMap<String, NodeState>>,
    listeners: Mutex<Vec<(String, mpsc::UnboundedSender<Notification>)>>,
    block_nonce: Mutex<u64>,
}

impl MockNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            nodes: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            block_nonce: Mutex::new(0),
        })
    }

    /// Create a node on this fabric and return its client handle
    pub fn spawn_node(self: &Arc<Self>, name: &str) -> Arc<MockNode> {
        self.nodes
            .lock()
            .expect("net poisoned")
            .insert(name.to_string(), NodeState::new());
        Arc::new(MockNode {
            net: Arc::clone(self),
            name: name.to_string(),
        })
    }

    /// Subscribe to one node's accepted-transaction and new-block events
    pub fn subscribe(&self, node: &str) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .expect("net poisoned")
            .push((node.to_string(), tx));
        rx
    }

    fn publish(&self, node: &str, event: Notification) {
        let mut listeners = self.listeners.lock().expect("net poisoned");
        listeners.retain(|(name, sender)| name != node || sender.send(event.clone()).is_ok());
    }

    fn next_nonce(&self) -> u64 {
        let mut nonce = self.block_nonce.lock().expect("net poisoned");
        *nonce += 1;
        *nonce
    }

    /// One-way chain adoption: `dst` takes `src`'s chain if it is strictly
    /// longer, then evicts mempool entries confirmed or conflicted by it.
    fn adopt_chain(nodes: &mut HashMap<String, NodeState>, dst: &str, src: &str) {
        let (src_blocks, src_confirmed) = match nodes.get(src) {
            Some(state) => (state.blocks.clone(), state.confirmed.clone()),
            None => return,
        };
        let dst_state = match nodes.get_mut(dst) {
            Some(state) => state,
            None => return,
        };
        if src_blocks.len() <= dst_state.blocks.len() {
            return;
        }

        dst_state.blocks = src_blocks;
        dst_state.confirmed = src_confirmed;

        let mut confirmed_spends = HashSet::new();
        for raw in dst_state.confirmed.values() {
            if let Ok(tx) = Transaction::parse(raw) {
                for input in &tx.inputs {
                    confirmed_spends.insert(input.outpoint());
                }
            }
        }
        let confirmed_ids: HashSet<String> = dst_state.confirmed.keys().cloned().collect();
        dst_state.mempool.retain(|txid, raw| {
            if confirmed_ids.contains(txid) {
                return false;
            }
            match Transaction::parse(raw) {
                Ok(tx) => !tx
                    .inputs
                    .iter()
                    .any(|input| confirmed_spends.contains(&input.outpoint())),
                Err(_) => false,
            }
        });
    }

    /// One-way mempool relay of non-conflicting transactions
    fn relay_mempool(nodes: &mut HashMap<String, NodeState>, src: &str, dst: &str) {
        let pending: Vec<(String, Vec<u8>)> = match nodes.get(src) {
            Some(state) => state
                .mempool
                .iter()
                .map(|(id, raw)| (id.clone(), raw.clone()))
                .collect(),
            None => return,
        };
        let dst_state = match nodes.get_mut(dst) {
            Some(state) => state,
            None => return,
        };
        for (txid, raw) in pending {
            if dst_state.raw_tx(&txid).is_some() {
                continue;
            }
            if let Ok(tx) = Transaction::parse(&raw) {
                if !dst_state.conflicts(&tx, &txid) {
                    dst_state.mempool.insert(txid, raw);
                }
            }
        }
    }

    fn sync_pair(nodes: &mut HashMap<String, NodeState>, a: &str, b: &str) {
        Self::adopt_chain(nodes, a, b);
        Self::adopt_chain(nodes, b, a);
        Self::relay_mempool(nodes, a, b);
        Self::relay_mempool(nodes, b, a);
    }
}

/// Client handle onto one node of a `MockNet`
pub(crate) struct MockNode {
    net: Arc<MockNet>,
    name: String,
}

impl MockNode {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        let nodes = self.net.nodes.lock().expect("net poisoned");
        let state = nodes
            .get(&self.name)
            .ok_or_else(|| RpcError::Transport(format!("unknown node {}", self.name)))?;
        Ok(BlockchainInfo {
            chain: "regtest".to_string(),
            blocks: (state.blocks.len() - 1) as u64,
            best_block_hash: state.blocks.last().cloned().unwrap_or_default(),
        })
    }

    async fn get_peer_info(&self) -> Result<Vec<PeerEntry>, RpcError> {
        let nodes = self.net.nodes.lock().expect("net poisoned");
        let state = nodes
            .get(&self.name)
            .ok_or_else(|| RpcError::Transport(format!("unknown node {}", self.name)))?;
        Ok(state
            .peers
            .iter()
            .map(|addr| PeerEntry {
                addr: addr.clone(),
                manually_added: true,
            })
            .collect())
    }

    async fn add_node(&self, addr: &str, command: AddNodeCommand) -> Result<(), RpcError> {
        let mut nodes = self.net.nodes.lock().expect("net poisoned");
        if !nodes.contains_key(addr) {
            return Err(RpcError::Transport(format!("unknown node {addr}")));
        }
        match command {
            AddNodeCommand::Add | AddNodeCommand::OneTry => {
                if let Some(state) = nodes.get_mut(&self.name) {
                    state.peers.insert(addr.to_string());
                }
                if let Some(state) = nodes.get_mut(addr) {
                    state.peers.insert(self.name.clone());
                }
                MockNet::sync_pair(&mut nodes, &self.name, addr);
            }
            AddNodeCommand::Remove => {
                if let Some(state) = nodes.get_mut(&self.name) {
                    state.peers.remove(addr);
                }
                if let Some(state) = nodes.get_mut(addr) {
                    state.peers.remove(&self.name);
                }
            }
        }
        Ok(())
    }

    async fn disconnect_node(&self, addr: &str) -> Result<(), RpcError> {
        self.add_node(addr, AddNodeCommand::Remove).await
    }

    async fn list_unspent(&self, address: &str) -> Result<Vec<UnspentEntry>, RpcError> {
        let wanted = Address::decode(address)
            .map_err(|err| RpcError::Transport(format!("bad address {address}: {err}")))?;
        let nodes = self.net.nodes.lock().expect("net poisoned");
        let state = nodes
            .get(&self.name)
            .ok_or_else(|| RpcError::Transport(format!("unknown node {}", self.name)))?;

        let spent = state.spent_outpoints();
        let mut entries = Vec::new();
        for (txid, raw) in state.confirmed.iter().chain(state.mempool.iter()) {
            let tx = Transaction::parse(raw)
                .map_err(|err| RpcError::Transport(format!("stored tx unparsable: {err}")))?;
            for (vout, output) in tx.outputs.iter().enumerate() {
                let outpoint = Outpoint::new(txid.clone(), vout as u32);
                if spent.contains(&outpoint) {
                    continue;
                }
                if address_from_script(&output.script) == Some(wanted.clone()) {
                    entries.push(UnspentEntry {
                        txid: txid.clone(),
                        vout: vout as u32,
                        address: address.to_string(),
                        value: output.value,
                    });
                }
            }
        }
        Ok(entries)
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<Vec<u8>, RpcError> {
        let nodes = self.net.nodes.lock().expect("net poisoned");
        nodes
            .get(&self.name)
            .and_then(|state| state.raw_tx(txid))
            .cloned()
            .ok_or_else(|| RpcError::TxNotFound(txid.to_string()))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, RpcError> {
        let tx = Transaction::parse(raw)
            .map_err(|err| RpcError::Rejected(format!("undecodable transaction: {err}")))?;
        let txid = txid_hex(raw);

        let peers = {
            let mut nodes = self.net.nodes.lock().expect("net poisoned");
            let state = nodes
                .get_mut(&self.name)
                .ok_or_else(|| RpcError::Transport(format!("unknown node {}", self.name)))?;
            if state.conflicts(&tx, &txid) {
                return Err(RpcError::Rejected(format!("txn-mempool-conflict {txid}")));
            }
            state.mempool.insert(txid.clone(), raw.to_vec());

            let peers: Vec<String> = state.peers.iter().cloned().collect();
            for peer in &peers {
                MockNet::relay_mempool(&mut nodes, &self.name, peer);
            }
            peers
        };

        self.net.publish(&self.name, Notification::RawTx(raw.to_vec()));
        for peer in peers {
            self.net.publish(&peer, Notification::RawTx(raw.to_vec()));
        }
        Ok(txid)
    }

    async fn generate_to_address(
        &self,
        nblocks: u32,
        address: &str,
    ) -> Result<Vec<String>, RpcError> {
        let payout = Address::decode(address)
            .map_err(|err| RpcError::Transport(format!("bad address {address}: {err}")))?;
        let script = spending_script_for(&payout);

        let mut hashes = Vec::with_capacity(nblocks as usize);
        let mut preimages = Vec::with_capacity(nblocks as usize);
        {
            let mut nodes = self.net.nodes.lock().expect("net poisoned");
            for _ in 0..nblocks {
                let nonce = self.net.next_nonce();
                let state = nodes
                    .get_mut(&self.name)
                    .ok_or_else(|| RpcError::Transport(format!("unknown node {}", self.name)))?;

                // coinbase: null outpoint, nonce in the input script for a
                // unique txid per block
                let coinbase = Transaction {
                    version: 2,
                    inputs: vec![TxIn {
                        prev_txid: "00".repeat(32),
                        prev_vout: u32::MAX,
                        script: nonce.to_le_bytes().to_vec(),
                        sequence: SEQUENCE_FINAL,
                    }],
                    outputs: vec![TxOut {
                        value: COINBASE_REWARD,
                        script: script.clone(),
                    }],
                    locktime: 0,
                };
                let raw = coinbase
                    .serialize()
                    .map_err(|err| RpcError::Transport(err.to_string()))?;
                let coinbase_id = txid_hex(&raw);
                state.confirmed.insert(coinbase_id.clone(), raw);

                // every block confirms the full mempool
                let pending: Vec<String> = state.mempool.keys().cloned().collect();
                for txid in pending {
                    if let Some(bytes) = state.mempool.remove(&txid) {
                        state.confirmed.insert(txid, bytes);
                    }
                }

                let mut preimage = state
                    .blocks
                    .last()
                    .cloned()
                    .unwrap_or_default()
                    .into_bytes();
                preimage.extend_from_slice(coinbase_id.as_bytes());
                let hash = block_hash_hex(&preimage);
                state.blocks.push(hash.clone());
                hashes.push(hash);
                preimages.push(preimage);

                let peers: Vec<String> = state.peers.iter().cloned().collect();
                for peer in peers {
                    MockNet::sync_pair(&mut nodes, &self.name, &peer);
                }
            }
        }

        for preimage in preimages {
            self.net
                .publish(&self.name, Notification::RawBlock(preimage));
        }
        Ok(hashes)
    }
}

#[async_trait]
impl RawTxFetcher for MockNode {
    async fn fetch_raw_tx(&self, txid: &str) -> Result<Vec<u8>, RpcError> {
        self.get_raw_transaction(txid).await
    }
}

// =============================================================================
// Graph search
// =============================================================================

/// Indexer stand-in answering validity and ancestry queries from one node
pub(crate) struct MockGraphSearch {
    node: Arc<MockNode>,
    validator: DagValidator,
}

impl MockGraphSearch {
    pub fn new(node: Arc<MockNode>) -> Self {
        let fetcher: Arc<dyn RawTxFetcher> = node.clone();
        let validator = DagValidator::new(fetcher, TokenCache::new());
        Self { node, validator }
    }
}

#[async_trait]
impl GraphSearchClient for MockGraphSearch {
    async fn get_status(&self) -> Result<GraphSearchStatus, RpcError> {
        let info = self.node.get_blockchain_info().await?;
        Ok(GraphSearchStatus {
            block_height: info.blocks,
        })
    }

    async fn trusted_validation_for(&self, txid: &str) -> Result<bool, RpcError> {
        self.validator
            .is_valid_slp_tx(txid)
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))
    }

    /// Token ancestry of `txid`, itself included: every reachable input
    /// parent carrying a token message, transitively. Plain currency
    /// parents terminate the walk.
    async fn graph_search_for(&self, txid: &str) -> Result<Vec<Vec<u8>>, RpcError> {
        let mut result = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier = vec![txid.to_string()];

        while let Some(current) = frontier.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let raw = match self.node.get_raw_transaction(&current).await {
                Ok(raw) => raw,
                Err(RpcError::TxNotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            let tx = Transaction::parse(&raw)
                .map_err(|err| RpcError::Transport(err.to_string()))?;
            let is_token = tx
                .outputs
                .first()
                .map(|o| SlpMessage::parse(&o.script).is_ok())
                .unwrap_or(false);
            if !is_token {
                continue;
            }
            result.push(raw);
            for input in &tx.inputs {
                // skip the coinbase null outpoint
                if id_to_internal_bytes(&input.prev_txid)
                    .map(|b| b != [0u8; 32])
                    .unwrap_or(false)
                {
                    frontier.push(input.prev_txid.clone());
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::core::PendingTransaction;

    async fn funded_node(net: &Arc<MockNet>, name: &str, key: &KeyPair) -> Arc<MockNode> {
        let node = net.spawn_node(name);
        let address = Address::from_key(key);
        node.generate_to_address(1, &address.cash_address())
            .await
            .unwrap();
        node
    }

    fn spend_coinbase(
        key: &KeyPair,
        coinbase: &UnspentEntry,
        to: &Address,
    ) -> PendingTransaction {
        let own = Address::from_key(key);
        let mut tx = PendingTransaction::new();
        tx.add_input(
            Outpoint::new(coinbase.txid.clone(), coinbase.vout),
            spending_script_for(&own),
        );
        tx.add_output(coinbase.value - 1_000, spending_script_for(to));
        tx.sign(key).unwrap();
        tx
    }

    #[tokio::test]
    async fn test_generate_pays_coinbase_and_advances_chain() {
        let net = MockNet::new();
        let key = KeyPair::generate();
        let node = funded_node(&net, "n1", &key).await;

        let info = node.get_blockchain_info().await.unwrap();
        assert_eq!(info.blocks, 1);

        let address = Address::from_key(&key);
        let unspent = node.list_unspent(&address.cash_address()).await.unwrap();
        assert_eq!(unspent.len(), 1);
        assert_eq!(unspent[0].value, COINBASE_REWARD);
    }

    #[tokio::test]
    async fn test_relay_and_partition() {
        let net = MockNet::new();
        let key = KeyPair::generate();
        let n1 = funded_node(&net, "n1", &key).await;
        let n2 = net.spawn_node("n2");
        n1.add_node("n2", AddNodeCommand::OneTry).await.unwrap();

        // connected: n2 adopted n1's chain
        assert_eq!(n2.get_blockchain_info().await.unwrap().blocks, 1);

        let address = Address::from_key(&key);
        let coinbase = n1.list_unspent(&address.cash_address()).await.unwrap()[0].clone();
        let spend = spend_coinbase(&key, &coinbase, &address);
        let txid = n1
            .send_raw_transaction(&spend.serialize().unwrap())
            .await
            .unwrap();

        // relayed to the connected peer
        assert!(n2.get_raw_transaction(&txid).await.is_ok());

        n1.disconnect_node("n2").await.unwrap();
        assert!(n1.get_peer_info().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_double_spend_resolution_evicts_loser() {
        let net = MockNet::new();
        let key = KeyPair::generate();
        let n1 = funded_node(&net, "n1", &key).await;
        let n2 = net.spawn_node("n2");
        n1.add_node("n2", AddNodeCommand::Add).await.unwrap();
        n1.disconnect_node("n2").await.unwrap();

        let address = Address::from_key(&key);
        let other = Address::from_key(&KeyPair::generate());
        let coinbase = n1.list_unspent(&address.cash_address()).await.unwrap()[0].clone();

        let t1 = spend_coinbase(&key, &coinbase, &address);
        let t2 = spend_coinbase(&key, &coinbase, &other);
        let t1_id = n1
            .send_raw_transaction(&t1.serialize().unwrap())
            .await
            .unwrap();
        let t2_id = n2
            .send_raw_transaction(&t2.serialize().unwrap())
            .await
            .unwrap();
        assert_ne!(t1_id, t2_id);

        n1.add_node("n2", AddNodeCommand::Add).await.unwrap();
        // equal-height chains: both nodes keep their own mempool view
        assert!(n1.get_raw_transaction(&t1_id).await.is_ok());

        let miner = Address::from_key(&KeyPair::generate());
        n2.generate_to_address(1, &miner.cash_address())
            .await
            .unwrap();

        // n1 adopts the longer chain; the conflicting loser is evicted
        assert!(matches!(
            n1.get_raw_transaction(&t1_id).await,
            Err(RpcError::TxNotFound(_))
        ));
        assert!(n1.get_raw_transaction(&t2_id).await.is_ok());
        assert!(n2.get_raw_transaction(&t2_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_conflicting_submission_rejected_locally() {
        let net = MockNet::new();
        let key = KeyPair::generate();
        let node = funded_node(&net, "n1", &key).await;

        let address = Address::from_key(&key);
        let coinbase = node.list_unspent(&address.cash_address()).await.unwrap()[0].clone();
        let first = spend_coinbase(&key, &coinbase, &address);
        let second = spend_coinbase(&key, &coinbase, &Address::from_key(&KeyPair::generate()));

        node.send_raw_transaction(&first.serialize().unwrap())
            .await
            .unwrap();
        assert!(matches!(
            node.send_raw_transaction(&second.serialize().unwrap()).await,
            Err(RpcError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_notifications_carry_accepted_tx_and_block() {
        let net = MockNet::new();
        let key = KeyPair::generate();
        let node = funded_node(&net, "n1", &key).await;
        let mut feed = net.subscribe("n1");

        let address = Address::from_key(&key);
        let coinbase = node.list_unspent(&address.cash_address()).await.unwrap()[0].clone();
        let spend = spend_coinbase(&key, &coinbase, &address);
        let raw = spend.serialize().unwrap();
        let txid = node.send_raw_transaction(&raw).await.unwrap();

        match feed.recv().await.unwrap() {
            Notification::RawTx(bytes) => assert_eq!(txid_hex(&bytes), txid),
            other => panic!("expected rawtx, got {other:?}"),
        }

        let hashes = node
            .generate_to_address(1, &address.cash_address())
            .await
            .unwrap();
        match feed.recv().await.unwrap() {
            Notification::RawBlock(bytes) => assert_eq!(block_hash_hex(&bytes), hashes[0]),
            other => panic!("expected rawblock, got {other:?}"),
        }
    }
}
