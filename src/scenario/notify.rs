//! Notification feed listener
//!
//! Consumes a node's raw-transaction and raw-block feed and remembers the
//! ids seen, so scenarios can assert that an id was actually announced
//! rather than merely queryable. Ids are always recomputed from the
//! payload bytes; the feed itself is never trusted to label them.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::crypto::{block_hash_hex, txid_hex};
use crate::rpc::Notification;

/// Thread-safe record of ids observed on a feed
#[derive(Default)]
pub struct ObservedIds {
    txids: Mutex<HashSet<String>>,
    block_hashes: Mutex<HashSet<String>>,
}

impl ObservedIds {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_raw_tx(&self, bytes: &[u8]) {
        let txid = txid_hex(bytes);
        log::debug!("feed: transaction {txid}");
        self.txids.lock().expect("feed record poisoned").insert(txid);
    }

    pub fn record_raw_block(&self, bytes: &[u8]) {
        let hash = block_hash_hex(bytes);
        log::debug!("feed: block {hash}");
        self.block_hashes
            .lock()
            .expect("feed record poisoned")
            .insert(hash);
    }

    pub fn has_txid(&self, txid: &str) -> bool {
        self.txids.lock().expect("feed record poisoned").contains(txid)
    }

    pub fn has_block_hash(&self, hash: &str) -> bool {
        self.block_hashes
            .lock()
            .expect("feed record poisoned")
            .contains(hash)
    }

    pub fn txid_count(&self) -> usize {
        self.txids.lock().expect("feed record poisoned").len()
    }
}

/// Drain a notification feed into `observed` until the sender closes
pub fn spawn_listener(
    mut feed: UnboundedReceiver<Notification>,
    observed: Arc<ObservedIds>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = feed.recv().await {
            match event {
                Notification::RawTx(bytes) => observed.record_raw_tx(&bytes),
                Notification::RawBlock(bytes) => observed.record_raw_block(&bytes),
            }
        }
    })
}
