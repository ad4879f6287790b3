//! Simple Ledger Protocol support
//!
//! The token sub-protocol layered on top of ordinary transactions:
//! - Message codec (GENESIS/MINT/SEND OP_RETURN payloads)
//! - Output classification (plain currency vs typed token outputs)
//! - DAG validity over the raw-transaction fetch

pub mod classify;
pub mod message;
pub mod validate;

pub use classify::{
    facet_for, ClassifyError, SlpValidity, TokenCache, TokenClassifier, TokenFacet, TokenKind,
};
pub use message::{SlpError, SlpMessage, MAX_SEND_OUTPUTS};
pub use validate::DagValidator;
