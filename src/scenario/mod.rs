//! Scenario orchestration
//!
//! Multi-node flows built from the wallet layer:
//! - Convergence polling with optional deadlines
//! - Notification feed observation
//! - The double-spend conflict and long mint-chain runs

pub mod doublespend;
pub mod notify;
pub mod poll;

pub use doublespend::{run_double_spend, run_long_mint_chain, DoubleSpendReport, ScenarioError};
pub use notify::{spawn_listener, ObservedIds};
pub use poll::{PollOutcome, Poller};
