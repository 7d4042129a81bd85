//! Chain collaborators
//!
//! The node never talks to the ledger directly: every interaction goes
//! through the narrow traits below, so a contract binding and the in-memory
//! [`LocalChain`] are interchangeable.

use crate::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use ::async_trait::async_trait;

/// Block height of the chain
pub type BlockHeight = u64;

/// Emitted when a relay entry lands on-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEntrySubmitted {
    /// Relay entry value
    pub value: Vec<u8>,
    /// Height of the block containing the entry
    pub block_number: BlockHeight,
}

/// Block height oracle
#[async_trait]
pub trait BlockCounter: Send + Sync {
    /// Current block height
    async fn current_block(&self) -> Result<BlockHeight>;

    /// Resolve once the chain reaches `height`.
    ///
    /// Retry on connectivity problems is the implementation's business; an
    /// error means the height will not be observed.
    async fn wait_for_block_height(&self, height: BlockHeight) -> Result<()>;
}

/// Relay operations of the beacon contract
#[async_trait]
pub trait RelayChain: Send + Sync {
    /// Submit a relay entry
    async fn submit_relay_entry(&self, value: &[u8]) -> Result<()>;

    /// Subscribe to relay entry submissions made from now on
    fn on_relay_entry_submitted(&self) -> broadcast::Receiver<RelayEntrySubmitted>;

    /// Report that no relay entry was submitted within `relay_entry_timeout` blocks
    async fn report_relay_entry_timeout(&self, relay_entry_timeout: u64) -> Result<()>;
}

/// Group lifecycle queries of the beacon contract
#[async_trait]
pub trait GroupRegistrationInterface: Send + Sync {
    /// Whether the group has been retired and may be forgotten
    async fn is_stale_group(&self, group_public_key: &[u8]) -> Result<bool>;
}

/// In-memory chain for testing and local simulation
pub mod local;

pub use local::{LocalBlockCounter, LocalChain};
