//! # Beacon Core
//!
//! Core building blocks for a node of a threshold relay random beacon.
//!
//! Nodes periodically run distributed key generation to form signing groups,
//! then use those groups to produce verifiable relay entries on a fixed
//! cadence. This crate provides:
//! - A Pedersen commitment scheme used inside DKG
//! - The DKG result model that groups vote on via the chain
//! - A persistent registry of the groups this node is a member of
//! - A relay entry timeout monitor
//!
//! ## Example
//!
//! ```rust,ignore
//! use beacon_core::chain::{BlockCounter, LocalChain};
//! use beacon_core::relay::{MonitorOutcome, Node};
//! use beacon_core::ChainConfig;
//! use std::sync::Arc;
//!
//! let config = ChainConfig::default();
//! let chain = LocalChain::new(config.clone());
//! let node = Node::new(chain.block_counter());
//!
//! let start = chain.block_counter().current_block().await?;
//! let monitor = node.monitor_relay_entry(Arc::new(chain.clone()), start, &config);
//!
//! chain.block_counter().mine_to(start + config.relay_entry_timeout);
//! assert_eq!(monitor.await??, MonitorOutcome::TimedOut);
//! ```

pub mod chain;
pub mod commitment;
pub mod dkg;
pub mod error;
pub mod net;
pub mod operator;
pub mod registry;
pub mod relay;
pub mod types;

pub use error::{Error, Result};
pub use types::{ChainConfig, MemberIndex, ThresholdSigner};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default relay entry timeout, in blocks
pub const DEFAULT_RELAY_ENTRY_TIMEOUT: u64 = 15;
