//! Relay entry monitoring
//!
//! After a relay entry is requested, the active group has
//! `relay_entry_timeout` blocks to submit it. Every node watches the chain
//! during that window and reports a timeout if the entry never shows up.

use crate::chain::{BlockCounter, BlockHeight, RelayChain, RelayEntrySubmitted};
use crate::{ChainConfig, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// How a relay entry watch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The entry was submitted before the deadline
    Submitted,
    /// The deadline passed and a timeout was reported
    TimedOut,
    /// The node shut down while watching
    Cancelled,
}

/// Relay side of a beacon node
pub struct Node {
    block_counter: Arc<dyn BlockCounter>,
    shutdown: watch::Receiver<bool>,
}

impl Node {
    /// Create a node that is never shut down
    pub fn new(block_counter: Arc<dyn BlockCounter>) -> Self {
        let (_, shutdown) = watch::channel(false);
        Self::with_shutdown(block_counter, shutdown)
    }

    /// Create a node whose monitors stop once `shutdown` becomes `true`
    pub fn with_shutdown(
        block_counter: Arc<dyn BlockCounter>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            block_counter,
            shutdown,
        }
    }

    /// Watch for a relay entry requested at `start_block_height`.
    ///
    /// Subscribes to submissions before returning, so any entry submitted
    /// after this call is observed. The watch runs on its own task and
    /// ends on the first of: entry submitted, deadline block reached (a
    /// timeout is reported), or shutdown. Block counter errors end the watch
    /// without a report.
    pub fn monitor_relay_entry(
        &self,
        relay_chain: Arc<dyn RelayChain>,
        start_block_height: BlockHeight,
        chain_config: &ChainConfig,
    ) -> JoinHandle<Result<MonitorOutcome>> {
        let submissions = relay_chain.on_relay_entry_submitted();
        let block_counter = Arc::clone(&self.block_counter);
        let shutdown = self.shutdown.clone();
        let relay_entry_timeout = chain_config.relay_entry_timeout;

        tokio::spawn(async move {
            let outcome = watch_relay_entry(
                block_counter,
                relay_chain,
                submissions,
                shutdown,
                start_block_height,
                relay_entry_timeout,
            )
            .await;

            if let Err(e) = &outcome {
                warn!(start_block_height, error = %e, "Relay entry monitoring abandoned");
            }
            outcome
        })
    }
}

#[instrument(skip(block_counter, relay_chain, submissions, shutdown))]
async fn watch_relay_entry(
    block_counter: Arc<dyn BlockCounter>,
    relay_chain: Arc<dyn RelayChain>,
    mut submissions: broadcast::Receiver<RelayEntrySubmitted>,
    mut shutdown: watch::Receiver<bool>,
    start_block_height: BlockHeight,
    relay_entry_timeout: u64,
) -> Result<MonitorOutcome> {
    let deadline = start_block_height.saturating_add(relay_entry_timeout);
    let mut submissions_open = true;

    let deadline_reached = block_counter.wait_for_block_height(deadline);
    tokio::pin!(deadline_reached);

    debug!(deadline, "Watching for relay entry");

    loop {
        tokio::select! {
            biased;

            _ = shutdown_requested(&mut shutdown) => {
                info!("Relay entry monitoring cancelled");
                return Ok(MonitorOutcome::Cancelled);
            }

            submitted = submissions.recv(), if submissions_open => match submitted {
                Ok(entry) if entry.block_number <= deadline => {
                    info!(block_number = entry.block_number, "Relay entry submitted in time");
                    return Ok(MonitorOutcome::Submitted);
                }
                Ok(entry) => {
                    debug!(block_number = entry.block_number, "Ignoring late relay entry");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Entries were submitted while we were not looking
                    info!(skipped, "Relay entry submitted");
                    return Ok(MonitorOutcome::Submitted);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("Relay entry subscription closed, waiting for deadline only");
                    submissions_open = false;
                }
            },

            reached = &mut deadline_reached => {
                reached?;

                warn!(deadline, relay_entry_timeout, "Relay entry timed out, reporting");
                relay_chain.report_relay_entry_timeout(relay_entry_timeout).await?;
                return Ok(MonitorOutcome::TimedOut);
            }
        }
    }
}

/// Resolves once shutdown is requested; never resolves if it cannot be.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
