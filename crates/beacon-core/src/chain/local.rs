//! In-memory chain implementation for testing

use super::{
    async_trait, BlockCounter, BlockHeight, GroupRegistrationInterface, RelayChain,
    RelayEntrySubmitted,
};
use crate::{ChainConfig, Error, Result};
use dashmap::DashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Block counter whose height only moves when blocks are mined
#[derive(Debug)]
pub struct LocalBlockCounter {
    height: watch::Sender<BlockHeight>,
}

impl LocalBlockCounter {
    /// Create a counter at height zero
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a counter at `height`
    pub fn starting_at(height: BlockHeight) -> Self {
        let (height, _) = watch::channel(height);
        Self { height }
    }

    /// Mine one block, returning the new height
    pub fn mine(&self) -> BlockHeight {
        let mut mined = 0;
        self.height.send_modify(|height| {
            *height += 1;
            mined = *height;
        });
        mined
    }

    /// Mine blocks until the chain reaches `target`
    pub fn mine_to(&self, target: BlockHeight) {
        self.height.send_if_modified(|height| {
            if *height < target {
                *height = target;
                true
            } else {
                false
            }
        });
    }

    /// Mine one block every `interval` until `shutdown` flips
    pub fn spawn_ticker(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let counter = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        let height = counter.mine();
                        debug!(height, "Block mined");
                    }
                }
            }
        })
    }
}

impl Default for LocalBlockCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockCounter for LocalBlockCounter {
    async fn current_block(&self) -> Result<BlockHeight> {
        Ok(*self.height.borrow())
    }

    async fn wait_for_block_height(&self, height: BlockHeight) -> Result<()> {
        let mut rx = self.height.subscribe();
        rx.wait_for(|current| *current >= height)
            .await
            .map_err(|_| Error::BlockCounter("block counter closed".into()))?;
        Ok(())
    }
}

/// In-memory beacon chain
///
/// Records submitted entries and timeout reports so they can be inspected,
/// and answers stale group queries from a configurable set.
#[derive(Clone)]
pub struct LocalChain {
    config: ChainConfig,
    block_counter: Arc<LocalBlockCounter>,
    submissions: broadcast::Sender<RelayEntrySubmitted>,
    entries: Arc<Mutex<Vec<RelayEntrySubmitted>>>,
    timeout_reports: Arc<Mutex<Vec<u64>>>,
    stale_groups: Arc<DashSet<Vec<u8>>>,
}

impl LocalChain {
    /// Create a chain at height zero
    pub fn new(config: ChainConfig) -> Self {
        Self::with_block_counter(config, Arc::new(LocalBlockCounter::new()))
    }

    /// Create a chain driven by an existing block counter
    pub fn with_block_counter(config: ChainConfig, block_counter: Arc<LocalBlockCounter>) -> Self {
        let (submissions, _) = broadcast::channel(100);
        Self {
            config,
            block_counter,
            submissions,
            entries: Arc::new(Mutex::new(Vec::new())),
            timeout_reports: Arc::new(Mutex::new(Vec::new())),
            stale_groups: Arc::new(DashSet::new()),
        }
    }

    /// Chain configuration
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Block counter of this chain
    pub fn block_counter(&self) -> Arc<LocalBlockCounter> {
        Arc::clone(&self.block_counter)
    }

    /// Mine a block every `block_time_ms` until `shutdown` flips
    pub fn spawn_miner(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let block_time = Duration::from_millis(self.config.block_time_ms);
        self.block_counter.spawn_ticker(block_time, shutdown)
    }

    /// Mark a group as retired
    pub fn mark_stale(&self, group_public_key: &[u8]) {
        self.stale_groups.insert(group_public_key.to_vec());
    }

    /// All relay entries submitted so far
    pub fn relay_entries(&self) -> Vec<RelayEntrySubmitted> {
        lock(&self.entries).clone()
    }

    /// All relay entry timeouts reported so far, in blocks
    pub fn get_report_relay_entry_timeouts(&self) -> Vec<u64> {
        lock(&self.timeout_reports).clone()
    }
}

#[async_trait]
impl RelayChain for LocalChain {
    async fn submit_relay_entry(&self, value: &[u8]) -> Result<()> {
        let block_number = self.block_counter.current_block().await?;
        let event = RelayEntrySubmitted {
            value: value.to_vec(),
            block_number,
        };

        lock(&self.entries).push(event.clone());
        // No subscribers is fine
        let _ = self.submissions.send(event);

        info!(block_number, value = hex::encode(value), "Relay entry submitted");
        Ok(())
    }

    fn on_relay_entry_submitted(&self) -> broadcast::Receiver<RelayEntrySubmitted> {
        self.submissions.subscribe()
    }

    async fn report_relay_entry_timeout(&self, relay_entry_timeout: u64) -> Result<()> {
        lock(&self.timeout_reports).push(relay_entry_timeout);
        Ok(())
    }
}

#[async_trait]
impl GroupRegistrationInterface for LocalChain {
    async fn is_stale_group(&self, group_public_key: &[u8]) -> Result<bool> {
        Ok(self.stale_groups.contains(group_public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Let spawned tasks run until they are all idle
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_counter_wait() {
        let counter = Arc::new(LocalBlockCounter::new());

        let waiter = {
            let counter = Arc::clone(&counter);
            tokio::spawn(async move { counter.wait_for_block_height(3).await })
        };

        counter.mine();
        counter.mine();
        settle().await;
        assert!(!waiter.is_finished());

        assert_eq!(counter.mine(), 3);
        settle().await;
        assert!(waiter.is_finished());
        waiter.await.unwrap().unwrap();
        assert_eq!(counter.current_block().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_wait_for_past_height() {
        let counter = LocalBlockCounter::starting_at(10);
        counter.wait_for_block_height(5).await.unwrap();

        counter.mine_to(8);
        assert_eq!(counter.current_block().await.unwrap(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker() {
        let counter = Arc::new(LocalBlockCounter::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ticker = counter.spawn_ticker(Duration::from_millis(100), shutdown_rx);
        counter.wait_for_block_height(5).await.unwrap();

        shutdown_tx.send(true).unwrap();
        ticker.await.unwrap();
        assert!(counter.current_block().await.unwrap() >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_miner_uses_block_time() {
        let config = ChainConfig {
            block_time_ms: 200,
            ..ChainConfig::default()
        };
        let chain = LocalChain::new(config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let started = tokio::time::Instant::now();
        let miner = chain.spawn_miner(shutdown_rx);
        chain.block_counter().wait_for_block_height(5).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1200));
        assert_eq!(chain.config().block_time_ms, 200);

        shutdown_tx.send(true).unwrap();
        miner.await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_relay_entry() {
        let chain = LocalChain::new(ChainConfig::default());
        let mut submissions = chain.on_relay_entry_submitted();

        chain.block_counter().mine_to(7);
        chain.submit_relay_entry(&[1, 2, 3]).await.unwrap();

        let event = submissions.recv().await.unwrap();
        assert_eq!(event.value, vec![1, 2, 3]);
        assert_eq!(event.block_number, 7);
        assert_eq!(chain.relay_entries(), vec![event]);
    }

    #[tokio::test]
    async fn test_stale_groups() {
        let chain = LocalChain::new(ChainConfig::default());

        chain.mark_stale(&[1, 2]);

        assert!(chain.is_stale_group(&[1, 2]).await.unwrap());
        assert!(!chain.is_stale_group(&[3]).await.unwrap());
    }

    #[tokio::test]
    async fn test_timeout_reports() {
        let chain = LocalChain::new(ChainConfig::default());
        assert!(chain.get_report_relay_entry_timeouts().is_empty());

        chain.report_relay_entry_timeout(15).await.unwrap();
        assert_eq!(chain.get_report_relay_entry_timeouts(), vec![15]);
    }
}
