//! Registry of the signing groups this node is a member of
//!
//! Memberships are indexed by group public key. A node may hold several
//! memberships in one group when it was selected more than once, so every
//! key maps to a sequence of memberships.
//!
//! One lock guards the whole index. Every operation holds it for its full
//! duration, including the chain round-trips made while pruning stale
//! groups and the storage writes made while registering, so registry
//! operations are linearizable but `get_group` and `register_group` wait
//! while a prune or a durable write is in flight. Storage I/O itself runs on
//! the blocking thread pool, never on a runtime worker.
//!
//! A member index appears at most once per group, both in memory and in
//! storage.

mod storage;

use crate::chain::GroupRegistrationInterface;
use crate::{Error, MemberIndex, Result, ThresholdSigner};
use beacon_persistence::Handle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use storage::Storage;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Membership of this node in one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Threshold signing capability for the group
    pub signer: ThresholdSigner,
    /// Name of the group's broadcast channel
    pub channel_name: String,
}

/// Groups in which this node is a member
pub struct Groups {
    my_groups: Mutex<HashMap<Vec<u8>, Vec<Arc<Membership>>>>,
    relay_chain: Arc<dyn GroupRegistrationInterface>,
    storage: Storage,
}

impl Groups {
    /// Create an empty registry
    pub fn new(
        relay_chain: Arc<dyn GroupRegistrationInterface>,
        persistence: Arc<dyn Handle>,
    ) -> Self {
        Self {
            my_groups: Mutex::new(HashMap::new()),
            relay_chain,
            storage: Storage::new(persistence),
        }
    }

    /// Load memberships saved by previous runs, returning how many were added.
    ///
    /// Memberships already present in the registry are skipped, so loading
    /// twice is harmless.
    #[instrument(skip(self))]
    pub async fn load_from_storage(&self) -> Result<usize> {
        let mut groups = self.my_groups.lock().await;
        let memberships = self.storage.read_all().await?;

        let mut loaded = 0;
        for membership in memberships {
            let group_public_key = membership.signer.group_public_key_bytes().to_vec();
            let group = groups.entry(group_public_key).or_default();
            if find_member(group, membership.signer.member_index()).is_some() {
                continue;
            }
            group.push(Arc::new(membership));
            loaded += 1;
        }

        info!(memberships = loaded, groups = groups.len(), "Group memberships loaded");
        Ok(loaded)
    }

    /// Register a membership in a group that was successfully created.
    ///
    /// The membership is persisted before it becomes visible; if persisting
    /// fails the registry is left unchanged. Registering an identical
    /// membership again is a no-op. A different membership for a member
    /// index already registered in the group is rejected, since it would
    /// replace that member's stored key share.
    pub async fn register_group(&self, signer: ThresholdSigner, channel_name: &str) -> Result<()> {
        let mut groups = self.my_groups.lock().await;

        let group_public_key = signer.group_public_key_bytes().to_vec();
        let membership = Membership {
            signer,
            channel_name: channel_name.to_string(),
        };

        let member_index = membership.signer.member_index();
        if let Some(existing) = groups
            .get(&group_public_key)
            .and_then(|group| find_member(group, member_index))
        {
            if **existing == membership {
                debug!(member_index, "Group membership already registered");
                return Ok(());
            }
            return Err(Error::DuplicateMembership {
                group_public_key: hex::encode(&group_public_key),
                member_index,
            });
        }

        self.storage.save(&membership).await?;

        debug!(
            group_public_key = hex::encode(&group_public_key),
            member_index,
            channel_name,
            "Group membership registered"
        );

        groups
            .entry(group_public_key)
            .or_default()
            .push(Arc::new(membership));

        Ok(())
    }

    /// Memberships in the group with `group_public_key`, empty if none
    pub async fn get_group(&self, group_public_key: &[u8]) -> Vec<Arc<Membership>> {
        let groups = self.my_groups.lock().await;
        groups.get(group_public_key).cloned().unwrap_or_default()
    }

    /// Public keys of all registered groups
    pub async fn group_public_keys(&self) -> Vec<Vec<u8>> {
        let groups = self.my_groups.lock().await;
        let mut keys: Vec<Vec<u8>> = groups.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop every group the chain reports as stale.
    ///
    /// Fail-open policy: when the staleness query fails the group is kept.
    /// Keeping a retired group only wastes memory and disk, while evicting a
    /// live one would lose its signing capability.
    #[instrument(skip(self))]
    pub async fn unregister_deleted_groups(&self) {
        let mut groups = self.my_groups.lock().await;

        let group_public_keys: Vec<Vec<u8>> = groups.keys().cloned().collect();
        for group_public_key in group_public_keys {
            let is_stale_group = match self.relay_chain.is_stale_group(&group_public_key).await {
                Ok(is_stale_group) => is_stale_group,
                Err(e) => {
                    warn!(
                        group_public_key = hex::encode(&group_public_key),
                        error = %e,
                        "Group removal eligibility check failed"
                    );
                    false
                }
            };

            if !is_stale_group {
                continue;
            }

            groups.remove(&group_public_key);
            info!(
                group_public_key = hex::encode(&group_public_key),
                "Unregistering a stale group"
            );

            if let Err(e) = self.storage.archive(&group_public_key).await {
                warn!(
                    group_public_key = hex::encode(&group_public_key),
                    error = %e,
                    "Failed to archive stale group memberships"
                );
            }
        }
    }
}

fn find_member(
    group: &[Arc<Membership>],
    member_index: MemberIndex,
) -> Option<&Arc<Membership>> {
    group
        .iter()
        .find(|membership| membership.signer.member_index() == member_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{async_trait, LocalChain};
    use crate::{ChainConfig, Error};
    use beacon_persistence::{DataDescriptor, MemoryHandle, PersistenceError};
    use k256::{elliptic_curve::Field, Scalar};
    use rand::rngs::OsRng;

    const GROUP_1: [u8; 4] = [100, 150, 200, 250];
    const GROUP_2: [u8; 4] = [101, 151, 201, 251];
    const CHANNEL: &str = "test_channel";

    fn signer(group_public_key: &[u8], member_index: u8) -> ThresholdSigner {
        ThresholdSigner::new(
            member_index,
            group_public_key.to_vec(),
            &Scalar::random(&mut OsRng),
        )
    }

    fn registry(chain: &LocalChain, handle: &MemoryHandle) -> Groups {
        Groups::new(Arc::new(chain.clone()), Arc::new(handle.clone()))
    }

    /// Chain whose staleness queries always fail
    struct UnreachableChain;

    #[async_trait]
    impl GroupRegistrationInterface for UnreachableChain {
        async fn is_stale_group(&self, _group_public_key: &[u8]) -> Result<bool> {
            Err(Error::Chain("connection refused".into()))
        }
    }

    /// Storage that rejects every write
    struct ReadOnlyHandle;

    impl Handle for ReadOnlyHandle {
        fn save(&self, _data: &[u8], directory: &str, _name: &str) -> beacon_persistence::Result<()> {
            Err(PersistenceError::Io {
                path: directory.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }

        fn read_all(&self) -> beacon_persistence::Result<Vec<DataDescriptor>> {
            Ok(Vec::new())
        }

        fn archive(&self, directory: &str) -> beacon_persistence::Result<()> {
            Err(PersistenceError::NotFound(directory.to_string()))
        }
    }

    #[tokio::test]
    async fn test_register_and_get_group() {
        let chain = LocalChain::new(ChainConfig::default());
        let groups = registry(&chain, &MemoryHandle::new());

        let signer = signer(&GROUP_1, 1);
        groups.register_group(signer.clone(), CHANNEL).await.unwrap();

        let memberships = groups.get_group(&GROUP_1).await;
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].signer, signer);
        assert_eq!(memberships[0].channel_name, CHANNEL);
    }

    #[tokio::test]
    async fn test_register_multiple_memberships() {
        let chain = LocalChain::new(ChainConfig::default());
        let groups = registry(&chain, &MemoryHandle::new());

        groups.register_group(signer(&GROUP_1, 1), CHANNEL).await.unwrap();
        groups.register_group(signer(&GROUP_1, 2), CHANNEL).await.unwrap();

        let memberships = groups.get_group(&GROUP_1).await;
        assert_eq!(memberships.len(), 2);
        assert_eq!(memberships[0].signer.member_index(), 1);
        assert_eq!(memberships[1].signer.member_index(), 2);
    }

    #[tokio::test]
    async fn test_get_unknown_group() {
        let chain = LocalChain::new(ChainConfig::default());
        let groups = registry(&chain, &MemoryHandle::new());

        groups.register_group(signer(&GROUP_1, 1), CHANNEL).await.unwrap();

        assert!(groups.get_group(&GROUP_2).await.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_registry_unchanged() {
        let chain = LocalChain::new(ChainConfig::default());
        let groups = Groups::new(Arc::new(chain), Arc::new(ReadOnlyHandle));

        let err = groups
            .register_group(signer(&GROUP_1, 1), CHANNEL)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Persistence(_)));
        assert!(groups.get_group(&GROUP_1).await.is_empty());
        assert!(groups.group_public_keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_from_storage() {
        let chain = LocalChain::new(ChainConfig::default());
        let handle = MemoryHandle::new();

        let first = signer(&GROUP_1, 1);
        let second = signer(&GROUP_1, 2);
        let third = signer(&GROUP_2, 5);
        {
            let groups = registry(&chain, &handle);
            groups.register_group(first.clone(), CHANNEL).await.unwrap();
            groups.register_group(second.clone(), CHANNEL).await.unwrap();
            groups.register_group(third.clone(), "other_channel").await.unwrap();
        }

        // Simulated restart
        let groups = registry(&chain, &handle);
        assert_eq!(groups.load_from_storage().await.unwrap(), 3);

        let memberships = groups.get_group(&GROUP_1).await;
        assert_eq!(memberships.len(), 2);
        assert_eq!(memberships[0].signer, first);
        assert_eq!(memberships[1].signer, second);

        let memberships = groups.get_group(&GROUP_2).await;
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].signer, third);
        assert_eq!(memberships[0].channel_name, "other_channel");
    }

    #[tokio::test]
    async fn test_duplicate_member_index_rejected() {
        let chain = LocalChain::new(ChainConfig::default());
        let handle = MemoryHandle::new();
        let groups = registry(&chain, &handle);

        let first = signer(&GROUP_1, 1);
        groups.register_group(first.clone(), CHANNEL).await.unwrap();

        let err = groups
            .register_group(signer(&GROUP_1, 1), CHANNEL)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateMembership { member_index: 1, .. }));

        // Live registry and storage agree across a restart
        let live = groups.get_group(&GROUP_1).await;
        let restarted = registry(&chain, &handle);
        restarted.load_from_storage().await.unwrap();
        let reloaded = restarted.get_group(&GROUP_1).await;

        assert_eq!(live.len(), 1);
        assert_eq!(reloaded.len(), live.len());
        assert_eq!(reloaded[0].signer, first);
    }

    #[tokio::test]
    async fn test_register_same_membership_twice() {
        let chain = LocalChain::new(ChainConfig::default());
        let handle = MemoryHandle::new();
        let groups = registry(&chain, &handle);

        let signer = signer(&GROUP_1, 3);
        groups.register_group(signer.clone(), CHANNEL).await.unwrap();
        groups.register_group(signer, CHANNEL).await.unwrap();

        assert_eq!(groups.get_group(&GROUP_1).await.len(), 1);

        let restarted = registry(&chain, &handle);
        assert_eq!(restarted.load_from_storage().await.unwrap(), 1);
        assert_eq!(restarted.get_group(&GROUP_1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_load_twice() {
        let chain = LocalChain::new(ChainConfig::default());
        let handle = MemoryHandle::new();
        registry(&chain, &handle)
            .register_group(signer(&GROUP_1, 1), CHANNEL)
            .await
            .unwrap();

        let groups = registry(&chain, &handle);
        assert_eq!(groups.load_from_storage().await.unwrap(), 1);
        assert_eq!(groups.load_from_storage().await.unwrap(), 0);
        assert_eq!(groups.get_group(&GROUP_1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_stale_group() {
        let chain = LocalChain::new(ChainConfig::default());
        let handle = MemoryHandle::new();
        let groups = registry(&chain, &handle);

        groups.register_group(signer(&GROUP_1, 1), CHANNEL).await.unwrap();
        groups.register_group(signer(&GROUP_1, 2), CHANNEL).await.unwrap();
        groups.register_group(signer(&GROUP_2, 1), CHANNEL).await.unwrap();

        chain.mark_stale(&GROUP_1);
        groups.unregister_deleted_groups().await;

        assert!(groups.get_group(&GROUP_1).await.is_empty());
        assert_eq!(groups.get_group(&GROUP_2).await.len(), 1);

        // Stale memberships do not come back after a restart
        assert_eq!(handle.archived_count(), 2);
        let restarted = registry(&chain, &handle);
        assert_eq!(restarted.load_from_storage().await.unwrap(), 1);
        assert!(restarted.get_group(&GROUP_1).await.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_keeps_group_when_chain_fails() {
        let groups = Groups::new(Arc::new(UnreachableChain), Arc::new(MemoryHandle::new()));

        groups.register_group(signer(&GROUP_1, 1), CHANNEL).await.unwrap();
        groups.unregister_deleted_groups().await;

        assert_eq!(groups.get_group(&GROUP_1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_registration() {
        let chain = LocalChain::new(ChainConfig::default());
        let groups = Arc::new(registry(&chain, &MemoryHandle::new()));

        let tasks: Vec<_> = (1..=10u8)
            .map(|member_index| {
                let groups = Arc::clone(&groups);
                tokio::spawn(async move {
                    groups
                        .register_group(signer(&GROUP_1, member_index), CHANNEL)
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(groups.get_group(&GROUP_1).await.len(), 10);
    }
}
