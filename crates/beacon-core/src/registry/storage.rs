//! Durable membership records

use super::Membership;
use crate::{Error, Result};
use beacon_persistence::Handle;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Maps memberships onto persistence records.
///
/// All memberships of one group share a directory derived from the group
/// public key, so retiring a group archives them together. Handle calls may
/// block on disk I/O and run on the blocking thread pool.
#[derive(Clone)]
pub(crate) struct Storage {
    handle: Arc<dyn Handle>,
}

impl Storage {
    pub(crate) fn new(handle: Arc<dyn Handle>) -> Self {
        Self { handle }
    }

    pub(crate) async fn save(&self, membership: &Membership) -> Result<()> {
        let data = serde_json::to_vec(membership)?;
        let directory = group_directory(membership.signer.group_public_key_bytes());
        let name = format!("membership_{}", membership.signer.member_index());

        self.blocking(move |handle| handle.save(&data, &directory, &name))
            .await
    }

    pub(crate) async fn read_all(&self) -> Result<Vec<Membership>> {
        let records = self.blocking(|handle| handle.read_all()).await?;

        records
            .into_iter()
            .map(|record| {
                serde_json::from_slice(&record.content).map_err(|e| {
                    Error::Deserialization(format!(
                        "membership {}/{}: {}",
                        record.directory, record.name, e
                    ))
                })
            })
            .collect()
    }

    pub(crate) async fn archive(&self, group_public_key: &[u8]) -> Result<()> {
        let directory = group_directory(group_public_key);
        self.blocking(move |handle| handle.archive(&directory))
            .await
    }

    async fn blocking<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Handle) -> beacon_persistence::Result<T> + Send + 'static,
    {
        let handle = Arc::clone(&self.handle);
        let result = tokio::task::spawn_blocking(move || operation(handle.as_ref()))
            .await
            .map_err(|e| Error::Internal(format!("storage task failed: {e}")))?;
        Ok(result?)
    }
}

fn group_directory(group_public_key: &[u8]) -> String {
    hex::encode(Sha256::digest(group_public_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ThresholdSigner;
    use beacon_persistence::MemoryHandle;
    use k256::Scalar;

    fn membership(group_public_key: &[u8], member_index: u8) -> Membership {
        Membership {
            signer: ThresholdSigner::new(
                member_index,
                group_public_key.to_vec(),
                &Scalar::from(7u64),
            ),
            channel_name: "channel".to_string(),
        }
    }

    #[test]
    fn test_group_directory_is_fixed_length() {
        let short = group_directory(&[1]);
        let long = group_directory(&[0xab; 128]);

        assert_eq!(short.len(), 64);
        assert_eq!(long.len(), 64);
        assert_ne!(short, long);
    }

    #[tokio::test]
    async fn test_save_layout() {
        let handle = MemoryHandle::new();
        let storage = Storage::new(Arc::new(handle.clone()));

        storage.save(&membership(&[1, 2, 3], 4)).await.unwrap();

        let records = handle.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].directory, group_directory(&[1, 2, 3]));
        assert_eq!(records[0].name, "membership_4");
    }

    #[tokio::test]
    async fn test_read_all_rejects_corrupt_record() {
        let handle = MemoryHandle::new();
        handle.save(b"not json", "deadbeef", "membership_1").unwrap();

        let storage = Storage::new(Arc::new(handle));
        let err = storage.read_all().await.unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[tokio::test]
    async fn test_archive_group() {
        let handle = MemoryHandle::new();
        let storage = Storage::new(Arc::new(handle.clone()));

        storage.save(&membership(&[1, 2, 3], 1)).await.unwrap();
        storage.archive(&[1, 2, 3]).await.unwrap();

        assert!(storage.read_all().await.unwrap().is_empty());
        assert!(handle.is_archived(&group_directory(&[1, 2, 3])));
        assert!(matches!(
            storage.archive(&[1, 2, 3]).await,
            Err(Error::Persistence(_))
        ));
    }
}
