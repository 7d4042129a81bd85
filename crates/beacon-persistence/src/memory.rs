//! In-memory storage handle for testing

use crate::{validate_name, DataDescriptor, Handle, PersistenceError, Result};
use dashmap::DashMap;
use std::sync::Arc;

/// Storage handle keeping all records in memory
#[derive(Clone, Default)]
pub struct MemoryHandle {
    /// Live records: (directory, name) -> content
    current: Arc<DashMap<(String, String), Vec<u8>>>,
    /// Archived records: (directory, name) -> content
    archived: Arc<DashMap<(String, String), Vec<u8>>>,
}

impl MemoryHandle {
    /// Create an empty in-memory handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archived records
    pub fn archived_count(&self) -> usize {
        self.archived.len()
    }

    /// Check whether any archived record belongs to `directory`
    pub fn is_archived(&self, directory: &str) -> bool {
        self.archived.iter().any(|entry| entry.key().0 == directory)
    }
}

impl Handle for MemoryHandle {
    fn save(&self, data: &[u8], directory: &str, name: &str) -> Result<()> {
        validate_name(directory)?;
        validate_name(name)?;

        self.current
            .insert((directory.to_string(), name.to_string()), data.to_vec());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<DataDescriptor>> {
        let mut records: Vec<DataDescriptor> = self
            .current
            .iter()
            .map(|entry| DataDescriptor {
                directory: entry.key().0.clone(),
                name: entry.key().1.clone(),
                content: entry.value().clone(),
            })
            .collect();

        records.sort_by(|a, b| (&a.directory, &a.name).cmp(&(&b.directory, &b.name)));
        Ok(records)
    }

    fn archive(&self, directory: &str) -> Result<()> {
        let keys: Vec<(String, String)> = self
            .current
            .iter()
            .filter(|entry| entry.key().0 == directory)
            .map(|entry| entry.key().clone())
            .collect();

        if keys.is_empty() {
            return Err(PersistenceError::NotFound(directory.to_string()));
        }

        for key in keys {
            if let Some((key, content)) = self.current.remove(&key) {
                self.archived.insert(key, content);
            }
        }
        Ok(())
    }
}
