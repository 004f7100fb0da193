//! Storage traits for array schemas and fragments.
//!
//! The array layer persists schemas and fragments as opaque byte blobs
//! addressed by URI-like string keys. Apps provide the implementation; the
//! in-memory [`MemoryStorage`] ships here for tests and embedded use.
//!
//! Keys are laid out as `<array_uri>/__schema` and
//! `<array_uri>/__fragments/<fragment_name>`.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

/// Read-only access to stored data
#[async_trait]
pub trait StorageRead: Debug + Send + Sync {
    /// Read the blob at `address`
    async fn read_bytes(&self, address: &str) -> Result<Vec<u8>>;

    /// True when a blob exists at `address`
    async fn exists(&self, address: &str) -> Result<bool>;

    /// List all addresses starting with `prefix`
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Mutating storage operations
#[async_trait]
pub trait StorageWrite: StorageRead {
    /// Write a blob at `address`, replacing any existing blob
    async fn write_bytes(&self, address: &str, bytes: &[u8]) -> Result<()>;

    /// Delete the blob at `address` (idempotent)
    async fn delete(&self, address: &str) -> Result<()>;
}

/// Marker trait combining the storage capabilities the array layer needs
pub trait Storage: StorageRead + StorageWrite {}

impl<S: StorageRead + StorageWrite> Storage for S {}

/// Storage key of an array's schema blob
pub fn schema_address(array_uri: &str) -> String {
    format!("{}/__schema", array_uri)
}

/// Storage key prefix of an array's fragments
pub fn fragment_prefix(array_uri: &str) -> String {
    format!("{}/__fragments/", array_uri)
}

/// Storage key of one fragment blob
pub fn fragment_address(array_uri: &str, fragment_name: &str) -> String {
    format!("{}/__fragments/{}", array_uri, fragment_name)
}

/// A simple in-memory storage
///
/// Stores blobs in a HashMap behind `Arc<RwLock<...>>` so reads and writes
/// both work through a shared handle.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    data: Arc<RwLock<std::collections::HashMap<String, Vec<u8>>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create a new empty memory storage
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(std::collections::HashMap::new())),
        }
    }
}

#[async_trait]
impl StorageRead for MemoryStorage {
    async fn read_bytes(&self, address: &str) -> Result<Vec<u8>> {
        self.data
            .read()
            .expect("RwLock poisoned")
            .get(address)
            .cloned()
            .ok_or_else(|| Error::not_found(address))
    }

    async fn exists(&self, address: &str) -> Result<bool> {
        Ok(self
            .data
            .read()
            .expect("RwLock poisoned")
            .contains_key(address))
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let data = self.data.read().expect("RwLock poisoned");
        let mut keys: Vec<String> = data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl StorageWrite for MemoryStorage {
    async fn write_bytes(&self, address: &str, bytes: &[u8]) -> Result<()> {
        self.data
            .write()
            .expect("RwLock poisoned")
            .insert(address.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, address: &str) -> Result<()> {
        // Idempotent: ok even if not found
        self.data.write().expect("RwLock poisoned").remove(address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        storage.write_bytes("a/1", b"one").await.unwrap();
        storage.write_bytes("a/2", b"two").await.unwrap();
        storage.write_bytes("b/1", b"other").await.unwrap();

        assert_eq!(storage.read_bytes("a/1").await.unwrap(), b"one");
        assert!(storage.exists("a/2").await.unwrap());
        assert!(!storage.exists("a/3").await.unwrap());
        assert_eq!(
            storage.list_prefix("a/").await.unwrap(),
            vec!["a/1".to_string(), "a/2".to_string()]
        );

        storage.delete("a/1").await.unwrap();
        assert!(!storage.exists("a/1").await.unwrap());
        assert!(matches!(
            storage.read_bytes("a/1").await,
            Err(Error::NotFound(_))
        ));
    }
}
