//! Object storage port.

/// Key-addressed object storage.
pub trait BlobStore: Send + Sync {
    /// Size of the object in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the object does not exist or cannot be inspected.
    fn head(&self, key: &str) -> anyhow::Result<u64>;

    /// Full object body.
    ///
    /// # Errors
    ///
    /// Returns an error if the object does not exist or cannot be read.
    fn get(&self, key: &str) -> anyhow::Result<Vec<u8>>;

    /// Stores `data` under `key`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be written.
    fn put(&self, key: &str, data: &[u8]) -> anyhow::Result<()>;

    /// Copies an object to a new key.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is missing or the copy fails.
    fn copy(&self, from: &str, to: &str) -> anyhow::Result<()>;

    /// Removes an object. Removing a missing object is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the object exists but cannot be removed.
    fn delete(&self, key: &str) -> anyhow::Result<()>;
}
