use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::Result;

pub mod local;

pub use local::LocalStorage;

/// Byte store addressed by a generated key. Metadata lives elsewhere; the
/// two are never covered by a shared transaction, which is why callers
/// compensate explicitly on partial failure.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    async fn open(&self, key: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>>;

    /// Idempotent: deleting an absent key is success.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;
}
