use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncRead};

use crate::{
    error::{AppError, Result},
    storage::Storage,
};

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        std::fs::create_dir_all(&base_path)
            .map_err(|e| AppError::Storage(format!("failed to create storage directory: {}", e)))?;

        Ok(Self { base_path })
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(key);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("failed to create directory: {}", e)))?;
        }

        fs::write(&full_path, data)
            .await
            .map_err(|e| AppError::Storage(format!("failed to write {}: {}", key, e)))?;

        Ok(())
    }

    async fn open(&self, key: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let full_path = self.full_path(key);

        let file = fs::File::open(&full_path)
            .await
            .map_err(|e| AppError::Storage(format!("failed to open {}: {}", key, e)))?;

        Ok(Box::new(file))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.full_path(key);

        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(key, "delete for key with no backing bytes");
                Ok(())
            }
            Err(e) => Err(AppError::Storage(format!(
                "failed to delete {}: {}",
                key, e
            ))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.full_path(key).exists())
    }
}
