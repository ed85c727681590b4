//! Durable byte storage for uploaded workbooks
//!
//! Paths are relative keys such as `products/<uuid>.xlsx`. The local backend
//! maps them under a root directory; the memory backend keeps them in a map.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::sync::Mutex;

/// Bytes in, bytes out, keyed by relative path
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> io::Result<()>;

    /// Read a stored file. A missing file is `ErrorKind::NotFound`.
    async fn get(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Remove a stored file. Removing a missing file is not an error.
    async fn delete(&self, path: &str) -> io::Result<()>;

    async fn exists(&self, path: &str) -> io::Result<bool>;
}

/// Files under a root directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a storage key to a path under the root, refusing anything that
    /// could escape it
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let is_plain = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !is_plain {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid storage path: {}", path),
            ));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn put(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        log::debug!("Stored {} bytes at {}", bytes.len(), full.display());
        Ok(())
    }

    async fn get(&self, path: &str) -> io::Result<Vec<u8>> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full).await
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => {
                log::debug!("Deleted {}", full.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn exists(&self, path: &str) -> io::Result<bool> {
        let full = self.resolve(path)?;
        tokio::fs::try_exists(&full).await
    }
}

/// In-process storage for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.files.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.lock().await.is_empty()
    }
}

#[async_trait]
impl FileStorage for MemoryStorage {
    async fn put(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        self.files
            .lock()
            .await
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no file at {}", path)))
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        self.files.lock().await.remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> io::Result<bool> {
        Ok(self.files.lock().await.contains_key(path))
    }
}
