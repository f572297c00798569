//! Local filesystem backend: `<root>/perfil=<id>/data=<YYYY-MM-DD>.parquet`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::PartitionBackend;
use crate::types::{LedgerResult, PartitionKey};

/// Backend rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of the unit for `key`.
    pub fn path_for(&self, key: &PartitionKey) -> PathBuf {
        self.root
            .join(format!("perfil={}", key.profile_id))
            .join(format!("data={}.parquet", key.date.format("%Y-%m-%d")))
    }

    async fn write_durable(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(contents).await?;
        file.sync_all().await
    }

    /// First backup name that is not taken: `.bak`, then `.bak.1`, `.bak.2`, ...
    async fn free_backup_path(path: &Path) -> LedgerResult<PathBuf> {
        let base = format!("{}.bak", path.display());
        let mut candidate = PathBuf::from(&base);
        let mut n = 0u32;
        while tokio::fs::try_exists(&candidate).await? {
            n += 1;
            candidate = PathBuf::from(format!("{base}.{n}"));
        }
        Ok(candidate)
    }
}

#[async_trait]
impl PartitionBackend for LocalBackend {
    async fn fetch(&self, key: &PartitionKey) -> LedgerResult<Option<Bytes>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            // A zero-length file never held a committed partition.
            Ok(contents) if contents.is_empty() => Ok(None),
            Ok(contents) => Ok(Some(Bytes::from(contents))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &PartitionKey, contents: Bytes) -> LedgerResult<String> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
            debug!(dir = %parent.display(), "partition directory ready");
        }

        // Write beside the target, flush to disk, then rename over it.
        let temp_path = path.with_extension("parquet.tmp");
        if let Err(e) = Self::write_durable(&temp_path, &contents).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(path.display().to_string())
    }

    async fn quarantine(&self, key: &PartitionKey) -> LedgerResult<Option<String>> {
        let path = self.path_for(key);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let backup = Self::free_backup_path(&path).await?;
        tokio::fs::rename(&path, &backup).await?;
        Ok(Some(backup.display().to_string()))
    }

    fn locate(&self, key: &PartitionKey) -> String {
        self.path_for(key).display().to_string()
    }
}
