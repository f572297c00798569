//! Object storage backend: `<prefix>/perfil=<id>/data=<YYYY-MM-DD>.parquet` in a bucket.
//!
//! Production uses S3 via [`ObjectStoreBackend::s3`]; anything implementing
//! [`ObjectStore`] works, which is how the tests run against memory.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::{error, warn};

use super::PartitionBackend;
use crate::types::{LedgerResult, PartitionKey};

/// Region used when the environment does not name one.
pub const DEFAULT_REGION: &str = "us-east-1";

pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: &str, prefix: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// S3 bucket with credentials from the standard AWS environment variables.
    pub fn s3(bucket: &str, prefix: &str) -> LedgerResult<Self> {
        let region = std::env::var("AWS_REGION")
            .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|_| DEFAULT_REGION.to_string());
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(region)
            .build()?;
        Ok(Self::new(Arc::new(store), bucket, prefix))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Object key for `key`, under the prefix when there is one.
    pub fn object_key(&self, key: &PartitionKey) -> String {
        if self.prefix.is_empty() {
            key.relative_path()
        } else {
            format!("{}/{}", self.prefix, key.relative_path())
        }
    }

    fn object_path(&self, key: &PartitionKey) -> ObjectPath {
        ObjectPath::from(self.object_key(key))
    }

    /// First backup key that is not taken: `.bak`, then `.bak.1`, `.bak.2`, ...
    async fn free_backup_key(&self, key: &PartitionKey) -> LedgerResult<String> {
        let base = format!("{}.bak", self.object_key(key));
        let mut candidate = base.clone();
        let mut n = 0u32;
        loop {
            match self.store.head(&ObjectPath::from(candidate.clone())).await {
                Err(object_store::Error::NotFound { .. }) => return Ok(candidate),
                Err(e) => return Err(e.into()),
                Ok(_) => {
                    n += 1;
                    candidate = format!("{base}.{n}");
                }
            }
        }
    }
}

#[async_trait]
impl PartitionBackend for ObjectStoreBackend {
    async fn fetch(&self, key: &PartitionKey) -> LedgerResult<Option<Bytes>> {
        match self.store.get(&self.object_path(key)).await {
            Ok(result) => {
                let contents = result.bytes().await?;
                Ok((!contents.is_empty()).then_some(contents))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => {
                if is_access_error(&e) {
                    warn!(
                        bucket = %self.bucket,
                        "read access denied; the collector needs s3:GetObject on this bucket"
                    );
                }
                Err(e.into())
            }
        }
    }

    async fn put(&self, key: &PartitionKey, contents: Bytes) -> LedgerResult<String> {
        let path = self.object_path(key);
        if let Err(e) = self.store.put(&path, PutPayload::from(contents)).await {
            if is_access_error(&e) {
                error!(
                    bucket = %self.bucket,
                    "write access denied; the collector needs s3:PutObject and s3:GetObject on this bucket"
                );
            }
            return Err(e.into());
        }
        Ok(self.locate(key))
    }

    async fn quarantine(&self, key: &PartitionKey) -> LedgerResult<Option<String>> {
        let backup_key = self.free_backup_key(key).await?;
        self.store
            .copy(&self.object_path(key), &ObjectPath::from(backup_key.clone()))
            .await?;
        Ok(Some(format!("s3://{}/{}", self.bucket, backup_key)))
    }

    fn locate(&self, key: &PartitionKey) -> String {
        format!("s3://{}/{}", self.bucket, self.object_key(key))
    }
}

fn is_access_error(e: &object_store::Error) -> bool {
    matches!(
        e,
        object_store::Error::PermissionDenied { .. } | object_store::Error::Unauthenticated { .. }
    )
}
