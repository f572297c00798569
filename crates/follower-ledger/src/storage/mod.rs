//! Partitioned append store for follower observations.
//!
//! One physical unit per `(profile, UTC day)`. Appending is a
//! read-modify-overwrite of the whole unit: fetch it, decode it, push the new
//! row, encode everything again and replace the unit. A unit that cannot be
//! decoded is quarantined and the day starts over with just the new row.
//!
//! The merge logic here is identical for every backend; backends only know
//! how to fetch, replace and quarantine raw bytes.

pub mod local;
pub mod object;

pub use local::LocalBackend;
pub use object::ObjectStoreBackend;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::codec::{RowReader, RowWriter};
use crate::types::{LedgerResult, Observation, PartitionKey};

/// Raw byte access to partition units.
#[async_trait]
pub trait PartitionBackend: Send + Sync {
    /// Contents of the unit at `key`, or `None` when it does not exist.
    async fn fetch(&self, key: &PartitionKey) -> LedgerResult<Option<Bytes>>;

    /// Replace the unit at `key` with `contents`. Returns its location.
    async fn put(&self, key: &PartitionKey, contents: Bytes) -> LedgerResult<String>;

    /// Move an unreadable unit out of the way, keeping its bytes under a
    /// backup name. Returns the backup location when one was made.
    async fn quarantine(&self, key: &PartitionKey) -> LedgerResult<Option<String>>;

    /// Human-readable location of the unit at `key` (path or URI).
    fn locate(&self, key: &PartitionKey) -> String;
}

#[async_trait]
impl<T: PartitionBackend + ?Sized> PartitionBackend for Arc<T> {
    async fn fetch(&self, key: &PartitionKey) -> LedgerResult<Option<Bytes>> {
        (**self).fetch(key).await
    }

    async fn put(&self, key: &PartitionKey, contents: Bytes) -> LedgerResult<String> {
        (**self).put(key, contents).await
    }

    async fn quarantine(&self, key: &PartitionKey) -> LedgerResult<Option<String>> {
        (**self).quarantine(key).await
    }

    fn locate(&self, key: &PartitionKey) -> String {
        (**self).locate(key)
    }
}

/// Backend-agnostic append/read over a [`PartitionBackend`].
pub struct PartitionedStore {
    backend: Box<dyn PartitionBackend>,
}

impl PartitionedStore {
    pub fn new(backend: impl PartitionBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn from_boxed(backend: Box<dyn PartitionBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn PartitionBackend {
        self.backend.as_ref()
    }

    /// Append one observation to its day's partition and return the unit's location.
    pub async fn append(
        &self,
        timestamp: DateTime<Utc>,
        profile_id: &str,
        follower_count: u64,
    ) -> LedgerResult<String> {
        let observation = Observation::new(timestamp, profile_id, follower_count);
        let key = observation.partition_key();

        let mut rows = self.load_for_append(&key).await?;
        rows.push(observation);

        let contents = RowWriter::encode(&rows)?;
        let size = contents.len();
        let location = self.backend.put(&key, contents).await?;
        info!(partition = %key, rows = rows.len(), bytes = size, location = %location, "partition written");
        Ok(location)
    }

    /// Every observation stored for `profile_id` on `date`, in append order.
    pub async fn read(&self, profile_id: &str, date: NaiveDate) -> LedgerResult<Vec<Observation>> {
        let key = PartitionKey::new(profile_id, date);
        match self.backend.fetch(&key).await? {
            Some(contents) => RowReader::decode(contents),
            None => Ok(Vec::new()),
        }
    }

    pub fn locate(&self, profile_id: &str, date: NaiveDate) -> String {
        self.backend.locate(&PartitionKey::new(profile_id, date))
    }

    async fn load_for_append(&self, key: &PartitionKey) -> LedgerResult<Vec<Observation>> {
        let Some(contents) = self.backend.fetch(key).await? else {
            return Ok(Vec::new());
        };

        match RowReader::decode(contents) {
            Ok(rows) => Ok(rows),
            Err(decode_err) => {
                match self.backend.quarantine(key).await {
                    Ok(Some(backup)) => warn!(
                        partition = %key,
                        error = %decode_err,
                        backup = %backup,
                        "unreadable partition quarantined, starting fresh"
                    ),
                    Ok(None) => warn!(
                        partition = %key,
                        error = %decode_err,
                        "unreadable partition will be replaced, no backup kept"
                    ),
                    Err(e) => warn!(
                        partition = %key,
                        error = %decode_err,
                        quarantine_error = %e,
                        "unreadable partition could not be quarantined, starting fresh"
                    ),
                }
                Ok(Vec::new())
            }
        }
    }
}
