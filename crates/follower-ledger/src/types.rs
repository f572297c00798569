//! Core data types for follower observations and their partitions.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};

/// A single follower-count measurement for one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub profile_id: String,
    pub follower_count: u64,
}

impl Observation {
    /// `timestamp` is kept at microsecond precision, the precision it is stored with.
    pub fn new(
        timestamp: DateTime<Utc>,
        profile_id: impl Into<String>,
        follower_count: u64,
    ) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(6),
            profile_id: profile_id.into(),
            follower_count,
        }
    }

    /// The partition this observation belongs to.
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(&self.profile_id, self.timestamp.date_naive())
    }
}

/// Storage unit key: one profile, one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub profile_id: String,
    pub date: NaiveDate,
}

impl PartitionKey {
    pub fn new(profile_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            profile_id: profile_id.into(),
            date,
        }
    }

    /// Key for the UTC day containing `timestamp`.
    pub fn for_timestamp(profile_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(profile_id, timestamp.date_naive())
    }

    /// Hive-style relative path: `perfil=<id>/data=<YYYY-MM-DD>.parquet`.
    pub fn relative_path(&self) -> String {
        format!(
            "perfil={}/data={}.parquet",
            self.profile_id,
            self.date.format("%Y-%m-%d")
        )
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "perfil={}/data={}", self.profile_id, self.date.format("%Y-%m-%d"))
    }
}

/// Errors that can occur in the ledger library.
#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Convenience result type.
pub type LedgerResult<T> = Result<T, LedgerError>;
