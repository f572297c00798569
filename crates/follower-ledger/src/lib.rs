//! Follower Ledger: follower-count extraction and partitioned Parquet history.
//!
//! The pipeline is: [`cycle::CycleController`] navigates a [`page::Page`],
//! [`extract::FollowerExtractor`] reads the count (refusing challenge pages
//! via [`challenge::ChallengeDetector`]), and [`storage::PartitionedStore`]
//! appends it to the `(profile, day)` partition on disk or in object storage.

pub mod challenge;
pub mod codec;
pub mod cycle;
pub mod extract;
pub mod page;
pub mod shutdown;
pub mod storage;
pub mod types;

pub use challenge::{ChallengeDetector, ChallengeMarker};
pub use codec::{RowReader, RowWriter};
pub use cycle::{CycleConfig, CycleController, CycleSummary, Jitter, ProfileOutcome};
pub use extract::{ExtractorConfig, FollowerExtractor};
pub use page::{Page, PageError};
pub use shutdown::Shutdown;
pub use storage::{LocalBackend, ObjectStoreBackend, PartitionBackend, PartitionedStore};
pub use types::*;
