//! Configuration loading and resolution.
//!
//! Values resolve as: explicit flag, then environment variable, then default.

use anyhow::{bail, Context, Result};
use follower_ledger::{LocalBackend, ObjectStoreBackend, PartitionedStore};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const ENV_OUT_DIR: &str = "FOLLOWER_LEDGER_OUT_DIR";
pub const ENV_S3_BUCKET: &str = "FOLLOWER_LEDGER_S3_BUCKET";
pub const ENV_S3_PREFIX: &str = "FOLLOWER_LEDGER_S3_PREFIX";

pub const DEFAULT_OUT_DIR: &str = "data_out";
pub const DEFAULT_S3_PREFIX: &str = "data";

/// Where observations are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    Local { root: PathBuf },
    S3 { bucket: String, prefix: String },
}

impl StorageTarget {
    /// Open the partitioned store for this target.
    pub fn open(&self) -> Result<PartitionedStore> {
        match self {
            StorageTarget::Local { root } => Ok(PartitionedStore::new(LocalBackend::new(root))),
            StorageTarget::S3 { bucket, prefix } => {
                let backend = ObjectStoreBackend::s3(bucket, prefix)
                    .with_context(|| format!("failed to configure S3 bucket '{bucket}'"))?;
                Ok(PartitionedStore::new(backend))
            }
        }
    }
}

impl std::fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageTarget::Local { root } => write!(f, "{}", root.display()),
            StorageTarget::S3 { bucket, prefix } if prefix.is_empty() => write!(f, "s3://{bucket}"),
            StorageTarget::S3 { bucket, prefix } => write!(f, "s3://{bucket}/{prefix}"),
        }
    }
}

/// Pick the storage target. A bucket (flag or env) selects S3, otherwise a local directory.
pub fn resolve_storage(
    out_dir: Option<&str>,
    s3_bucket: Option<&str>,
    s3_prefix: Option<&str>,
) -> StorageTarget {
    let bucket = s3_bucket
        .map(str::to_string)
        .or_else(|| non_empty_env(ENV_S3_BUCKET));

    if let Some(bucket) = bucket {
        let prefix = s3_prefix
            .map(str::to_string)
            .or_else(|| non_empty_env(ENV_S3_PREFIX))
            .unwrap_or_else(|| DEFAULT_S3_PREFIX.to_string());
        return StorageTarget::S3 {
            bucket,
            prefix: prefix.trim_matches('/').to_string(),
        };
    }

    let root = out_dir
        .map(str::to_string)
        .or_else(|| non_empty_env(ENV_OUT_DIR))
        .unwrap_or_else(|| DEFAULT_OUT_DIR.to_string());
    StorageTarget::Local {
        root: PathBuf::from(root),
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Bare handle: trimmed, one leading `@` dropped, inner whitespace removed.
pub fn normalize_handle(raw: &str) -> String {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix('@').unwrap_or(trimmed);
    bare.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Normalize handles, dropping empties and later duplicates.
pub fn parse_targets(contents: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    contents
        .lines()
        .map(normalize_handle)
        .filter(|h| !h.is_empty())
        .filter(|h| seen.insert(h.clone()))
        .collect()
}

/// Load the target list. A missing file or an empty list is an error.
pub fn load_targets(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read(path)
        .with_context(|| format!("failed to read handles file {}", path.display()))?;
    let targets = parse_targets(&String::from_utf8_lossy(&raw));
    if targets.is_empty() {
        bail!("no valid handles found in {}", path.display());
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_handle() {
        assert_eq!(normalize_handle("  @alice  "), "alice");
        assert_eq!(normalize_handle("bob"), "bob");
        assert_eq!(normalize_handle("car ol\t"), "carol");
        assert_eq!(normalize_handle("@@dave"), "@dave");
        assert_eq!(normalize_handle("   "), "");
    }

    #[test]
    fn test_parse_targets_dedups_in_order() {
        let targets = parse_targets("@alice\nbob\n\n  alice \n@bob\ncarol\r\n");
        assert_eq!(targets, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_load_targets_rejects_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handles.txt");
        std::fs::write(&path, "\n   \n@\n").unwrap();
        let err = load_targets(&path).unwrap_err();
        assert!(err.to_string().contains("no valid handles"));
    }

    #[test]
    fn test_load_targets_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_targets(&dir.path().join("absent.txt")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read handles file"));
    }

    #[test]
    fn test_explicit_flags_win() {
        let target = resolve_storage(Some("out"), Some("bucket"), Some("/raw/"));
        assert_eq!(
            target,
            StorageTarget::S3 {
                bucket: "bucket".to_string(),
                prefix: "raw".to_string()
            }
        );
        assert_eq!(target.to_string(), "s3://bucket/raw");

        let local = resolve_storage(Some("out"), None, None);
        if std::env::var(ENV_S3_BUCKET).is_err() {
            assert_eq!(
                local,
                StorageTarget::Local {
                    root: PathBuf::from("out")
                }
            );
        }
    }
}
