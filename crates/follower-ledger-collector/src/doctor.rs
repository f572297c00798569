//! Environment readiness check.

use crate::config::StorageTarget;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use chrono::Utc;
use std::path::Path;

/// Result of a single readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub ok: bool,
    pub message: String,
}

impl Check {
    fn pass(message: String) -> Self {
        Self { ok: true, message }
    }

    fn fail(message: String) -> Self {
        Self { ok: false, message }
    }
}

/// Check that the browser binary can be found.
pub fn check_chromium() -> Check {
    match find_chromium() {
        Some(path) => Check::pass(format!("Chromium found: {}", path.display())),
        None => Check::fail(
            "Chromium NOT found. Install Chrome/Chromium or set FOLLOWER_LEDGER_CHROMIUM_PATH."
                .to_string(),
        ),
    }
}

/// Check that the output directory exists (or can be created) and accepts writes.
pub fn check_local_root(root: &Path) -> Check {
    if let Err(e) = std::fs::create_dir_all(root) {
        return Check::fail(format!("cannot create {}: {e}", root.display()));
    }
    let probe = root.join(".follower-ledger-probe");
    match std::fs::write(&probe, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            Check::pass(format!("output directory writable: {}", root.display()))
        }
        Err(e) => Check::fail(format!("output directory not writable {}: {e}", root.display())),
    }
}

/// Check that the storage target is reachable.
pub async fn check_storage(target: &StorageTarget) -> Check {
    match target {
        StorageTarget::Local { root } => check_local_root(root),
        StorageTarget::S3 { .. } => {
            let store = match target.open() {
                Ok(store) => store,
                Err(e) => return Check::fail(format!("{e:#}")),
            };
            // Reading a partition that should not exist exercises credentials
            // and bucket access without writing anything.
            let probe_date = Utc::now().date_naive();
            match store.read(".doctor-probe", probe_date).await {
                Ok(_) => Check::pass(format!("bucket reachable: {target}")),
                Err(e) => Check::fail(format!("bucket not reachable {target}: {e}")),
            }
        }
    }
}

/// Run every check and print a report. Returns whether everything passed.
pub async fn run(target: &StorageTarget) -> Result<bool> {
    println!("Follower Ledger Doctor");
    println!("======================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let checks = [check_chromium(), check_storage(target).await];
    for check in &checks {
        let mark = if check.ok { "[OK]" } else { "[!!]" };
        println!("{mark} {}", check.message);
    }

    let ready = checks.iter().all(|c| c.ok);
    println!();
    println!("Status: {}", if ready { "READY" } else { "NOT READY" });
    Ok(ready)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_root_is_created_and_writable() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/out");
        let check = check_local_root(&root);
        assert!(check.ok, "{}", check.message);
        assert!(root.is_dir());
        assert!(!root.join(".follower-ledger-probe").exists());
    }

    #[test]
    fn test_local_root_blocked_by_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let check = check_local_root(&blocker.join("out"));
        assert!(!check.ok);
    }
}
