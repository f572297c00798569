//! Follower Ledger collector: Chromium-driven follower-count collection.

pub mod config;
pub mod doctor;
pub mod renderer;
pub mod show;

pub use config::{load_targets, resolve_storage, StorageTarget};
pub use renderer::chromium::ChromiumPage;
pub use renderer::BrowserOptions;
