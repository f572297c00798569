//! Perpetual measurement loop over a fixed profile list.
//!
//! One page, used sequentially. For each profile: navigate, settle, extract
//! (one retry), persist, pause with jitter. After the list: pause, repeat.
//!
//! Cancellation is checked before every navigation and after every step.
//! Navigation and extraction themselves are never interrupted; pacing sleeps
//! end early when the [`Shutdown`] token fires.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{error, info, warn};

use crate::extract::FollowerExtractor;
use crate::page::Page;
use crate::shutdown::Shutdown;
use crate::storage::PartitionedStore;

/// Default measurement page; `{profile}` is replaced by the profile id.
pub const DEFAULT_URL_TEMPLATE: &str = "https://blastup.com/instagram-follower-count?{profile}";

/// Uniformly random pause between `min` and `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub min: Duration,
    pub max: Duration,
}

impl Jitter {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn fixed(value: Duration) -> Self {
        Self::new(value, value)
    }

    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        let lo_ms = lo.as_millis() as u64;
        let hi_ms = hi.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(lo_ms..=hi_ms))
    }
}

/// Timing and addressing of the loop.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub url_template: String,
    pub navigation_timeout: Duration,
    /// Dwell after a successful navigation, before the first extraction.
    pub settle_wait: Duration,
    /// Pause before the single extraction retry.
    pub retry_wait: Duration,
    /// Pause after a failed navigation.
    pub navigation_jitter: Jitter,
    /// Pause after every profile.
    pub profile_jitter: Jitter,
    /// Pause after the whole list.
    pub cycle_pause: Duration,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            navigation_timeout: Duration::from_secs(30),
            settle_wait: Duration::from_secs(10),
            retry_wait: Duration::from_secs(3),
            navigation_jitter: Jitter::new(Duration::from_secs(2), Duration::from_secs(4)),
            profile_jitter: Jitter::new(Duration::from_millis(1500), Duration::from_secs(3)),
            cycle_pause: Duration::from_secs(20),
        }
    }
}

impl CycleConfig {
    /// Zero waits everywhere; for tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(5),
            settle_wait: Duration::ZERO,
            retry_wait: Duration::ZERO,
            navigation_jitter: Jitter::fixed(Duration::ZERO),
            profile_jitter: Jitter::fixed(Duration::ZERO),
            cycle_pause: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn profile_url(&self, profile_id: &str) -> String {
        self.url_template.replace("{profile}", profile_id)
    }
}

/// What happened to one profile during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileOutcome {
    Recorded { count: u64, location: String },
    NavigationFailed,
    Unavailable,
    StoreFailed,
    /// Shutdown arrived before the page settled; nothing was read.
    Cancelled,
}

/// Tally of one pass over the profile list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub recorded: usize,
    pub navigation_failures: usize,
    pub unavailable: usize,
    pub store_failures: usize,
    /// The pass stopped early because shutdown was requested.
    pub cancelled: bool,
}

impl CycleSummary {
    fn record(&mut self, outcome: &ProfileOutcome) {
        match outcome {
            ProfileOutcome::Recorded { .. } => self.recorded += 1,
            ProfileOutcome::NavigationFailed => self.navigation_failures += 1,
            ProfileOutcome::Unavailable => self.unavailable += 1,
            ProfileOutcome::StoreFailed => self.store_failures += 1,
            ProfileOutcome::Cancelled => self.cancelled = true,
        }
    }

    pub fn attempted(&self) -> usize {
        self.recorded + self.navigation_failures + self.unavailable + self.store_failures
    }
}

/// Drives the measurement loop. Owns the page and the store for its lifetime.
pub struct CycleController<P: Page> {
    page: P,
    store: PartitionedStore,
    extractor: FollowerExtractor,
    profiles: Vec<String>,
    config: CycleConfig,
    shutdown: Shutdown,
    clock: fn() -> DateTime<Utc>,
}

impl<P: Page> CycleController<P> {
    pub fn new(
        page: P,
        store: PartitionedStore,
        extractor: FollowerExtractor,
        profiles: Vec<String>,
        config: CycleConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            page,
            store,
            extractor,
            profiles,
            config,
            shutdown,
            clock: Utc::now,
        }
    }

    /// Override the timestamp source used for observations.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn profiles(&self) -> &[String] {
        &self.profiles
    }

    pub fn store(&self) -> &PartitionedStore {
        &self.store
    }

    /// Loop until shutdown, then close the page. Returns the number of completed passes.
    pub async fn run(mut self) -> u64 {
        let mut passes = 0u64;
        while !self.shutdown.is_triggered() {
            let summary = self.run_cycle().await;
            if summary.cancelled {
                break;
            }
            passes += 1;
            info!(
                pass = passes,
                recorded = summary.recorded,
                unavailable = summary.unavailable,
                navigation_failures = summary.navigation_failures,
                store_failures = summary.store_failures,
                pause_secs = self.config.cycle_pause.as_secs_f64(),
                "cycle complete"
            );
            if !self.shutdown.sleep(self.config.cycle_pause).await {
                break;
            }
        }

        info!("shutting down, closing page");
        match self.page.close().await {
            Ok(()) => info!("page closed"),
            Err(e) => warn!(error = %e, "page close failed"),
        }
        passes
    }

    /// One pass over every profile, in order.
    pub async fn run_cycle(&mut self) -> CycleSummary {
        let mut summary = CycleSummary::default();
        let total = self.profiles.len();

        for index in 0..total {
            if self.shutdown.is_triggered() {
                summary.cancelled = true;
                return summary;
            }
            let profile = self.profiles[index].clone();
            info!(profile = %profile, position = index + 1, total, "measuring");

            let outcome = self.measure(&profile).await;
            summary.record(&outcome);
            if summary.cancelled {
                return summary;
            }

            let pause = match outcome {
                ProfileOutcome::NavigationFailed => self.config.navigation_jitter.sample(),
                _ => self.config.profile_jitter.sample(),
            };
            if !self.shutdown.sleep(pause).await {
                summary.cancelled = true;
                return summary;
            }
        }
        summary
    }

    /// Navigate, settle, extract with one retry, persist.
    ///
    /// Shutdown during the settle or retry wait abandons the profile without
    /// reading the page.
    pub async fn measure(&mut self, profile: &str) -> ProfileOutcome {
        let url = self.config.profile_url(profile);
        if let Err(e) = self.page.navigate(&url, self.config.navigation_timeout).await {
            warn!(
                profile = %profile,
                step = "navigate",
                url = %url,
                error = %e,
                "navigation failed, skipping this pass"
            );
            return ProfileOutcome::NavigationFailed;
        }

        // The counter animates in after load; reading early stores a partial value.
        if !self.shutdown.sleep(self.config.settle_wait).await {
            info!(
                profile = %profile,
                step = "settle",
                "shutdown before page settled, not measuring"
            );
            return ProfileOutcome::Cancelled;
        }

        let mut count = self.extractor.extract(&self.page).await;
        if count.is_none() {
            info!(profile = %profile, "count unavailable, retrying once");
            if !self.shutdown.sleep(self.config.retry_wait).await {
                info!(profile = %profile, step = "retry", "shutdown before retry, not measuring");
                return ProfileOutcome::Cancelled;
            }
            count = self.extractor.extract(&self.page).await;
        }

        let Some(count) = count else {
            let challenge = self.extractor.challenge(&self.page).await;
            warn!(
                profile = %profile,
                step = "extract",
                challenge = challenge.as_deref().unwrap_or("none"),
                "follower count unavailable (challenge or unexpected page structure)"
            );
            return ProfileOutcome::Unavailable;
        };

        match self.store.append((self.clock)(), profile, count).await {
            Ok(location) => {
                info!(profile = %profile, followers = count, location = %location, "observation saved");
                ProfileOutcome::Recorded { count, location }
            }
            Err(e) => {
                error!(
                    profile = %profile,
                    step = "persist",
                    followers = count,
                    error = %e,
                    "failed to save observation"
                );
                ProfileOutcome::StoreFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::testing::{ScriptedContent, ScriptedPage};
    use crate::page::PageError;
    use crate::storage::LocalBackend;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 12, 10, 0, 0).unwrap()
    }

    fn counter(count: &str) -> ScriptedContent {
        ScriptedContent::new()
            .text("body", "Instagram Follower Count")
            .text("#odometer", count)
    }

    fn controller(
        page: ScriptedPage,
        dir: &TempDir,
        profiles: &[&str],
        shutdown: Shutdown,
    ) -> CycleController<ScriptedPage> {
        CycleController::new(
            page,
            PartitionedStore::new(LocalBackend::new(dir.path())),
            FollowerExtractor::default(),
            profiles.iter().map(|p| p.to_string()).collect(),
            CycleConfig::immediate(),
            shutdown,
        )
        .with_clock(fixed_clock)
    }

    fn url(profile: &str) -> String {
        CycleConfig::default().profile_url(profile)
    }

    #[test]
    fn test_profile_url() {
        assert_eq!(
            url("alice"),
            "https://blastup.com/instagram-follower-count?alice"
        );
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let jitter = Jitter::new(Duration::from_millis(1500), Duration::from_secs(3));
        for _ in 0..100 {
            let d = jitter.sample();
            assert!(d >= Duration::from_millis(1500) && d <= Duration::from_secs(3));
        }
        let inverted = Jitter::new(Duration::from_secs(4), Duration::from_secs(2));
        let d = inverted.sample();
        assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(4));
        assert_eq!(Jitter::fixed(Duration::ZERO).sample(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_navigation_timeout_skips_profile_but_cycle_completes() {
        let dir = TempDir::new().unwrap();
        let page = ScriptedPage::new()
            .route(&url("alice"), counter("1.000"))
            .fail_navigation(&url("bob"), PageError::Timeout(Duration::from_secs(30)));
        let log = page.clone();
        let mut ctl = controller(page, &dir, &["alice", "bob"], Shutdown::new());

        let summary = ctl.run_cycle().await;

        assert_eq!(
            summary,
            CycleSummary {
                recorded: 1,
                navigation_failures: 1,
                ..CycleSummary::default()
            }
        );
        let day = fixed_clock().date_naive();
        let alice = ctl.store().read("alice", day).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].follower_count, 1000);
        assert!(ctl.store().read("bob", day).await.unwrap().is_empty());
        assert!(!dir.path().join("perfil=bob").exists());
        log.inspect(|l| assert_eq!(l.navigations, vec![url("alice"), url("bob")]));
    }

    #[tokio::test]
    async fn test_unavailable_count_is_retried_exactly_once() {
        let dir = TempDir::new().unwrap();
        let page = ScriptedPage::new()
            .route(&url("carol"), ScriptedContent::new().text("body", "nothing here"));
        let log = page.clone();
        let mut ctl = controller(page, &dir, &["carol"], Shutdown::new());

        let outcome = ctl.measure("carol").await;

        assert_eq!(outcome, ProfileOutcome::Unavailable);
        // Per extraction: body text + counter count. Two extractions, then one
        // more body read for the diagnostic challenge label.
        log.inspect(|l| {
            assert_eq!(l.navigations.len(), 1);
            assert_eq!(l.text_queries, 5);
        });
        assert!(!dir.path().join("perfil=carol").exists());
    }

    #[tokio::test]
    async fn test_challenge_page_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let page = ScriptedPage::new().route(
            &url("dave"),
            ScriptedContent::new()
                .text("body", "Attention Required! | Cloudflare")
                .text("#odometer", "999"),
        );
        let mut ctl = controller(page, &dir, &["dave"], Shutdown::new());

        let summary = ctl.run_cycle().await;
        assert_eq!(summary.unavailable, 1);
        assert_eq!(summary.recorded, 0);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_stop_the_cycle() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let page = ScriptedPage::new()
            .route(&url("erin"), counter("10"))
            .route(&url("frank"), counter("20"));
        let log = page.clone();
        let mut ctl = CycleController::new(
            page,
            PartitionedStore::new(LocalBackend::new(&blocker)),
            FollowerExtractor::default(),
            vec!["erin".to_string(), "frank".to_string()],
            CycleConfig::immediate(),
            Shutdown::new(),
        );

        let summary = ctl.run_cycle().await;
        assert_eq!(summary.store_failures, 2);
        assert_eq!(summary.attempted(), 2);
        log.inspect(|l| assert_eq!(l.navigations.len(), 2));
    }

    #[tokio::test]
    async fn test_run_repeats_until_shutdown_then_closes_page() {
        let dir = TempDir::new().unwrap();
        let shutdown = Shutdown::new();
        // Two profiles per pass; the 5th navigation is the first of pass three.
        let page = ScriptedPage::new()
            .route(&url("alice"), counter("100"))
            .route(&url("bob"), counter("200"))
            .cancel_after(5, shutdown.clone());
        let log = page.clone();
        let ctl = controller(page, &dir, &["alice", "bob"], shutdown);

        let passes = ctl.run().await;

        assert_eq!(passes, 2);
        log.inspect(|l| {
            assert_eq!(l.navigations.len(), 5);
            assert!(l.closed);
        });
        let store = PartitionedStore::new(LocalBackend::new(dir.path()));
        let day = fixed_clock().date_naive();
        // The cancelling navigation finishes, but its page is never read.
        assert_eq!(store.read("alice", day).await.unwrap().len(), 2);
        assert_eq!(store.read("bob", day).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_during_settle_wait_records_nothing() {
        let dir = TempDir::new().unwrap();
        let shutdown = Shutdown::new();
        let page = ScriptedPage::new().route(&url("alice"), counter("0"));
        let log = page.clone();
        let mut ctl = controller(page, &dir, &["alice"], shutdown.clone());
        ctl.config.settle_wait = Duration::from_secs(60);

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });
        let outcome = tokio::time::timeout(Duration::from_secs(5), ctl.measure("alice"))
            .await
            .expect("settle wait was not interrupted");

        assert_eq!(outcome, ProfileOutcome::Cancelled);
        log.inspect(|l| {
            assert_eq!(l.navigations, vec![url("alice")]);
            assert_eq!(l.text_queries, 0);
        });
        assert!(!dir.path().join("perfil=alice").exists());
    }

    #[tokio::test]
    async fn test_shutdown_before_navigation_settles_ends_the_pass() {
        let dir = TempDir::new().unwrap();
        let shutdown = Shutdown::new();
        let page = ScriptedPage::new()
            .route(&url("alice"), counter("500"))
            .route(&url("bob"), counter("600"))
            .cancel_after(1, shutdown.clone());
        let log = page.clone();
        let mut ctl = controller(page, &dir, &["alice", "bob"], shutdown);
        ctl.config.settle_wait = Duration::from_secs(60);

        let summary = ctl.run_cycle().await;

        assert!(summary.cancelled);
        assert_eq!(summary.attempted(), 0);
        log.inspect(|l| assert_eq!(l.navigations.len(), 1));
        assert!(!dir.path().join("perfil=alice").exists());
        assert!(!dir.path().join("perfil=bob").exists());
    }

    #[tokio::test]
    async fn test_shutdown_during_retry_wait_skips_second_read() {
        let dir = TempDir::new().unwrap();
        let shutdown = Shutdown::new();
        let page = ScriptedPage::new()
            .route(&url("carol"), ScriptedContent::new().text("body", "loading"));
        let log = page.clone();
        let mut ctl = controller(page, &dir, &["carol"], shutdown.clone());
        ctl.config.retry_wait = Duration::from_secs(60);

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });
        let outcome = tokio::time::timeout(Duration::from_secs(5), ctl.measure("carol"))
            .await
            .expect("retry wait was not interrupted");

        assert_eq!(outcome, ProfileOutcome::Cancelled);
        // One extraction only: body text + counter count.
        log.inspect(|l| assert_eq!(l.text_queries, 2));
        assert!(!dir.path().join("perfil=carol").exists());
    }

    #[tokio::test]
    async fn test_close_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let page = ScriptedPage::new().fail_close();
        let log = page.clone();
        let ctl = controller(page, &dir, &["alice"], shutdown);

        assert_eq!(ctl.run().await, 0);
        log.inspect(|l| {
            assert!(l.navigations.is_empty());
            assert!(l.closed);
        });
    }
}
