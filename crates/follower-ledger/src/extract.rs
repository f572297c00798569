//! Follower-count extraction from a rendered page.
//!
//! Extraction first rules out challenge pages, then checks that the counter
//! element exists, then runs an ordered list of [`CountStrategy`] values
//! until one yields digits. Nothing in here returns an error: every failed or
//! timed-out query just means "this step found nothing".
//!
//! Digit fragments are concatenated in the order the page reports them. If a
//! renderer ever reorders them the count is silently wrong; that risk is
//! accepted.

use crate::challenge::ChallengeDetector;
use crate::page::{Page, PageError};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Selectors and bounds used during extraction.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Element whose text is sampled for challenge markers.
    pub body_selector: String,
    /// The counter widget.
    pub counter_selector: String,
    /// Per-digit sub-elements of the counter.
    pub digit_selector: String,
    /// Max characters of body text handed to the challenge detector.
    pub sample_chars: usize,
    /// Max digit sub-elements read by the fragment strategy.
    pub max_fragments: usize,
    /// Upper bound for each individual page query.
    pub query_timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            body_selector: "body".to_string(),
            counter_selector: "#odometer".to_string(),
            digit_selector: "#odometer .odometer-value".to_string(),
            sample_chars: 800,
            max_fragments: 60,
            query_timeout: Duration::from_secs(2),
        }
    }
}

/// Run a page query under `limit`, folding a timeout into [`PageError::Timeout`].
pub(crate) async fn bounded<T, F>(limit: Duration, query: F) -> Result<T, PageError>
where
    F: Future<Output = Result<T, PageError>>,
{
    match tokio::time::timeout(limit, query).await {
        Ok(result) => result,
        Err(_) => Err(PageError::Timeout(limit)),
    }
}

/// Keep ASCII digits only and parse them. Empty or overflowing input yields `None`.
pub fn parse_digits(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// One way of reading the count off a page that is known to have a counter.
#[async_trait]
pub trait CountStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn attempt(&self, page: &dyn Page, config: &ExtractorConfig) -> Option<u64>;
}

/// Reads the counter element's own text.
pub struct DirectText;

#[async_trait]
impl CountStrategy for DirectText {
    fn name(&self) -> &'static str {
        "direct_text"
    }

    async fn attempt(&self, page: &dyn Page, config: &ExtractorConfig) -> Option<u64> {
        match bounded(config.query_timeout, page.text(&config.counter_selector)).await {
            Ok(Some(text)) => parse_digits(&text),
            Ok(None) => None,
            Err(e) => {
                debug!(strategy = self.name(), error = %e, "counter text query failed");
                None
            }
        }
    }
}

/// Concatenates the per-digit sub-elements of an animated counter.
pub struct DigitFragments;

#[async_trait]
impl CountStrategy for DigitFragments {
    fn name(&self) -> &'static str {
        "digit_fragments"
    }

    async fn attempt(&self, page: &dyn Page, config: &ExtractorConfig) -> Option<u64> {
        let total = match bounded(config.query_timeout, page.count(&config.digit_selector)).await {
            Ok(n) => n,
            Err(e) => {
                debug!(strategy = self.name(), error = %e, "fragment count query failed");
                return None;
            }
        };

        let mut joined = String::new();
        for index in 0..total.min(config.max_fragments) {
            match bounded(
                config.query_timeout,
                page.nth_text(&config.digit_selector, index),
            )
            .await
            {
                Ok(Some(text)) => joined.push_str(&text),
                Ok(None) => {}
                Err(e) => {
                    debug!(strategy = self.name(), index, error = %e, "fragment text query failed");
                    return None;
                }
            }
        }
        parse_digits(&joined)
    }
}

/// Produces a follower count from a rendered page, or `None` when unavailable.
pub struct FollowerExtractor {
    config: ExtractorConfig,
    detector: ChallengeDetector,
    strategies: Vec<Box<dyn CountStrategy>>,
}

impl Default for FollowerExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default(), ChallengeDetector::default())
    }
}

impl FollowerExtractor {
    /// Extractor with the standard strategy order: direct text, then digit fragments.
    pub fn new(config: ExtractorConfig, detector: ChallengeDetector) -> Self {
        Self {
            config,
            detector,
            strategies: vec![Box::new(DirectText), Box::new(DigitFragments)],
        }
    }

    /// Replace the strategy list.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn CountStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Challenge label for the page's current body text, if it is a challenge page.
    pub async fn challenge(&self, page: &dyn Page) -> Option<String> {
        match bounded(self.config.query_timeout, page.text(&self.config.body_selector)).await {
            Ok(Some(body)) => {
                let sample: String = body.chars().take(self.config.sample_chars).collect();
                self.detector.classify(&sample).map(str::to_string)
            }
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "body text unavailable, skipping challenge check");
                None
            }
        }
    }

    pub async fn extract(&self, page: &dyn Page) -> Option<u64> {
        if let Some(label) = self.challenge(page).await {
            debug!(challenge = %label, "challenge page detected");
            return None;
        }

        match bounded(self.config.query_timeout, page.count(&self.config.counter_selector)).await {
            Ok(0) => {
                debug!(selector = %self.config.counter_selector, "counter element absent");
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "counter lookup failed");
                return None;
            }
        }

        for strategy in &self.strategies {
            if let Some(count) = strategy.attempt(page, &self.config).await {
                debug!(strategy = strategy.name(), count, "follower count extracted");
                return Some(count);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::testing::{ScriptedContent, ScriptedPage};

    const COUNTER: &str = "#odometer";
    const DIGITS: &str = "#odometer .odometer-value";

    fn counter_page(text: &str) -> ScriptedPage {
        ScriptedPage::showing(
            ScriptedContent::new()
                .text("body", "Instagram follower count")
                .text(COUNTER, text),
        )
    }

    #[test]
    fn test_parse_digits() {
        assert_eq!(parse_digits("1,234,567"), Some(1_234_567));
        assert_eq!(parse_digits(" 42 followers"), Some(42));
        assert_eq!(parse_digits("0"), Some(0));
        assert_eq!(parse_digits("no digits"), None);
        assert_eq!(parse_digits(""), None);
        assert_eq!(parse_digits("99999999999999999999999"), None);
    }

    #[tokio::test]
    async fn test_direct_text_strategy() {
        let page = counter_page("12.345");
        let extractor = FollowerExtractor::default();
        assert_eq!(extractor.extract(&page).await, Some(12_345));
    }

    #[tokio::test]
    async fn test_falls_back_to_digit_fragments() {
        let page = ScriptedPage::showing(
            ScriptedContent::new()
                .text("body", "Instagram follower count")
                .text(COUNTER, "")
                .list(DIGITS, &["1", "0", "4", "2"]),
        );
        let extractor = FollowerExtractor::default();
        assert_eq!(extractor.extract(&page).await, Some(1042));
    }

    #[tokio::test]
    async fn test_custom_strategy_list_with_unreadable_body() {
        let page = ScriptedPage::showing(
            ScriptedContent::new()
                .text(COUNTER, "ignored")
                .list(DIGITS, &["7", "7"])
                .failing("body"),
        );
        let strategies: Vec<Box<dyn CountStrategy>> = vec![Box::new(DigitFragments)];
        let extractor = FollowerExtractor::default().with_strategies(strategies);
        assert_eq!(extractor.extract(&page).await, Some(77));
    }

    #[tokio::test]
    async fn test_fragment_limit_is_respected() {
        let digits: Vec<&str> = std::iter::repeat("1").take(10).collect();
        let page = ScriptedPage::showing(
            ScriptedContent::new()
                .text(COUNTER, "-")
                .list(DIGITS, &digits),
        );
        let config = ExtractorConfig {
            max_fragments: 3,
            ..ExtractorConfig::default()
        };
        let extractor = FollowerExtractor::new(config, ChallengeDetector::default());
        assert_eq!(extractor.extract(&page).await, Some(111));
    }

    #[tokio::test]
    async fn test_challenge_page_is_unavailable_even_with_counter() {
        let page = ScriptedPage::showing(
            ScriptedContent::new()
                .text("body", "Just a moment... Verify you are human by completing the action")
                .text(COUNTER, "1000"),
        );
        let extractor = FollowerExtractor::default();
        assert_eq!(extractor.extract(&page).await, None);
        assert_eq!(
            extractor.challenge(&page).await.as_deref(),
            Some("Human verification")
        );
    }

    #[tokio::test]
    async fn test_marker_beyond_sample_window_is_ignored() {
        let body = format!("{}captcha", "x".repeat(900));
        let page = ScriptedPage::showing(
            ScriptedContent::new().text("body", &body).text(COUNTER, "5"),
        );
        let extractor = FollowerExtractor::default();
        assert_eq!(extractor.extract(&page).await, Some(5));
    }

    #[tokio::test]
    async fn test_missing_counter_is_unavailable() {
        let page = ScriptedPage::showing(ScriptedContent::new().text("body", "Profile not found"));
        let extractor = FollowerExtractor::default();
        assert_eq!(extractor.extract(&page).await, None);
    }

    #[tokio::test]
    async fn test_counter_without_digits_is_unavailable() {
        let page = ScriptedPage::showing(
            ScriptedContent::new()
                .text("body", "loading")
                .text(COUNTER, "--,---")
                .list(DIGITS, &["-", " "]),
        );
        let extractor = FollowerExtractor::default();
        assert_eq!(extractor.extract(&page).await, None);
    }

    #[tokio::test]
    async fn test_slow_queries_are_bounded() {
        let page = ScriptedPage::showing(
            ScriptedContent::new()
                .text(COUNTER, "1000")
                .delay(Duration::from_secs(30)),
        );
        let config = ExtractorConfig {
            query_timeout: Duration::from_millis(20),
            ..ExtractorConfig::default()
        };
        let extractor = FollowerExtractor::new(config, ChallengeDetector::default());
        let start = std::time::Instant::now();
        assert_eq!(extractor.extract(&page).await, None);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
