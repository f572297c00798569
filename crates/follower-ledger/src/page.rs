//! Page capability consumed by the extractor and the cycle controller.
//!
//! The core never drives a browser itself; it talks to anything that can
//! navigate to a URL and answer text queries by CSS selector. The collector
//! provides a Chromium implementation, tests use [`testing::ScriptedPage`].

use async_trait::async_trait;
use std::time::Duration;

/// Failures reported by a page implementation.
///
/// All of these are ordinary, expected outcomes for a scraper; callers treat
/// them as "this step did not work" rather than as bugs.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("page is closed")]
    Closed,
}

/// A single browser page, used sequentially by one owner.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate to `url`, waiting until the document is ready, bounded by `timeout`.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), PageError>;

    /// Visible text of the first element matching `selector`, or `None` if nothing matches.
    async fn text(&self, selector: &str) -> Result<Option<String>, PageError>;

    /// Number of elements matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize, PageError>;

    /// Visible text of the `index`-th match of `selector` in document order.
    async fn nth_text(&self, selector: &str, index: usize) -> Result<Option<String>, PageError>;

    /// Release the page and any session behind it.
    async fn close(&mut self) -> Result<(), PageError>;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! In-memory page with canned content per URL.

    use super::{Page, PageError};
    use crate::shutdown::Shutdown;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::time::Duration;

    /// What a scripted URL renders.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedContent {
        texts: HashMap<String, String>,
        lists: HashMap<String, Vec<String>>,
        failing: HashSet<String>,
        delay: Option<Duration>,
    }

    impl ScriptedContent {
        pub fn new() -> Self {
            Self::default()
        }

        /// Single element `selector` with `text`.
        pub fn text(mut self, selector: &str, text: &str) -> Self {
            self.texts.insert(selector.to_string(), text.to_string());
            self
        }

        /// Several elements matching `selector`, in document order.
        pub fn list(mut self, selector: &str, items: &[&str]) -> Self {
            self.lists.insert(
                selector.to_string(),
                items.iter().map(|s| s.to_string()).collect(),
            );
            self
        }

        /// Every query against `selector` fails.
        pub fn failing(mut self, selector: &str) -> Self {
            self.failing.insert(selector.to_string());
            self
        }

        /// Every query sleeps this long before answering.
        pub fn delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn items(&self, selector: &str) -> Vec<String> {
            if let Some(items) = self.lists.get(selector) {
                return items.clone();
            }
            self.texts.get(selector).cloned().into_iter().collect()
        }
    }

    /// Everything a test may want to assert on after the page was handed off.
    #[derive(Debug, Default)]
    pub struct ScriptedLog {
        pub navigations: Vec<String>,
        pub text_queries: usize,
        pub closed: bool,
    }

    #[derive(Default)]
    struct State {
        routes: HashMap<String, ScriptedContent>,
        navigation_errors: HashMap<String, PageError>,
        current: Option<ScriptedContent>,
        cancel_after: Option<(usize, Shutdown)>,
        fail_close: bool,
        log: ScriptedLog,
    }

    /// Scripted [`Page`] keyed by exact URL.
    #[derive(Clone, Default)]
    pub struct ScriptedPage {
        state: Arc<Mutex<State>>,
    }

    impl ScriptedPage {
        pub fn new() -> Self {
            Self::default()
        }

        /// A page already showing `content`, for extractor tests.
        pub fn showing(content: ScriptedContent) -> Self {
            let page = Self::new();
            page.lock().current = Some(content);
            page
        }

        pub fn route(self, url: &str, content: ScriptedContent) -> Self {
            self.lock().routes.insert(url.to_string(), content);
            self
        }

        pub fn fail_navigation(self, url: &str, error: PageError) -> Self {
            self.lock().navigation_errors.insert(url.to_string(), error);
            self
        }

        /// Trigger `shutdown` once `navigations` navigations have been attempted.
        pub fn cancel_after(self, navigations: usize, shutdown: Shutdown) -> Self {
            self.lock().cancel_after = Some((navigations, shutdown));
            self
        }

        pub fn fail_close(self) -> Self {
            self.lock().fail_close = true;
            self
        }

        /// Run `f` against the recorded log.
        pub fn inspect<R>(&self, f: impl FnOnce(&ScriptedLog) -> R) -> R {
            f(&self.lock().log)
        }

        fn lock(&self) -> MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        async fn query<R>(
            &self,
            selector: &str,
            f: impl FnOnce(Vec<String>) -> R,
        ) -> Result<R, PageError> {
            let (content, closed) = {
                let mut state = self.lock();
                state.log.text_queries += 1;
                (state.current.clone(), state.log.closed)
            };
            if closed {
                return Err(PageError::Closed);
            }
            let content = content.unwrap_or_default();
            if let Some(delay) = content.delay {
                tokio::time::sleep(delay).await;
            }
            if content.failing.contains(selector) {
                return Err(PageError::Query(format!("scripted failure for {selector}")));
            }
            Ok(f(content.items(selector)))
        }
    }

    #[async_trait]
    impl Page for ScriptedPage {
        async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), PageError> {
            let mut state = self.lock();
            state.log.navigations.push(url.to_string());
            if let Some((after, shutdown)) = &state.cancel_after {
                if state.log.navigations.len() >= *after {
                    shutdown.trigger();
                }
            }
            if let Some(err) = state.navigation_errors.get(url).cloned() {
                state.current = None;
                return Err(err);
            }
            state.current = Some(state.routes.get(url).cloned().unwrap_or_default());
            Ok(())
        }

        async fn text(&self, selector: &str) -> Result<Option<String>, PageError> {
            self.query(selector, |items| items.into_iter().next()).await
        }

        async fn count(&self, selector: &str) -> Result<usize, PageError> {
            self.query(selector, |items| items.len()).await
        }

        async fn nth_text(&self, selector: &str, index: usize) -> Result<Option<String>, PageError> {
            self.query(selector, |items| items.into_iter().nth(index)).await
        }

        async fn close(&mut self) -> Result<(), PageError> {
            let mut state = self.lock();
            state.log.closed = true;
            if state.fail_close {
                return Err(PageError::Query("scripted close failure".to_string()));
            }
            Ok(())
        }
    }
}
