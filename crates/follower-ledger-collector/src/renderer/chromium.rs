//! Chromium-based page using chromiumoxide.

use super::{count_script, nth_text_script, BrowserOptions};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use follower_ledger::{Page, PageError};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Environment override for the browser binary.
pub const ENV_CHROMIUM_PATH: &str = "FOLLOWER_LEDGER_CHROMIUM_PATH";

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(ENV_CHROMIUM_PATH) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// A single Chromium tab inside a browser bound to a persistent profile.
pub struct ChromiumPage {
    browser: Option<Browser>,
    page: Option<chromiumoxide::Page>,
    handler: Option<JoinHandle<()>>,
}

impl ChromiumPage {
    /// Launch Chromium and open one blank tab.
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let chrome_path = match &options.executable {
            Some(path) => path.clone(),
            None => find_chromium().with_context(|| {
                format!("Chromium not found. Install Chrome/Chromium or set {ENV_CHROMIUM_PATH}.")
            })?,
        };

        std::fs::create_dir_all(&options.profile_dir).with_context(|| {
            format!(
                "failed to create browser profile directory {}",
                options.profile_dir.display()
            )
        })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .user_data_dir(&options.profile_dir)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage");
        builder = if options.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        info!(
            browser = %chrome_path.display(),
            profile_dir = %options.profile_dir.display(),
            headless = options.headless,
            "Chromium launched"
        );

        Ok(Self {
            browser: Some(browser),
            page: Some(page),
            handler: Some(handler),
        })
    }

    fn page(&self) -> Result<&chromiumoxide::Page, PageError> {
        self.page.as_ref().ok_or(PageError::Closed)
    }

    async fn evaluate_json_text(&self, script: String) -> Result<Option<String>, PageError> {
        let encoded: String = self
            .page()?
            .evaluate(script)
            .await
            .map_err(|e| PageError::Query(e.to_string()))?
            .into_value()
            .map_err(|e| PageError::Query(format!("unexpected script result: {e}")))?;
        serde_json::from_str(&encoded)
            .map_err(|e| PageError::Query(format!("unexpected script result: {e}")))
    }
}

#[async_trait]
impl Page for ChromiumPage {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), PageError> {
        let page = self.page()?;
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(PageError::Navigation(e.to_string())),
            Err(_) => Err(PageError::Timeout(timeout)),
        }
    }

    async fn text(&self, selector: &str) -> Result<Option<String>, PageError> {
        self.evaluate_json_text(nth_text_script(selector, 0)).await
    }

    async fn count(&self, selector: &str) -> Result<usize, PageError> {
        self.page()?
            .evaluate(count_script(selector))
            .await
            .map_err(|e| PageError::Query(e.to_string()))?
            .into_value()
            .map_err(|e| PageError::Query(format!("unexpected script result: {e}")))
    }

    async fn nth_text(&self, selector: &str, index: usize) -> Result<Option<String>, PageError> {
        self.evaluate_json_text(nth_text_script(selector, index)).await
    }

    async fn close(&mut self) -> Result<(), PageError> {
        let mut first_error = None;

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                first_error.get_or_insert(PageError::Query(format!("page close failed: {e}")));
            }
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                first_error.get_or_insert(PageError::Query(format!("browser close failed: {e}")));
            }
            let _ = browser.wait().await;
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
