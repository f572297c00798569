//! Browser-backed implementation of the ledger's page capability.
//!
//! Currently Chromium via chromiumoxide, with a persistent profile directory
//! so cookies earned by solving a challenge once survive restarts.

pub mod chromium;

use std::path::PathBuf;

/// How to launch the browser.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Run without a window.
    pub headless: bool,
    /// Persistent user-data directory (cookies, local storage).
    pub profile_dir: PathBuf,
    /// Explicit browser binary; discovered with [`chromium::find_chromium`] when `None`.
    pub executable: Option<PathBuf>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: false,
            profile_dir: PathBuf::from("user_data"),
            executable: None,
        }
    }
}

/// JavaScript string literal for `value`, safe to splice into a script.
pub(crate) fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Script returning the JSON-encoded `innerText` of the `index`-th match, or `null`.
pub(crate) fn nth_text_script(selector: &str, index: usize) -> String {
    format!(
        "(() => {{ const el = document.querySelectorAll({sel})[{index}]; \
         return JSON.stringify(el ? el.innerText : null); }})()",
        sel = js_string(selector)
    )
}

/// Script returning the number of elements matching `selector`.
pub(crate) fn count_script(selector: &str) -> String {
    format!(
        "document.querySelectorAll({sel}).length",
        sel = js_string(selector)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors_are_escaped() {
        assert_eq!(js_string("#odometer"), "\"#odometer\"");
        assert_eq!(js_string("a[title=\"x\"]"), "\"a[title=\\\"x\\\"]\"");
    }

    #[test]
    fn test_scripts_embed_selector_and_index() {
        let script = nth_text_script("#odometer .odometer-value", 3);
        assert!(script.contains("querySelectorAll(\"#odometer .odometer-value\")[3]"));
        assert!(script.contains("JSON.stringify"));
        assert_eq!(
            count_script("body"),
            "document.querySelectorAll(\"body\").length"
        );
    }
}
