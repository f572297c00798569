//! Anti-bot challenge detection on sampled page text.

/// A known interstitial marker: a lowercase needle and the label reported when it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeMarker {
    pub needle: String,
    pub label: String,
}

impl ChallengeMarker {
    pub fn new(needle: &str, label: &str) -> Self {
        Self {
            needle: needle.to_lowercase(),
            label: label.to_string(),
        }
    }
}

/// Classifies rendered page text as blocked by a challenge or not.
///
/// Markers are checked in table order and the first hit wins, so more
/// specific markers belong before generic ones.
#[derive(Debug, Clone)]
pub struct ChallengeDetector {
    markers: Vec<ChallengeMarker>,
}

impl Default for ChallengeDetector {
    fn default() -> Self {
        Self {
            markers: vec![
                ChallengeMarker::new("cloudflare", "Cloudflare"),
                ChallengeMarker::new("verify you are human", "Human verification"),
                ChallengeMarker::new("captcha", "CAPTCHA"),
                ChallengeMarker::new("please enable javascript", "JavaScript required"),
                ChallengeMarker::new("attention required", "Challenge"),
            ],
        }
    }
}

impl ChallengeDetector {
    /// Build a detector over a custom marker table.
    pub fn with_markers(markers: Vec<ChallengeMarker>) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &[ChallengeMarker] {
        &self.markers
    }

    /// Return the label of the first marker found in `sampled_text`, if any.
    pub fn classify(&self, sampled_text: &str) -> Option<&str> {
        let haystack = sampled_text.to_lowercase();
        self.markers
            .iter()
            .find(|m| !m.needle.is_empty() && haystack.contains(&m.needle))
            .map(|m| m.label.as_str())
    }
}
