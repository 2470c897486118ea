//! Zero-latency keyword safety net. Binary by design: an exact phrase hit
//! is High, anything else is Low, and this detector never returns Medium.

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::normalize;
use crate::risk::RiskLevel;

use super::{Detection, Detector, DetectorInput};

/// Literal phrases that alone justify a high-risk classification.
pub const HIGH_RISK_PHRASES: &[&str] = &[
    "i want to die",
    "kill myself",
    "end my life",
    "i feel like dying",
    "i want to disappear",
];

pub struct RuleDetector;

impl RuleDetector {
    /// Synchronous core, usable outside the async fan-out.
    pub fn scan(text: &str) -> RiskLevel {
        let t = normalize(text);
        if HIGH_RISK_PHRASES.iter().any(|p| t.contains(p)) {
            RiskLevel::High
        } else {
            RiskLevel::Low
        }
    }
}

#[async_trait]
impl Detector for RuleDetector {
    fn name(&self) -> &'static str {
        "rule"
    }

    async fn detect(&self, input: &DetectorInput) -> Result<Detection> {
        Ok(Detection::level(Self::scan(&input.normalized_text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_phrase_is_high() {
        assert_eq!(RuleDetector::scan("I want to disappear."), RiskLevel::High);
        assert_eq!(
            RuleDetector::scan("sometimes i feel like DYING"),
            RiskLevel::High
        );
    }

    #[test]
    fn never_returns_medium() {
        for text in ["i am sad", "exams stress me out", "kill myself", ""] {
            let level = RuleDetector::scan(text);
            assert_ne!(level, RiskLevel::Medium);
        }
    }

    #[tokio::test]
    async fn benign_text_is_low() {
        let d = RuleDetector;
        let out = d
            .detect(&DetectorInput::from_text("I had a mediocre day"))
            .await
            .unwrap();
        assert_eq!(out.level, RiskLevel::Low);
    }
}
