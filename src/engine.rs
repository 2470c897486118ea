//! # Fusion & Escalation Policy
//! Pure, testable logic that maps the five detector outputs to one final
//! risk level, plus the literal-keyword crisis scan that short-circuits the
//! whole pipeline. No I/O, suitable for unit tests and offline evaluation.
//!
//! Policy: any single non-semantic detector is sufficient to escalate
//! (`max`), favoring recall over precision. Semantic similarity never
//! escalates on its own; it only upgrades an already-nonzero signal to High.

use crate::risk::RiskLevel;

/// Phrases that force an immediate crisis response before any model runs.
/// Matched case-insensitively against both the normalized and the
/// original-language text; overlaps with but is not identical to the rule
/// detector's list.
pub const CRISIS_PHRASES: &[&str] = &[
    "i want to die",
    "i feel like dying",
    "i want to kill myself",
    "kill myself",
    "end my life",
    "don't want to live",
    "suicide",
];

/// Combine detector outputs into the final level.
///
/// Step 1: base = max of the four primary detectors.
/// Step 2: semantic High upgrades base to High only when base is already
/// at least Medium.
pub fn fuse(
    rule: RiskLevel,
    ensemble: RiskLevel,
    contextual: RiskLevel,
    temporal: RiskLevel,
    semantic: RiskLevel,
) -> RiskLevel {
    let base = rule.max(ensemble).max(contextual).max(temporal);
    if semantic == RiskLevel::High && base >= RiskLevel::Medium {
        return RiskLevel::High;
    }
    base
}

/// True if `text` contains any literal crisis phrase.
pub fn contains_crisis_phrase(text: &str) -> bool {
    let t = normalize(text);
    CRISIS_PHRASES.iter().any(|p| t.contains(p))
}

/// Lowercase and condense whitespace so phrase matching is insensitive to
/// casing and spacing.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            for lc in ch.to_lowercase() {
                out.push(lc);
            }
            last_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use RiskLevel::{High, Low, Medium};

    const LEVELS: [RiskLevel; 3] = [Low, Medium, High];

    #[test]
    fn single_high_detector_escalates() {
        assert_eq!(fuse(High, Low, Low, Low, Low), High);
        assert_eq!(fuse(Low, High, Low, Low, Low), High);
        assert_eq!(fuse(Low, Low, High, Low, Low), High);
        assert_eq!(fuse(Low, Low, Low, High, Low), High);
    }

    #[test]
    fn semantic_alone_does_not_escalate() {
        // Similarity hit with all primary detectors quiet stays Low.
        assert_eq!(fuse(Low, Low, Low, Low, High), Low);
    }

    #[test]
    fn semantic_upgrades_nonzero_base() {
        assert_eq!(fuse(Low, Medium, Low, Low, High), High);
        assert_eq!(fuse(Low, Low, Medium, Low, High), High);
    }

    #[test]
    fn semantic_medium_never_changes_base() {
        assert_eq!(fuse(Low, Medium, Low, Low, Medium), Medium);
    }

    #[test]
    fn fusion_is_monotonic_in_every_detector() {
        // Raising any single input (others fixed) never lowers the result.
        for a in LEVELS {
            for b in LEVELS {
                for c in LEVELS {
                    for d in LEVELS {
                        for s in LEVELS {
                            let base = fuse(a, b, c, d, s);
                            for bump in LEVELS {
                                if bump >= a {
                                    assert!(fuse(bump, b, c, d, s) >= base);
                                }
                                if bump >= s {
                                    assert!(fuse(a, b, c, d, bump) >= base);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn fusion_is_order_independent_over_primary_detectors() {
        let out = fuse(Medium, Low, High, Low, Low);
        assert_eq!(out, fuse(High, Medium, Low, Low, Low));
        assert_eq!(out, fuse(Low, High, Low, Medium, Low));
    }

    #[test]
    fn crisis_phrase_matching_is_case_and_space_insensitive() {
        assert!(contains_crisis_phrase("I WANT to   die"));
        assert!(contains_crisis_phrase("honestly i want to kill myself"));
        assert!(!contains_crisis_phrase("I had a mediocre day"));
    }

    #[test]
    fn normalize_condenses_whitespace() {
        assert_eq!(normalize("  End\tMY\n\nlife "), "end my life");
    }
}
