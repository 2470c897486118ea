//! Lexicon-based sentiment polarity for the contextual feature vector.
//!
//! Word scores live in `sentiment_lexicon.json` (integers in -2..=2). The
//! polarity feature must sit in [-1, 1] and match what the contextual model
//! saw at training time, so the raw sum is normalized by the number of
//! scored words.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon")
});

#[derive(Debug, Clone, Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        *LEXICON.get(w).unwrap_or(&0)
    }

    /// Polarity in [-1, 1]. 0.0 for text without any scored words.
    ///
    /// Negation: a negator within the preceding 1..=3 tokens inverts the
    /// sign of a word's lexicon score.
    pub fn polarity(&self, text: &str) -> f32 {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut sum: i32 = 0;
        let mut scored: usize = 0;

        for i in 0..tokens.len() {
            let base = self.word_score(tokens[i].as_str());
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            sum += if negated { -base } else { base };
            scored += 1;
        }

        if scored == 0 {
            return 0.0;
        }
        // Each scored word contributes at most |2|.
        let p = sum as f32 / (scored as f32 * 2.0);
        p.clamp(-1.0, 1.0)
    }
}

/// Alphanumeric tokens, lower-cased.
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn"
            | "wasn"
            | "aren"
            | "won"
            | "can"
            | "cannot"
            | "without"
            | "dont"
            | "don"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_text_scores_positive() {
        let s = SentimentAnalyzer::new();
        assert!(s.polarity("I feel happy and calm today") > 0.0);
    }

    #[test]
    fn negative_text_scores_negative() {
        let s = SentimentAnalyzer::new();
        assert!(s.polarity("everything is hopeless and i feel worthless") < 0.0);
    }

    #[test]
    fn negation_flips_sign() {
        let s = SentimentAnalyzer::new();
        let plain = s.polarity("i am happy");
        let negated = s.polarity("i am not happy");
        assert!(plain > 0.0);
        assert!(negated < 0.0);
    }

    #[test]
    fn unknown_words_are_neutral() {
        let s = SentimentAnalyzer::new();
        assert_eq!(s.polarity("qwerty asdfgh"), 0.0);
        assert_eq!(s.polarity(""), 0.0);
    }

    #[test]
    fn polarity_stays_in_unit_interval() {
        let s = SentimentAnalyzer::new();
        let p = s.polarity("hopeless hopeless hopeless hopeless");
        assert!((-1.0..=1.0).contains(&p));
    }
}
