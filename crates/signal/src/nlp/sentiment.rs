use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::nlp::tokenizer::{clean_word, strip_markup};

/// Dampening constant for the compound normalization; keeps single-word
/// posts from saturating the score.
const NORMALIZATION_ALPHA: f64 = 15.0;

/// Invert-and-dampen factor applied to a negated sentiment word.
const NEGATION_DAMPING: f64 = 0.8;

static LEXICON: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    [
        // positive
        ("good", 1.9),
        ("great", 3.1),
        ("fine", 0.8),
        ("solid", 1.7),
        ("strong", 2.3),
        ("excellent", 2.7),
        ("amazing", 2.8),
        ("awesome", 3.1),
        ("best", 3.2),
        ("happy", 2.7),
        ("love", 3.2),
        ("loves", 3.2),
        ("loved", 3.2),
        ("loving", 3.2),
        ("win", 2.8),
        ("winning", 2.8),
        ("profit", 2.3),
        ("profits", 2.3),
        ("gain", 2.4),
        ("gains", 2.4),
        ("growth", 2.2),
        ("rally", 2.0),
        ("rallying", 2.0),
        ("moon", 2.5),
        ("rocket", 2.4),
        ("soar", 2.7),
        ("soaring", 2.7),
        ("surge", 2.4),
        ("surging", 2.4),
        ("breakout", 2.1),
        ("record", 1.6),
        ("beat", 1.9),
        ("beats", 1.9),
        ("upgrade", 2.0),
        ("upgraded", 2.0),
        ("undervalued", 1.5),
        ("bull", 1.5),
        ("bullish", 2.9),
        ("buy", 1.2),
        ("buying", 1.2),
        ("up", 1.1),
        ("hot", 1.4),
        // negative
        ("bad", -2.5),
        ("terrible", -3.0),
        ("horrible", -3.0),
        ("horrendous", -3.2),
        ("awful", -3.0),
        ("worst", -3.1),
        ("sad", -2.1),
        ("worried", -1.8),
        ("fear", -2.1),
        ("panic", -2.6),
        ("fail", -2.3),
        ("fails", -2.3),
        ("failed", -2.3),
        ("failing", -2.3),
        ("loss", -2.2),
        ("losses", -2.2),
        ("lose", -2.2),
        ("losing", -2.2),
        ("miss", -1.6),
        ("missed", -1.6),
        ("drop", -1.8),
        ("dropping", -1.8),
        ("fall", -1.7),
        ("falling", -1.7),
        ("plunge", -2.7),
        ("plunging", -2.7),
        ("crash", -3.0),
        ("crashing", -3.0),
        ("collapse", -3.0),
        ("tank", -2.5),
        ("tanking", -2.5),
        ("dump", -2.4),
        ("dumping", -2.4),
        ("weak", -1.9),
        ("downgrade", -2.0),
        ("downgraded", -2.0),
        ("overvalued", -1.6),
        ("bubble", -1.9),
        ("risky", -1.5),
        ("bear", -1.5),
        ("bearish", -2.9),
        ("sell", -1.2),
        ("selling", -1.2),
        ("short", -1.4),
        ("shorting", -1.4),
        ("fraud", -3.3),
        ("scam", -3.4),
        ("bankrupt", -3.5),
        ("bankruptcy", -3.5),
    ]
    .into_iter()
    .collect()
});

static NEGATIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "not", "no", "never", "none", "neither", "nor", "cannot", "cant", "dont", "doesnt",
        "didnt", "isnt", "arent", "wasnt", "werent", "wont", "wouldnt", "couldnt", "shouldnt",
        "aint",
    ]
    .into_iter()
    .collect()
});

static INTENSIFIERS: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    [
        ("very", 1.3),
        ("really", 1.3),
        ("extremely", 1.7),
        ("absolutely", 1.7),
        ("incredibly", 1.6),
        ("totally", 1.4),
        ("hugely", 1.5),
        ("massively", 1.6),
        ("super", 1.5),
        ("slightly", 0.5),
        ("somewhat", 0.6),
        ("barely", 0.4),
    ]
    .into_iter()
    .collect()
});

/// Lexicon-based polarity scorer. A negation inverts sentiment words inside
/// a small trailing window; intensity words scale the next sentiment word.
#[derive(Debug, Clone)]
pub struct SentimentAnalyzer {
    negation_window: usize,
}

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self { negation_window: 3 }
    }

    pub fn with_negation_window(mut self, window: usize) -> Self {
        self.negation_window = window;
        self
    }

    /// Compound polarity in [-1, 1]. Exactly 0.0 when no lexicon word is
    /// present, which downstream treats as "no signal".
    pub fn compound(&self, text: &str) -> f64 {
        let mut total = 0.0;
        let mut intensity = 1.0;
        let mut negated_for = 0usize;

        for raw in strip_markup(text).split_whitespace() {
            let word = clean_word(raw);
            if word.is_empty() {
                continue;
            }

            if NEGATIONS.contains(word.as_str()) {
                negated_for = self.negation_window;
                continue;
            }
            if let Some(multiplier) = INTENSIFIERS.get(word.as_str()) {
                intensity = *multiplier;
                continue;
            }

            if let Some(score) = LEXICON.get(word.as_str()) {
                let mut scored = score * intensity;
                if negated_for > 0 {
                    scored = -scored * NEGATION_DAMPING;
                }
                total += scored;
                intensity = 1.0;
            }

            if negated_for > 0 {
                negated_for -= 1;
            }
        }

        if total == 0.0 {
            return 0.0;
        }
        total / (total * total + NORMALIZATION_ALPHA).sqrt()
    }
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_and_negative_signs() {
        let analyzer = SentimentAnalyzer::new();

        assert!(analyzer.compound("Buying more $AAPL, loving this rally") > 0.0);
        assert!(analyzer.compound("this company will do terrible, absolutely horrendous") < 0.0);
    }

    #[test]
    fn neutral_text_scores_exactly_zero() {
        let analyzer = SentimentAnalyzer::new();
        assert_eq!(analyzer.compound("the meeting starts at noon"), 0.0);
        assert_eq!(analyzer.compound(""), 0.0);
    }

    #[test]
    fn negation_flips_polarity() {
        let analyzer = SentimentAnalyzer::new();
        assert!(analyzer.compound("not a good quarter") < 0.0);
        assert!(analyzer.compound("never failing again") > 0.0);
    }

    #[test]
    fn negation_window_expires() {
        let analyzer = SentimentAnalyzer::new().with_negation_window(1);
        // "good" sits two words past the negation, outside the window
        assert!(analyzer.compound("not sure anymore, good result") > 0.0);
    }

    #[test]
    fn intensifiers_scale_the_next_word() {
        let analyzer = SentimentAnalyzer::new();
        let plain = analyzer.compound("good");
        let strong = analyzer.compound("extremely good");
        let damped = analyzer.compound("slightly good");

        assert!(strong > plain);
        assert!(damped < plain);
        assert!(damped > 0.0);
    }

    #[test]
    fn scores_stay_in_unit_range() {
        let analyzer = SentimentAnalyzer::new();
        let score = analyzer.compound("love love love win win win great great rally moon");
        assert!(score > 0.9 && score <= 1.0);
    }
}
