use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());
static MENTION_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@\w+").unwrap());
static CASHTAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[A-Za-z]{1,10}\b").unwrap());

/// Words that terminate a noun-phrase-like span: determiners, pronouns,
/// conjunctions, auxiliaries and other high-frequency function words.
static FUNCTION_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "this", "that", "these", "those", "i", "you", "he", "she", "it", "we",
        "they", "me", "him", "her", "us", "them", "my", "your", "his", "its", "our", "their",
        "mine", "yours", "theirs", "who", "whom", "whose", "what", "which", "when", "where",
        "why", "how", "and", "or", "but", "nor", "so", "yet", "if", "then", "than", "as",
        "is", "are", "was", "were", "be", "been", "being", "am", "do", "does", "did", "done",
        "have", "has", "had", "having", "will", "would", "can", "could", "shall", "should",
        "may", "might", "must", "not", "no", "never", "very", "really", "just", "too", "also",
        "again", "more", "most", "less", "least", "much", "many", "some", "any", "all", "each",
        "every", "both", "few", "other", "another", "such", "only", "own", "same", "here",
        "there", "now", "today", "tomorrow", "yesterday", "while", "because", "before",
        "after", "about", "above", "below", "between", "through", "during", "against",
        "into", "onto", "over", "under", "out", "off", "up", "down", "once",
    ]
    .into_iter()
    .collect()
});

/// A single one of these may join two noun runs ("bank of america").
static PREPOSITIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    ["of", "in", "on", "for", "at", "with", "by", "from", "to"]
        .into_iter()
        .collect()
});

/// Removes URLs, @mentions and $cashtags; those are handled separately and
/// only pollute span extraction.
pub fn strip_markup(text: &str) -> String {
    let text = URL_REGEX.replace_all(text, " ");
    let text = MENTION_REGEX.replace_all(&text, " ");
    CASHTAG_REGEX.replace_all(&text, " ").into_owned()
}

pub(crate) fn clean_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect::<String>()
        .to_lowercase()
}

/// Extracts noun-phrase-like spans: maximal runs of content words, where a
/// single preposition may bridge two runs. Spans come back lowercased.
pub fn noun_spans(text: &str) -> Vec<String> {
    let cleaned = strip_markup(text);
    let words: Vec<String> = cleaned
        .split_whitespace()
        .map(clean_word)
        .filter(|w| !w.is_empty())
        .collect();

    let mut spans = Vec::new();
    let mut run: Vec<String> = Vec::new();

    for (idx, word) in words.iter().enumerate() {
        if PREPOSITIONS.contains(word.as_str()) {
            let next_is_content = words
                .get(idx + 1)
                .map(|w| {
                    !PREPOSITIONS.contains(w.as_str()) && !FUNCTION_WORDS.contains(w.as_str())
                })
                .unwrap_or(false);
            if !run.is_empty() && next_is_content {
                run.push(word.clone());
            } else {
                flush(&mut run, &mut spans);
            }
        } else if FUNCTION_WORDS.contains(word.as_str()) {
            flush(&mut run, &mut spans);
        } else {
            run.push(word.clone());
        }
    }
    flush(&mut run, &mut spans);
    spans
}

fn flush(run: &mut Vec<String>, spans: &mut Vec<String>) {
    if !run.is_empty() {
        spans.push(run.join(" "));
        run.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_is_stripped() {
        let out = strip_markup("check $AAPL via @analyst https://example.com/x now");
        assert!(!out.contains("$AAPL"));
        assert!(!out.contains("@analyst"));
        assert!(!out.contains("https://"));
        assert!(out.contains("check"));
        assert!(out.contains("now"));
    }

    #[test]
    fn function_words_break_spans() {
        let spans = noun_spans("Good Apple Inc will do terrible today");
        assert_eq!(spans, vec!["good apple inc".to_string(), "terrible".to_string()]);
    }

    #[test]
    fn preposition_joins_two_runs() {
        let spans = noun_spans("bank of america is failing");
        assert_eq!(spans, vec!["bank of america".to_string(), "failing".to_string()]);
    }

    #[test]
    fn cashtags_do_not_produce_spans() {
        let spans = noun_spans("Buying more $AAPL, loving this rally");
        assert_eq!(
            spans,
            vec!["buying".to_string(), "loving".to_string(), "rally".to_string()]
        );
    }

    #[test]
    fn trailing_preposition_is_dropped() {
        let spans = noun_spans("shares of");
        assert_eq!(spans, vec!["shares".to_string()]);
    }
}
