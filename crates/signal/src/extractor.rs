use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use brokerage::Brokerage;
use common::models::{ExtractedSignal, SignalCandidate};

use crate::nlp::sentiment::SentimentAnalyzer;
use crate::nlp::{distance, tokenizer};

/// Turns raw post text into a sentiment score plus a deduplicated list of
/// tradeable candidates. Lookup failures never escape this type: a span
/// that cannot be resolved simply yields no candidate.
pub struct SignalExtractor {
    brokerage: Arc<dyn Brokerage>,
    analyzer: SentimentAnalyzer,
    match_cutoff: f64,
    weight_cutoff: f64,
    min_span_length: usize,
    denylist: Vec<String>,
}

impl SignalExtractor {
    pub fn new(brokerage: Arc<dyn Brokerage>) -> Self {
        Self {
            brokerage,
            analyzer: SentimentAnalyzer::new(),
            match_cutoff: 1.4,
            weight_cutoff: 10.0,
            min_span_length: 4,
            denylist: Vec::new(),
        }
    }

    pub fn with_match_cutoff(mut self, cutoff: f64) -> Self {
        self.match_cutoff = cutoff;
        self
    }

    pub fn with_weight_cutoff(mut self, cutoff: f64) -> Self {
        self.weight_cutoff = cutoff;
        self
    }

    pub fn with_min_span_length(mut self, length: usize) -> Self {
        self.min_span_length = length;
        self
    }

    pub fn with_denylist(mut self, denylist: Vec<String>) -> Self {
        self.denylist = denylist
            .into_iter()
            .map(|name| name.trim().to_lowercase())
            .collect();
        self
    }

    pub async fn extract(&self, text: &str, cashtags: &[String]) -> ExtractedSignal {
        let sentiment = self.analyzer.compound(text);

        let mut candidates = Vec::new();
        for span in tokenizer::noun_spans(text) {
            let span_chars = span.chars().filter(|c| !c.is_whitespace()).count();
            if span_chars < self.min_span_length {
                continue;
            }
            let Some(candidate) = self.resolve_span(&span).await else {
                continue;
            };
            if candidate.confidence > self.match_cutoff {
                debug!(
                    "discarding {} (confidence {:.3} over cutoff)",
                    candidate.instrument.name, candidate.confidence
                );
                continue;
            }
            if candidate.weight() > self.weight_cutoff {
                debug!(
                    "discarding {} (weight {:.2} over cutoff)",
                    candidate.instrument.name,
                    candidate.weight()
                );
                continue;
            }
            candidates.push(candidate);
        }

        for tag in cashtags {
            let symbol = tag.to_uppercase();
            match self.brokerage.search_by_symbol(&symbol).await {
                Ok(Some(instrument)) => candidates.push(SignalCandidate {
                    instrument,
                    confidence: 0.0,
                }),
                Ok(None) => debug!("no instrument for cashtag ${}", symbol),
                Err(err) => debug!("cashtag lookup for ${} failed: {}", symbol, err),
            }
        }

        ExtractedSignal {
            sentiment,
            candidates: self.dedup(candidates),
        }
    }

    /// Resolves one span against the name search, dropping the leading word
    /// and retrying until something matches or the span is exhausted.
    async fn resolve_span(&self, span: &str) -> Option<SignalCandidate> {
        let mut query = span.to_string();
        loop {
            match self.brokerage.search_by_name(&query).await {
                Ok(Some(instrument)) => {
                    let confidence =
                        distance::normalized_distance(&instrument.name.to_lowercase(), &query);
                    return Some(SignalCandidate {
                        instrument,
                        confidence,
                    });
                }
                Ok(None) => match query.split_once(' ') {
                    Some((_, rest)) => query = rest.to_string(),
                    None => return None,
                },
                Err(err) => {
                    debug!("name lookup for {:?} failed: {}", query, err);
                    return None;
                }
            }
        }
    }

    /// First occurrence wins; denylisted display names are dropped outright.
    fn dedup(&self, candidates: Vec<SignalCandidate>) -> Vec<SignalCandidate> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for candidate in candidates {
            let name = candidate.instrument.name.trim().to_lowercase();
            if self.denylist.contains(&name) {
                debug!("dropping denylisted instrument {}", candidate.instrument.name);
                continue;
            }
            if seen.insert(candidate.instrument.isin.clone()) {
                unique.push(candidate);
            }
        }
        unique
    }
}
