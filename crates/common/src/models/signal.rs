use crate::models::Instrument;

/// One candidate instrument recognized in a post, with the fuzzy-match
/// confidence of the resolution (0 = exact match, lower is better).
#[derive(Debug, Clone)]
pub struct SignalCandidate {
    pub instrument: Instrument,
    pub confidence: f64,
}

impl SignalCandidate {
    /// Confidence scaled by display-name length. Long names that only
    /// loosely matched the query score high and get pruned.
    pub fn weight(&self) -> f64 {
        self.confidence * self.instrument.name.chars().count() as f64
    }
}

/// Output of signal extraction for a single post.
#[derive(Debug, Clone, Default)]
pub struct ExtractedSignal {
    /// Compound polarity in [-1, 1]. Exactly 0.0 means no actionable signal.
    pub sentiment: f64,
    pub candidates: Vec<SignalCandidate>,
}

impl ExtractedSignal {
    pub fn is_actionable(&self) -> bool {
        self.sentiment != 0.0 && !self.candidates.is_empty()
    }
}
