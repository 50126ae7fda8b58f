pub mod distance;
pub mod sentiment;
pub mod tokenizer;

pub use distance::{levenshtein, normalized_distance};
pub use sentiment::SentimentAnalyzer;
pub use tokenizer::{noun_spans, strip_markup};
