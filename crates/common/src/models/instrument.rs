use serde::{Deserialize, Serialize};

/// A resolved tradeable reference. The brokerage owns the canonical record;
/// the current price is always a fresh lookup, never cached here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub isin: String,
    #[serde(default)]
    pub symbol: Option<String>,
    pub name: String,
}
