use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One inbound social post, immutable once built from the wire event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamPost {
    pub author_id: String,
    pub text: String,
    /// `$SYMBOL` tags the source tagged in the post body, uppercased.
    pub cashtags: Vec<String>,
    pub created_at: DateTime<Utc>,
}
