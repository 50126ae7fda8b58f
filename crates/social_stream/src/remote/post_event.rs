use chrono::{DateTime, Utc};
use serde::Deserialize;

use common::models::StreamPost;

/// Code the provider sends when it force-drops a client that fell behind
/// or exceeded its rate allowance.
pub const RATE_LIMIT_CODE: u32 = 420;

/// Raw post as delivered over the firehose. Reposts and extended bodies
/// nest the full text in different places, so almost everything is optional
/// until validated.
#[derive(Debug, Deserialize)]
pub struct PostEvent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub extended_post: Option<ExtendedBody>,
    #[serde(default)]
    pub reposted_status: Option<Box<PostEvent>>,
    #[serde(default)]
    pub user: Option<AuthorRef>,
    #[serde(default)]
    pub entities: Option<Entities>,
    #[serde(default)]
    pub timestamp_ms: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtendedBody {
    #[serde(default)]
    pub full_text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorRef {
    #[serde(default)]
    pub id_str: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub symbols: Vec<SymbolTag>,
}

#[derive(Debug, Deserialize)]
pub struct SymbolTag {
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct DisconnectFrame {
    disconnect: DisconnectInfo,
}

#[derive(Debug, Deserialize)]
pub struct DisconnectInfo {
    pub code: u32,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug)]
pub enum StreamMessage {
    Post(Box<PostEvent>),
    Disconnect(DisconnectInfo),
}

pub fn parse_stream_message(raw: &str) -> Result<StreamMessage, serde_json::Error> {
    if let Ok(frame) = serde_json::from_str::<DisconnectFrame>(raw) {
        return Ok(StreamMessage::Disconnect(frame.disconnect));
    }
    let event = serde_json::from_str::<PostEvent>(raw)?;
    Ok(StreamMessage::Post(Box::new(event)))
}

impl PostEvent {
    /// Full post body, preferring the longest variant the provider sent:
    /// reposted extended text, then extended text, then the plain fields.
    pub fn body_text(&self) -> Option<String> {
        let cleaned = normalize_body(&self.raw_body()?);
        if cleaned.is_empty() { None } else { Some(cleaned) }
    }

    fn raw_body(&self) -> Option<String> {
        let repost = self.reposted_status.as_deref();
        repost
            .and_then(|r| r.extended_post.as_ref())
            .and_then(|e| e.full_text.clone())
            .or_else(|| repost.and_then(|r| r.full_text.clone()))
            .or_else(|| self.extended_post.as_ref().and_then(|e| e.full_text.clone()))
            .or_else(|| self.full_text.clone())
            .or_else(|| repost.and_then(|r| r.text.clone()))
            .or_else(|| self.text.clone())
    }

    pub fn author_id(&self) -> Option<&str> {
        self.user.as_ref()?.id_str.as_deref()
    }

    pub fn cashtags(&self) -> Vec<String> {
        self.entities
            .as_ref()
            .map(|e| e.symbols.iter().map(|s| s.text.to_uppercase()).collect())
            .unwrap_or_default()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.timestamp_ms
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now)
    }

    /// Validates the event into a pipeline post. `None` when the author or
    /// body is missing (malformed events are silently dropped upstream).
    pub fn to_stream_post(&self) -> Option<StreamPost> {
        let author_id = self.author_id()?.to_string();
        let text = self.body_text()?;
        Some(StreamPost {
            author_id,
            text,
            cashtags: self.cashtags(),
            created_at: self.created_at(),
        })
    }
}

fn normalize_body(raw: &str) -> String {
    let mut text = raw.replace(['\n', '\r'], " ").trim().to_string();

    // the provider truncates long bodies mid-word behind an ellipsis
    if text.ends_with('…') || text.ends_with("...") {
        match text.rfind(' ') {
            Some(idx) => text.truncate(idx),
            None => {
                text = text.trim_end_matches('…').trim_end_matches('.').to_string();
            }
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_post() {
        let raw = r#"{
            "text": "Buying more $AAPL, loving this rally",
            "user": {"id_str": "25073877"},
            "entities": {"symbols": [{"text": "aapl"}]},
            "timestamp_ms": "1700000000000"
        }"#;

        let StreamMessage::Post(event) = parse_stream_message(raw).unwrap() else {
            panic!("expected a post");
        };
        let post = event.to_stream_post().unwrap();

        assert_eq!(post.author_id, "25073877");
        assert_eq!(post.text, "Buying more $AAPL, loving this rally");
        assert_eq!(post.cashtags, vec!["AAPL".to_string()]);
        assert_eq!(post.created_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn prefers_extended_repost_body() {
        let raw = r#"{
            "text": "RT @someone: truncated…",
            "user": {"id_str": "1"},
            "reposted_status": {
                "text": "short",
                "extended_post": {"full_text": "the entire original body"}
            }
        }"#;

        let StreamMessage::Post(event) = parse_stream_message(raw).unwrap() else {
            panic!("expected a post");
        };
        assert_eq!(event.body_text().unwrap(), "the entire original body");
    }

    #[test]
    fn strips_newlines_and_trailing_ellipsis() {
        assert_eq!(normalize_body("line one\nline two"), "line one line two");
        assert_eq!(normalize_body("cut off mid wo..."), "cut off mid");
        assert_eq!(normalize_body("cut off mid wo…"), "cut off mid");
        assert_eq!(normalize_body("word…"), "word");
    }

    #[test]
    fn missing_body_or_author_is_rejected() {
        let no_text = r#"{"user": {"id_str": "1"}}"#;
        let StreamMessage::Post(event) = parse_stream_message(no_text).unwrap() else {
            panic!("expected a post");
        };
        assert!(event.to_stream_post().is_none());

        let no_author = r#"{"text": "hello"}"#;
        let StreamMessage::Post(event) = parse_stream_message(no_author).unwrap() else {
            panic!("expected a post");
        };
        assert!(event.to_stream_post().is_none());
    }

    #[test]
    fn recognizes_disconnect_frames() {
        let raw = r#"{"disconnect": {"code": 420, "reason": "rate limited"}}"#;
        let StreamMessage::Disconnect(info) = parse_stream_message(raw).unwrap() else {
            panic!("expected a disconnect");
        };
        assert_eq!(info.code, RATE_LIMIT_CODE);
        assert_eq!(info.reason.as_deref(), Some("rate limited"));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse_stream_message("not json").is_err());
    }
}
