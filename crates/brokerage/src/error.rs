use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerageError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("api error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}
