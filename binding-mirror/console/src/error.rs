use reqwest::{Method, StatusCode};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid console URL {0:?}")]
    InvalidUrl(String),

    #[error("console request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{method} {path} returned {status}")]
    Status {
        method: Method,
        path: String,
        status: StatusCode,
    },

    #[error("invalid console response: {0}")]
    Decode(#[from] serde_json::Error),
}
