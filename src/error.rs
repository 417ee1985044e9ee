use thiserror::Error;

/// Errors surfaced by the IPFS API client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("IPFS API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IPFS API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected IPFS API response: {0}")]
    Decode(String),
}

impl ApiError {
    /// True when the request timed out rather than failing outright.
    /// Discovery treats a timeout as "try the next probe".
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Transport(e) if e.is_timeout())
    }
}
