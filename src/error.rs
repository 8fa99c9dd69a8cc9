//! Crate-level error type.
//!
//! Dispatch deliberately keeps per-panel completion failures *out* of this
//! enum: a failed panel records `"Error fetching response."` in its own
//! conversation instead of propagating. `ArenaError` covers everything that
//! stops an operation outright — bad config, a rejected submission, the
//! catalog being unreachable, or a persistence call the worker logs and drops.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArenaError {
    /// The models-listing fetch for one provider failed. Retryable: the
    /// front-end offers a user-initiated retry, never an automatic one.
    #[error("model catalog fetch failed for {provider}: {reason}")]
    Catalog { provider: String, reason: String },

    /// Submission guard: every panel must have a model selected.
    #[error("please select a model for all panels")]
    MissingModel,

    /// Non-2xx from a provider's chat-completions endpoint.
    #[error("{provider} API error (HTTP {status}): {body}")]
    Provider {
        provider: String,
        status: u16,
        body: String,
    },

    /// The save endpoint rejected the call with a non-2xx status.
    #[error("save endpoint returned HTTP {0}")]
    SaveRejected(u16),

    /// Persistence requires a present, non-empty user id.
    #[error("not authenticated")]
    Unauthorized,

    /// A save payload is missing a required field.
    #[error("missing required data: {0}")]
    BadRequest(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("history store error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArenaError {
    /// Whether the front-end should offer a retry action for this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ArenaError::Catalog { .. } | ArenaError::Http(_))
    }
}
