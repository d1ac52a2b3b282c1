use thiserror::Error;

/// Domain error for one resolution task.
///
/// Carries owned strings only: a resolution shared between duplicate inputs
/// is cloned into every output slot, and errors cross task boundaries as
/// values, never by unwinding.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// No resolver variant matches the input, even after redirect resolution.
    #[error("no resolver for url: {url}")]
    LinkFormat { url: String },

    /// Network failure or non-2xx answer from every configured API prefix.
    #[error("upstream request failed: {url}: {message}")]
    UpstreamFetch { url: String, message: String },

    /// JSON arrived but required keys are missing; typically a region lock
    /// or removed content.
    #[error("unexpected upstream payload: {url}: {message}")]
    UpstreamShape {
        url: String,
        message: String,
        /// Truncated upstream payload for diagnostics.
        snippet: Option<String>,
    },

    /// External muxer exited non-zero. Never terminal for a resolution.
    #[error("mux failed: {0}")]
    Mux(String),
}

impl ResolveError {
    pub fn fetch(url: impl Into<String>, message: impl ToString) -> Self {
        Self::UpstreamFetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn shape(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamShape {
            url: url.into(),
            message: message.into(),
            snippet: None,
        }
    }

    pub fn shape_with_payload(
        url: impl Into<String>,
        message: impl Into<String>,
        payload: &serde_json::Value,
    ) -> Self {
        let mut snippet = payload.to_string();
        if snippet.len() > 512 {
            let mut cut = 512;
            while !snippet.is_char_boundary(cut) {
                cut -= 1;
            }
            snippet.truncate(cut);
        }
        Self::UpstreamShape {
            url: url.into(),
            message: message.into(),
            snippet: Some(snippet),
        }
    }
}

/// Cache store failure. Non-fatal by policy: always logged and treated as a
/// cache miss by the surrounding resolution.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
