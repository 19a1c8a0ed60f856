//! Error taxonomy for catalog requests.
//!
//! Callers branch on the variant, not on message strings. Cache I/O and
//! malformed cache entries never reach this type; the store logs them and
//! reports a miss instead.

use thiserror::Error;

/// Fallback message when the transport error carries nothing readable
pub const FALLBACK_MESSAGE: &str = "Failed to fetch from catalog";

/// Failure classification for a catalog request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The request was superseded by a newer request of the same class.
    /// Expected during fast typing; callers treat it as a silent no-op.
    #[error("request cancelled")]
    Cancelled,

    /// HTTP 429 from the catalog API. Presented as a distinct advisory
    /// rather than a generic failure.
    #[error("rate limited by the catalog API")]
    RateLimited,

    /// Any other transport or HTTP failure, with the best available
    /// human-readable message.
    #[error("{message}")]
    Transport { message: String },
}

impl FetchError {
    /// Build a transport failure, substituting the fallback message when
    /// the source has nothing useful to say.
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            FetchError::Transport {
                message: FALLBACK_MESSAGE.to_string(),
            }
        } else {
            FetchError::Transport { message }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_falls_back_on_empty_message() {
        let err = FetchError::transport("");
        assert_eq!(
            err,
            FetchError::Transport {
                message: FALLBACK_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn test_transport_keeps_message() {
        let err = FetchError::transport("connection reset");
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn test_cancelled_is_distinguishable() {
        assert!(FetchError::Cancelled.is_cancelled());
        assert!(!FetchError::RateLimited.is_cancelled());
    }
}
