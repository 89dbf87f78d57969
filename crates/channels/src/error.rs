use std::error::Error as StdError;

use parley_common::FromMessage;

/// Crate-wide result type for channel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed channel errors shared across channel traits.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid channel input: {message}")]
    InvalidInput { message: String },

    /// Wrapped source error from a channel collaborator.
    #[error("channel operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    /// Wrap an `anyhow` error returned by a collaborator.
    #[must_use]
    pub fn collaborator(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::External {
            context: context.into(),
            source: source.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::InvalidInput { message }
    }
}

parley_common::impl_context!();

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_errors_keep_context_and_source() {
        let err = Error::collaborator("telegram send", anyhow::anyhow!("429 too many requests"));
        assert_eq!(
            err.to_string(),
            "channel operation failed: telegram send: 429 too many requests"
        );
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn invalid_input_message() {
        assert_eq!(
            Error::invalid_input("channel is required").to_string(),
            "invalid channel input: channel is required"
        );
    }

    #[test]
    fn context_builds_invalid_input() {
        let err = None::<&str>.context("send requires a target (to)").unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));

        let parsed: Result<u32> = "x".parse::<u32>().context("maxSelections");
        assert_eq!(
            parsed.unwrap_err().to_string(),
            "invalid channel input: maxSelections: invalid digit found in string"
        );
    }
}
