//! Fetch Error Taxonomy
//!
//! Every failure of a remote read or action is one of three kinds. The cache
//! treats them uniformly and only forwards the message for display.

use std::fmt;

/// Failure reported by a fetch function or a remote action.
///
/// `Clone` so that one outcome can be handed to every caller that joined
/// the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The backend could not be reached.
    #[error("network error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("server error ({status}): {message}")]
    Protocol {
        /// HTTP status code.
        status: u16,
        /// Server-supplied message.
        message: String,
    },

    /// The payload did not have the expected shape.
    #[error("invalid response payload: {0}")]
    Decode(String),
}

impl FetchError {
    /// The error category.
    #[must_use]
    pub const fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Transport(_) => FetchErrorKind::Transport,
            Self::Protocol { .. } => FetchErrorKind::Protocol,
            Self::Decode(_) => FetchErrorKind::Decode,
        }
    }

    /// Message suitable for showing to the operator.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transport(message) | Self::Decode(message) | Self::Protocol { message, .. } => {
                message
            }
        }
    }
}

/// Category of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Network unreachable.
    Transport,
    /// Non-success status.
    Protocol,
    /// Payload shape mismatch.
    Decode,
}

impl FetchErrorKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Decode => "decode",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
