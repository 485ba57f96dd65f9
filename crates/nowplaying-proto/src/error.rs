//! Failure reasons for an ICY title lookup.
//!
//! Callers of [`IcyFetcher::fetch_title`](crate::fetch::IcyFetcher::fetch_title)
//! never see these: every variant collapses to "no title".  They exist so the
//! logs can tell a dead station from a stream that simply has no metadata.

use std::time::Duration;

use thiserror::Error;

/// Coarse grouping of [`FetchError`] used in log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connect, DNS, TLS, bad URL or an unexpected HTTP status.
    Transport,
    /// The stream answered but did not carry a usable metadata block.
    Protocol,
    /// Byte cap or wall-clock budget exhausted.
    ResourceLimit,
    RedirectLimit,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::ResourceLimit => "resource-limit",
            Self::RedirectLimit => "redirect-limit",
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid stream url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("upstream returned {0}")]
    Status(reqwest::StatusCode),

    #[error("no usable icy-metaint header")]
    MissingMetaint,

    #[error("metadata block is empty")]
    EmptyMetadata,

    #[error("no StreamTitle in metadata block")]
    NoStreamTitle,

    #[error("stream ended after {received} bytes, before the first metadata block")]
    StreamEnded { received: usize },

    #[error("first metadata frame needs {needed} bytes, read cap is {limit}")]
    ByteLimit { needed: usize, limit: usize },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("more than {0} redirects")]
    TooManyRedirects(u8),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Http(e) if e.is_timeout() => FailureKind::ResourceLimit,
            Self::Http(_)
            | Self::InvalidUrl { .. }
            | Self::UnsupportedScheme(_)
            | Self::Status(_) => FailureKind::Transport,
            Self::MissingMetaint
            | Self::EmptyMetadata
            | Self::NoStreamTitle
            | Self::StreamEnded { .. } => FailureKind::Protocol,
            Self::ByteLimit { .. } | Self::Timeout(_) => FailureKind::ResourceLimit,
            Self::TooManyRedirects(_) => FailureKind::RedirectLimit,
        }
    }
}
