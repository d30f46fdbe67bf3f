//! Error types for the RTSP client library.

use std::fmt;
use std::time::Duration;

/// RTSP status signalling that the requested transport is not supported
/// (RFC 2326 §11.3.13, "Unsupported transport").
pub const STATUS_UNSUPPORTED_TRANSPORT: u16 = 461;

/// Errors that can occur in the RTSP client library.
///
/// Variants map to specific failure modes across one session attempt:
///
/// - **Construction**: [`InvalidUrl`](Self::InvalidUrl): the target address
///   is not a usable `rtsp://` URL.
/// - **Protocol**: [`Status`](Self::Status),
///   [`InvalidDescription`](Self::InvalidDescription),
///   [`NoSubsessions`](Self::NoSubsessions),
///   [`TimedOut`](Self::TimedOut): reported by the protocol collaborator
///   during negotiation, or a request it never answered.
/// - **Transport**: [`Io`](Self::Io): socket/network failures.
/// - **Lifecycle**: [`Cancelled`](Self::Cancelled): the attempt was
///   interrupted by [`StreamSource::stop`](crate::StreamSource::stop).
///
/// None of these reach frame subscribers; they end (or skip part of) a
/// single attempt and the reconnect supervisor takes over.
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The target address could not be parsed. `url` has any password
    /// removed.
    #[error("invalid RTSP URL {url:?}: {kind}")]
    InvalidUrl { url: String, kind: UrlErrorKind },

    /// The server answered a request with a non-success status.
    #[error("server responded {code} {reason}")]
    Status { code: u16, reason: String },

    /// The session description could not be turned into a media session.
    #[error("invalid session description: {0}")]
    InvalidDescription(String),

    /// The session description advertised no media (no `m=` lines).
    #[error("session description has no media subsessions")]
    NoSubsessions,

    /// The server did not answer a request within
    /// [`SourceConfig::request_timeout`](crate::SourceConfig::request_timeout).
    #[error("no response to {request} within {after:?}")]
    TimedOut {
        request: &'static str,
        after: Duration,
    },

    /// The attempt was cancelled by a stop request.
    #[error("cancelled")]
    Cancelled,
}

impl RtspError {
    /// Build a [`Status`](Self::Status) error.
    pub fn status(code: u16, reason: impl Into<String>) -> Self {
        Self::Status {
            code,
            reason: reason.into(),
        }
    }

    /// Status code carried by the error, if it came from a server response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the server rejected the requested transport (status 461),
    /// meaning SETUP may succeed with the stream-oriented fallback.
    pub fn is_incompatible_transport(&self) -> bool {
        self.status_code() == Some(STATUS_UNSUPPORTED_TRANSPORT)
    }
}

/// Specific kind of URL parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlErrorKind {
    /// No `scheme://` prefix.
    MissingScheme,
    /// Scheme other than `rtsp`, `rtsps` or `rtspt`.
    UnsupportedScheme,
    /// Empty host component.
    MissingHost,
    /// Port was not a number in `1..=65535`.
    InvalidPort,
}

impl fmt::Display for UrlErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingScheme => write!(f, "missing scheme"),
            Self::UnsupportedScheme => write!(f, "unsupported scheme"),
            Self::MissingHost => write!(f, "missing host"),
            Self::InvalidPort => write!(f, "invalid port"),
        }
    }
}

/// Recoverable failure while placing a delivery into a frame under
/// construction. The delivery is dropped and the frame abandoned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    /// The delivery's declared size does not fit the frame being built.
    #[error(
        "delivery of {len} bytes ({missing} missing) does not fit frame of {frame_len} bytes"
    )]
    OutOfBounds {
        len: usize,
        missing: usize,
        frame_len: usize,
    },
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
