//! Error types for the client library.

use thiserror::Error;

use unlocked_common::HeaderError;

/// Errors that can occur when talking to the approval server.
///
/// Covers transport failures, rejected credentials and responses that do
/// not follow the protocol.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Network, TLS or HTTP-level failure.
    ///
    /// DNS resolution, refused connections, certificate problems and
    /// timeouts all end up here.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// A response body that should be JSON could not be decoded.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The server rejected the signature (HTTP 401).
    ///
    /// Most likely the username or the shared secret is wrong.
    #[error("Authentication failed with status {status}, check username and secret")]
    AuthenticationError {
        /// HTTP status returned by the server.
        status: u16,
    },

    /// The server answered with a status the protocol does not expect.
    #[error("Unexpected response status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the server.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response body is well-formed but misses or mistypes a field.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The server reported a request state this client does not know.
    #[error("Unknown request state: {0}")]
    UnknownState(String),

    /// The outgoing request could not be assembled.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The request signature could not be computed.
    #[error("Signing error: {0}")]
    SigningError(String),

    /// Client configuration issue, such as an unusable host name.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl From<HeaderError> for ClientError {
    fn from(err: HeaderError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl ClientError {
    /// Check if this is an authentication error.
    pub const fn is_authentication_error(&self) -> bool {
        matches!(self, Self::AuthenticationError { .. })
    }

    /// Check if the server could not be reached or the connection broke.
    pub const fn is_transport_error(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }

    /// Check if the server answered, but not the way the protocol expects.
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::SerializationError(_)
                | Self::UnexpectedStatus { .. }
                | Self::InvalidResponse(_)
                | Self::UnknownState(_)
        )
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthenticationError { status } | Self::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            Self::NetworkError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
