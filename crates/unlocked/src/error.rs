use thiserror::Error;

use unlocked_client::ClientError;
use unlocked_common::{RequestState, TransitionError};

/// Why a run did not end with the secret delivered.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UnlockedError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Key request {id} was denied")]
    Denied { id: u64 },

    #[error("Server reported state {state} for key request {id}")]
    UnexpectedState { id: u64, state: RequestState },

    #[error("Key request {id} still pending after {attempts} polls")]
    PollLimitExceeded { id: u64, attempts: u32 },

    #[error("Key request cancelled")]
    Cancelled,

    #[error("Key request is already {0}")]
    Terminal(RequestState),

    #[error("Key request is {actual}, expected {expected}")]
    OutOfOrder {
        expected: RequestState,
        actual: RequestState,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Errors raised by the delivery dispatcher and the built-in modules.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DeliveryError {
    #[error("Module {module} failed: {source:#}")]
    Module {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Delivery was already dispatched for this run")]
    AlreadyDispatched,

    #[error("Invalid configuration for module {module}: {reason}")]
    InvalidConfig { module: String, reason: String },

    #[error("No socket passed by systemd")]
    SocketMissing,

    #[error("Too many sockets passed by systemd ({0}), expected one")]
    TooManySockets(usize),

    #[error("Socket passed by systemd but the sd_socket module is disabled")]
    SocketDisabled,

    #[error("Invalid socket activation environment: {0}")]
    SocketEnvironment(String),
}

/// Coarse classification of a failed run, one process exit code each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The server could not be reached.
    Transport,
    /// The server rejected the credentials.
    Authentication,
    /// The approver said no.
    Denied,
    /// The server answered outside the protocol.
    Protocol,
    /// A request could not be built or signed.
    Formatting,
    /// A delivery module failed.
    Delivery,
    /// The run was aborted locally before a decision.
    Cancelled,
}

impl ErrorCategory {
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Denied => 3,
            Self::Transport => 4,
            Self::Authentication => 5,
            Self::Protocol => 6,
            Self::Formatting => 7,
            Self::Delivery => 8,
            Self::Cancelled => 130,
        }
    }
}

impl UnlockedError {
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Client(e) if e.is_transport_error() => ErrorCategory::Transport,
            Self::Client(e) if e.is_authentication_error() => ErrorCategory::Authentication,
            Self::Client(e) if e.is_protocol_error() => ErrorCategory::Protocol,
            Self::Client(_) => ErrorCategory::Formatting,
            Self::Denied { .. } => ErrorCategory::Denied,
            Self::UnexpectedState { .. }
            | Self::Terminal(_)
            | Self::OutOfOrder { .. }
            | Self::Transition(_) => ErrorCategory::Protocol,
            Self::PollLimitExceeded { .. } | Self::Cancelled => ErrorCategory::Cancelled,
            Self::Delivery(_) => ErrorCategory::Delivery,
        }
    }

    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            UnlockedError::Denied { id: 1 }.category(),
            ErrorCategory::Denied
        );
        assert_eq!(
            UnlockedError::from(ClientError::AuthenticationError { status: 401 }).category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            UnlockedError::from(ClientError::UnknownState("EXPIRED".to_string())).category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            UnlockedError::from(ClientError::SigningError("no headers".to_string())).category(),
            ErrorCategory::Formatting
        );
        assert_eq!(
            UnlockedError::from(DeliveryError::SocketMissing).category(),
            ErrorCategory::Delivery
        );
        assert_eq!(UnlockedError::Cancelled.category(), ErrorCategory::Cancelled);
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let categories = [
            ErrorCategory::Transport,
            ErrorCategory::Authentication,
            ErrorCategory::Denied,
            ErrorCategory::Protocol,
            ErrorCategory::Formatting,
            ErrorCategory::Delivery,
            ErrorCategory::Cancelled,
        ];
        let codes: std::collections::HashSet<_> =
            categories.iter().map(|c| c.exit_code()).collect();
        assert_eq!(codes.len(), categories.len());
        assert!(!codes.contains(&0));
    }
}
