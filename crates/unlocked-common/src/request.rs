use std::fmt;
use std::str::FromStr;

use log::debug;
use thiserror::Error;

/// Lifecycle state of a key request as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    /// Not yet sent to the server.
    Created,
    /// Known to the server, waiting for an approver.
    Pending,
    /// Approved; the secret can be collected.
    Accepted,
    /// Rejected by the approver.
    Denied,
    /// The secret was handed out.
    Fulfilled,
    /// Aborted by an error. Absorbing.
    Failed,
}

impl RequestState {
    /// Terminal states never issue another request.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Denied | Self::Fulfilled | Self::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Created => matches!(next, Self::Pending | Self::Failed),
            Self::Pending => matches!(
                next,
                Self::Pending | Self::Accepted | Self::Denied | Self::Failed
            ),
            Self::Accepted => matches!(next, Self::Fulfilled | Self::Failed),
            Self::Denied | Self::Fulfilled | Self::Failed => false,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Pending => write!(f, "PENDING"),
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::Denied => write!(f, "DENIED"),
            Self::Fulfilled => write!(f, "FULFILLED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Parses the state vocabulary used by the server.
impl FromStr for RequestState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACCEPTED" => Ok(Self::Accepted),
            "DENIED" => Ok(Self::Denied),
            "FULFILLED" => Ok(Self::Fulfilled),
            _ => anyhow::bail!("Unknown request state: {s}"),
        }
    }
}

/// A transition the state machine does not allow.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Invalid state transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: RequestState,
    pub to: RequestState,
}

/// The single key request of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequest {
    /// Server-assigned id, set once the request has been created.
    pub id: Option<u64>,
    /// Handle of the requested key.
    pub handle: String,
    pub state: RequestState,
}

impl KeyRequest {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            id: None,
            handle: handle.into(),
            state: RequestState::Created,
        }
    }

    /// Moves to `next` and returns the previous state.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not permitted; the state is
    /// left untouched in that case.
    pub fn transition(&mut self, next: RequestState) -> Result<RequestState, TransitionError> {
        let from = self.state;
        if !from.can_transition_to(next) {
            return Err(TransitionError { from, to: next });
        }
        if from != next {
            debug!("Key request {:?} ({}): {from} -> {next}", self.id, self.handle);
        }
        self.state = next;
        Ok(from)
    }

    /// Moves to `Failed` unless a terminal state was already reached.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            debug!("Key request {:?} ({}): {} -> FAILED", self.id, self.handle, self.state);
            self.state = RequestState::Failed;
        }
    }
}
