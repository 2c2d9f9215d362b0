//! The request state machine.
//!
//! A key request goes through `create -> poll* -> fulfill`. Each step checks
//! the local state first and returns an error without any I/O if the step
//! is not allowed. Any failure moves the request to `Failed`, except a
//! denial, which leaves it in `Denied`.
//!
//! The poll sleep and every in-flight call race against a
//! [`CancellationToken`]; firing it ends the run with
//! [`UnlockedError::Cancelled`].

use std::future::Future;

use log::{debug, info, warn};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use unlocked_client::{ClientError, ReqwestTransport, Transport, UnlockedClient};
use unlocked_common::{KeyRequest, PollPolicy, RequestState};

use crate::error::UnlockedError;
use crate::events::{EventCallback, LifecycleEvent};

/// Drives one key request against the approval server.
pub struct Lifecycle<T: Transport = ReqwestTransport> {
    client: UnlockedClient<T>,
    policy: PollPolicy,
    cancel: CancellationToken,
    event_callback: Option<EventCallback>,
}

impl<T: Transport> Lifecycle<T> {
    pub fn new(client: UnlockedClient<T>, policy: PollPolicy) -> Self {
        Self {
            client,
            policy,
            cancel: CancellationToken::new(),
            event_callback: None,
        }
    }

    /// Uses `cancel` to abort waiting and in-flight calls.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    pub const fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs the whole lifecycle and returns the secret.
    ///
    /// # Errors
    ///
    /// Returns the first error of any step. On return the request is in a
    /// terminal state.
    pub async fn run(&self, request: &mut KeyRequest) -> Result<SecretString, UnlockedError> {
        self.create(request).await?;
        self.await_decision(request).await?;
        self.fulfill(request).await
    }

    /// `Created -> Pending`: registers the request with the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is not `Created` or the server call
    /// fails.
    pub async fn create(&self, request: &mut KeyRequest) -> Result<(), UnlockedError> {
        Self::expect_state(request, RequestState::Created)?;

        info!("Requesting key '{}'", request.handle);
        match self.call(self.client.create_request(&request.handle)).await {
            Ok(id) => {
                request.id = Some(id);
                self.advance(request, RequestState::Pending).await
            }
            Err(e) => Err(Self::abort(request, e)),
        }
    }

    /// Queries the state of a pending request once.
    ///
    /// Returns the new local state: `Pending`, `Accepted` or `Denied`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is not `Pending`, the server call
    /// fails, or the server reports a state that cannot follow `Pending`.
    pub async fn poll(&self, request: &mut KeyRequest) -> Result<RequestState, UnlockedError> {
        let id = Self::pending_id(request)?;

        let state = match self.call(self.client.request_state(id)).await {
            Ok(state) => state,
            Err(e) => return Err(Self::abort(request, e)),
        };

        match state {
            RequestState::Pending => Ok(state),
            RequestState::Accepted | RequestState::Denied => {
                self.advance(request, state).await?;
                Ok(state)
            }
            _ => Err(Self::abort(request, UnlockedError::UnexpectedState { id, state })),
        }
    }

    /// Polls until the server reports a decision.
    ///
    /// # Errors
    ///
    /// Returns [`UnlockedError::Denied`] if the approver declined, an error
    /// if the poll limit is reached or the run is cancelled, and any error of
    /// [`Lifecycle::poll`].
    pub async fn await_decision(&self, request: &mut KeyRequest) -> Result<(), UnlockedError> {
        let id = Self::pending_id(request)?;
        let mut attempts: u32 = 0;

        if !self.policy.allows(attempts) {
            return Err(Self::abort(
                request,
                UnlockedError::PollLimitExceeded { id, attempts },
            ));
        }

        loop {
            let state = self.poll(request).await?;
            attempts = attempts.saturating_add(1);

            match state {
                RequestState::Denied => {
                    warn!("Key request {id} was denied");
                    return Err(UnlockedError::Denied { id });
                }
                RequestState::Pending => {}
                _ => return Ok(()),
            }

            if !self.policy.allows(attempts) {
                return Err(Self::abort(
                    request,
                    UnlockedError::PollLimitExceeded { id, attempts },
                ));
            }

            debug!(
                "Key request {id} pending, polling again in {:?}",
                self.policy.interval
            );
            self.emit(LifecycleEvent::PollWaiting {
                id,
                attempt: attempts,
                interval: self.policy.interval,
            })
            .await;

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Err(Self::abort(request, UnlockedError::Cancelled));
                }
                () = tokio::time::sleep(self.policy.interval) => {}
            }
        }
    }

    /// `Accepted -> Fulfilled`: collects the secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is not `Accepted` or the server call
    /// fails.
    pub async fn fulfill(&self, request: &mut KeyRequest) -> Result<SecretString, UnlockedError> {
        Self::expect_state(request, RequestState::Accepted)?;
        let Some(id) = request.id else {
            return Err(Self::abort(
                request,
                UnlockedError::OutOfOrder {
                    expected: RequestState::Accepted,
                    actual: RequestState::Created,
                },
            ));
        };

        match self.call(self.client.fulfill_request(id)).await {
            Ok(secret) => {
                self.advance(request, RequestState::Fulfilled).await?;
                info!("Key request {id} fulfilled");
                Ok(secret)
            }
            Err(e) => Err(Self::abort(request, e)),
        }
    }

    /// Awaits a client call unless the run is cancelled first.
    async fn call<R>(
        &self,
        future: impl Future<Output = Result<R, ClientError>>,
    ) -> Result<R, UnlockedError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(UnlockedError::Cancelled),
            result = future => result.map_err(UnlockedError::from),
        }
    }

    async fn advance(
        &self,
        request: &mut KeyRequest,
        next: RequestState,
    ) -> Result<(), UnlockedError> {
        let from = request.transition(next)?;
        self.emit(LifecycleEvent::StateChanged {
            id: request.id,
            from,
            to: next,
        })
        .await;
        Ok(())
    }

    async fn emit(&self, event: LifecycleEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event).await;
        }
    }

    fn abort(request: &mut KeyRequest, error: impl Into<UnlockedError>) -> UnlockedError {
        let error = error.into();
        warn!("Key request '{}' failed: {error}", request.handle);
        request.fail();
        error
    }

    fn expect_state(request: &KeyRequest, expected: RequestState) -> Result<(), UnlockedError> {
        match request.state {
            state if state == expected => Ok(()),
            state if state.is_terminal() => Err(UnlockedError::Terminal(state)),
            actual => Err(UnlockedError::OutOfOrder { expected, actual }),
        }
    }

    fn pending_id(request: &KeyRequest) -> Result<u64, UnlockedError> {
        Self::expect_state(request, RequestState::Pending)?;
        request.id.ok_or(UnlockedError::OutOfOrder {
            expected: RequestState::Pending,
            actual: RequestState::Created,
        })
    }
}
