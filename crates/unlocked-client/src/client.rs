//! Signed calls against the approval API.
//!
//! [`UnlockedClient`] knows the three endpoints of the protocol and how to
//! read their answers; it holds no request state of its own. Sequencing the
//! calls is the job of the lifecycle in the `unlocked` crate.
//!
//! # Example
//!
//! ```no_run
//! use unlocked_client::UnlockedClient;
//! use unlocked_common::{Credentials, Endpoint, RequestState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = Endpoint::builder().host("unlocked.example.org").build();
//! let client = UnlockedClient::new(&endpoint, Credentials::new("myuser", "1234"), None)?;
//!
//! let id = client.create_request("backup-disk").await?;
//! if client.request_state(id).await? == RequestState::Accepted {
//!     let _secret = client.fulfill_request(id).await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use secrecy::SecretString;
use serde_json::Value;
use url::Url;

use unlocked_common::{
    Credentials, Endpoint, HeaderList, IncomingResponse, Method, OutgoingRequest, RequestState,
};

use crate::error::ClientError;
use crate::signer::{Signer, date_header};
use crate::transport::{ReqwestTransport, Transport};

/// Path of the request collection, relative to the base URL.
pub const REQUESTS_PATH: &str = "api/requests";

const ACCEPT: &str = "Accept";
const CONTENT_TYPE: &str = "Content-Type";

const APPLICATION_JSON: &str = "application/json";
const TEXT_PLAIN: &str = "text/plain";
const JSON_UTF8: &str = "application/json; charsets: utf-8";

const FULFILL_BODY: &str = r#"{"state": "FULFILLED"}"#;

/// Client for the approval API.
///
/// Every request carries a fresh `Date` header and an HMAC signature over
/// it and the body, computed with the configured credentials.
#[derive(Debug, Clone)]
pub struct UnlockedClient<T = ReqwestTransport> {
    transport: T,
    signer: Signer,
    base_url: Url,
}

impl UnlockedClient<ReqwestTransport> {
    /// Creates a client talking HTTPS to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint does not form a valid URL or the HTTP
    /// client cannot be built.
    pub fn new(
        endpoint: &Endpoint,
        credentials: Credentials,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(endpoint.verify_tls, timeout)?;
        Self::with_transport(transport, endpoint, credentials)
    }
}

impl<T: Transport> UnlockedClient<T> {
    /// Creates a client that sends through `transport`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint does not form a valid URL.
    pub fn with_transport(
        transport: T,
        endpoint: &Endpoint,
        credentials: Credentials,
    ) -> Result<Self, ClientError> {
        let base_url = endpoint.base_url().map_err(|e| {
            ClientError::ConfigurationError(format!("Invalid host '{}': {e}", endpoint.host))
        })?;

        Ok(Self {
            transport,
            signer: Signer::new(credentials),
            base_url,
        })
    }

    /// Replaces the base URL, e.g. to talk plain HTTP to a test server.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid absolute URL.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ClientError> {
        let mut url = Url::parse(base_url).map_err(|e| {
            ClientError::ConfigurationError(format!("Invalid base URL '{base_url}': {e}"))
        })?;
        // Relative API paths must resolve below the given path, not beside it
        if !url.path().ends_with('/') {
            url.set_path(&format!("{}/", url.path()));
        }
        self.base_url = url;
        Ok(self)
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn username(&self) -> &str {
        self.signer.username()
    }

    /// Assembles a signed request.
    ///
    /// Headers are, in order: `Date`, `Authorization`, `Accept` and, for
    /// requests with a body, `Content-Type`. Only `Date` and the body are
    /// covered by the signature. `now` pins the date; `None` uses the clock.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` cannot be resolved or signing fails.
    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        now: Option<DateTime<Utc>>,
    ) -> Result<OutgoingRequest, ClientError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ClientError::InvalidRequest(format!("Invalid path '{path}': {e}")))?;

        let mut headers = HeaderList::new();
        headers.push_header(date_header(now))?;
        self.signer.authorize(&mut headers, body.as_deref())?;

        let accept = match method {
            Method::Patch => TEXT_PLAIN,
            Method::Get | Method::Post => APPLICATION_JSON,
        };
        headers.push(ACCEPT, accept)?;

        if matches!(method, Method::Post | Method::Patch) {
            headers.push(CONTENT_TYPE, JSON_UTF8)?;
        }

        Ok(OutgoingRequest {
            method,
            url,
            headers,
            body,
        })
    }

    /// Sends a request through the transport.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn send(&self, request: &OutgoingRequest) -> Result<IncomingResponse, ClientError> {
        self.transport.perform(request).await
    }

    /// Registers a request for the key `handle` and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, on any status other than 201,
    /// or if the answer lacks a non-negative integer `id`.
    pub async fn create_request(&self, handle: &str) -> Result<u64, ClientError> {
        let body = format!(r#"{{"key": {}}}"#, serde_json::to_string(handle)?);
        let request = self.build_request(Method::Post, REQUESTS_PATH, Some(body), None)?;

        let response = self.send(&request).await?;
        check_status(&response, 201)?;
        check_content_type(&response, APPLICATION_JSON);

        let value: Value = serde_json::from_slice(&response.body)?;
        let id = value
            .get("id")
            .ok_or_else(|| ClientError::InvalidResponse(r#"Key "id" not found"#.to_string()))?
            .as_u64()
            .ok_or_else(|| {
                ClientError::InvalidResponse(r#"Value of key "id" is not numeric"#.to_string())
            })?;

        debug!("Created key request {id} for '{handle}'");
        Ok(id)
    }

    /// Reads the current state of request `id`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, on any status other than 200,
    /// if the answer lacks a string `state`, or if the state is not one the
    /// server is expected to report.
    pub async fn request_state(&self, id: u64) -> Result<RequestState, ClientError> {
        let path = format!("{REQUESTS_PATH}/{id}");
        let request = self.build_request(Method::Get, &path, None, None)?;

        let response = self.send(&request).await?;
        check_status(&response, 200)?;
        check_content_type(&response, APPLICATION_JSON);

        let value: Value = serde_json::from_slice(&response.body)?;
        let state = value
            .get("state")
            .ok_or_else(|| ClientError::InvalidResponse(r#"Key "state" not found"#.to_string()))?
            .as_str()
            .ok_or_else(|| {
                ClientError::InvalidResponse(r#"Value of key "state" is not a string"#.to_string())
            })?;

        let state = state
            .parse::<RequestState>()
            .map_err(|_| ClientError::UnknownState(state.to_string()))?;
        debug!("Key request {id} is {state}");
        Ok(state)
    }

    /// Marks request `id` as fulfilled and collects the secret.
    ///
    /// A single trailing newline sent by the server is removed.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, on any status other than 200,
    /// or if the secret is not valid UTF-8.
    pub async fn fulfill_request(&self, id: u64) -> Result<SecretString, ClientError> {
        let path = format!("{REQUESTS_PATH}/{id}");
        let request =
            self.build_request(Method::Patch, &path, Some(FULFILL_BODY.to_string()), None)?;

        let response = self.send(&request).await?;
        check_status(&response, 200)?;
        check_content_type(&response, TEXT_PLAIN);

        let text = response
            .text()
            .map_err(|e| ClientError::InvalidResponse(format!("Secret is not valid UTF-8: {e}")))?;
        let secret = text.strip_suffix('\n').unwrap_or(text);

        debug!("Collected secret for key request {id} ({} bytes)", secret.len());
        Ok(SecretString::from(secret.to_string()))
    }
}

fn check_status(response: &IncomingResponse, expected: u16) -> Result<(), ClientError> {
    match response.status {
        status if status == expected => Ok(()),
        401 => Err(ClientError::AuthenticationError { status: 401 }),
        status => Err(ClientError::UnexpectedStatus {
            status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        }),
    }
}

/// Warns when the media type is missing or differs from `expected`.
fn check_content_type(response: &IncomingResponse, expected: &str) {
    match response.content_type() {
        None => warn!("Response has no content type, expected {expected}"),
        Some(content_type) => {
            let media_type = content_type.split(';').next().unwrap_or_default().trim();
            if media_type != expected {
                warn!("Unexpected content type '{content_type}', expected {expected}");
            }
        }
    }
}
