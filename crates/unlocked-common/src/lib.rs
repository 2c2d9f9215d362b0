//! # unlocked-common
//!
//! Common types shared by the unlocked client crates.
//!
//! This crate provides the data model of the approval protocol:
//! - Credentials and the server endpoint
//! - Insertion-ordered HTTP header lists and request/response values
//! - Key requests and their lifecycle states
//! - Polling configuration
//!
//! ## Example
//!
//! ```
//! use unlocked_common::{Endpoint, HeaderList, KeyRequest, RequestState};
//!
//! let endpoint = Endpoint::builder().host("vault.example.org").build();
//! assert_eq!(endpoint.port, 443);
//!
//! let mut headers = HeaderList::new();
//! headers.push("Accept", "application/json")?;
//! assert_eq!(headers.get("accept"), Some("application/json"));
//!
//! let request = KeyRequest::new("backup-disk");
//! assert_eq!(request.state, RequestState::Created);
//! # Ok::<(), unlocked_common::HeaderError>(())
//! ```

/// Credentials and server endpoint.
pub mod credentials;
/// Ordered headers, outgoing requests and incoming responses.
pub mod http;
/// Polling configuration for the approval loop.
pub mod poll;
/// Key requests and their lifecycle states.
pub mod request;

pub use credentials::{Credentials, Endpoint};
pub use http::{Header, HeaderError, HeaderList, IncomingResponse, Method, OutgoingRequest};
pub use poll::PollPolicy;
pub use request::{KeyRequest, RequestState, TransitionError};
