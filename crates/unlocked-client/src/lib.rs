//! # unlocked-client
//!
//! HMAC-signed HTTP client for the unlocked approval API.
//!
//! This crate provides:
//! - Request signing ([`signer`])
//! - A transport seam with a `reqwest` implementation ([`transport`])
//! - The three protocol calls: create, poll and fulfill ([`client`])
//!
//! Request sequencing, polling and delivery of the secret live in the
//! `unlocked` crate.

pub mod client;
pub mod error;
pub mod signer;
pub mod transport;

pub use client::UnlockedClient;
pub use error::ClientError;
pub use signer::{Signer, sign};
pub use transport::{ReqwestTransport, Transport};
