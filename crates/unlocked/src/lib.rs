//! # unlocked
//!
//! Request a secret from an unlocked approval server and deliver it.
//!
//! A run creates a key request, polls it until a human approver accepts or
//! denies it, collects the secret on acceptance, and hands the outcome to a
//! set of delivery modules (standard output, a socket-activated socket, or
//! your own).
//!
//! ## Example
//!
//! ```no_run
//! use unlocked::delivery::{ModuleRegistry, StdoutModule};
//! use unlocked::{Core, Credentials, Endpoint, Lifecycle, PollPolicy, UnlockedClient};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let endpoint = Endpoint::builder().host("unlocked.example.org").build();
//! let client = UnlockedClient::new(&endpoint, Credentials::new("myuser", "1234"), None)?;
//! let core = Core::new(Lifecycle::new(client, PollPolicy::default()));
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register(StdoutModule::new());
//!
//! core.run("backup-disk", &mut registry).await?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod delivery;
pub mod error;
pub mod events;
pub mod lifecycle;

pub use unlocked_client::*;
pub use unlocked_common::*;

pub use self::core::{Core, SecretDelivered};
pub use error::{DeliveryError, ErrorCategory, UnlockedError};
pub use events::{EventCallback, LifecycleEvent};
pub use lifecycle::Lifecycle;
