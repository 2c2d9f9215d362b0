//! Delivery of the secret, or of the failure, to pluggable sinks.
//!
//! A [`DeliveryModule`] receives the outcome of a run. Modules are kept in a
//! [`ModuleRegistry`] owned by the caller, which drives them through one
//! run: `parse_config -> init_all -> dispatch -> cleanup_all`.
//!
//! ## Example: a custom module
//!
//! ```rust
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use secrecy::{ExposeSecret, SecretString};
//! use unlocked::delivery::{DeliveryModule, ModuleRegistry};
//!
//! struct LengthLogger;
//!
//! #[async_trait]
//! impl DeliveryModule for LengthLogger {
//!     fn name(&self) -> &str {
//!         "length_logger"
//!     }
//!
//!     async fn on_success(&mut self, secret: &SecretString) -> Result<()> {
//!         println!("got {} bytes", secret.expose_secret().len());
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let mut registry = ModuleRegistry::new();
//! registry.register(LengthLogger);
//!
//! registry.init_all().await?;
//! registry
//!     .dispatch_success(&SecretString::from("hunter2".to_string()))
//!     .await?;
//! registry.cleanup_all().await?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error};
use secrecy::SecretString;

use crate::error::{DeliveryError, UnlockedError};

#[cfg(unix)]
pub mod socket;
pub mod stdout;

#[cfg(unix)]
pub use socket::SdSocketModule;
pub use stdout::StdoutModule;

/// A sink for the outcome of a run.
///
/// Every capability except [`DeliveryModule::name`] has a no-op default.
#[async_trait]
pub trait DeliveryModule: Send + Sync {
    /// Name of the module, also the name of its configuration table.
    fn name(&self) -> &str;

    /// Disabled modules are skipped by dispatch but still initialized and
    /// cleaned up.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Reads the module's table from the configuration file.
    fn parse_config(&mut self, _config: &toml::Table) -> Result<()> {
        Ok(())
    }

    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn on_success(&mut self, _secret: &SecretString) -> Result<()> {
        Ok(())
    }

    async fn on_failure(&mut self, _error: &UnlockedError) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Ordered set of delivery modules for one run.
///
/// Registration order is delivery order. The outcome is dispatched at most
/// once, either as success or as failure; cleanup drains the registry.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Box<dyn DeliveryModule>>,
    dispatched: bool,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: impl DeliveryModule + 'static) {
        self.register_boxed(Box::new(module));
    }

    pub fn register_boxed(&mut self, module: Box<dyn DeliveryModule>) {
        debug!("Registered delivery module {}", module.name());
        self.modules.push(module);
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Names of the modules dispatch will call.
    #[must_use]
    pub fn enabled_names(&self) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|m| m.is_enabled())
            .map(|m| m.name())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    #[must_use]
    pub const fn is_dispatched(&self) -> bool {
        self.dispatched
    }

    /// Hands each module its table from `config`, if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if a module's entry is not a table or the module
    /// rejects it.
    pub fn parse_config(&mut self, config: &toml::Table) -> Result<(), DeliveryError> {
        for module in &mut self.modules {
            let Some(value) = config.get(module.name()) else {
                continue;
            };
            let table = value.as_table().ok_or_else(|| DeliveryError::InvalidConfig {
                module: module.name().to_string(),
                reason: "expected a table".to_string(),
            })?;
            module
                .parse_config(table)
                .map_err(|e| DeliveryError::InvalidConfig {
                    module: module.name().to_string(),
                    reason: format!("{e:#}"),
                })?;
        }
        Ok(())
    }

    /// Initializes every module in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first module error.
    pub async fn init_all(&mut self) -> Result<(), DeliveryError> {
        for module in &mut self.modules {
            debug!("Initializing delivery module {}", module.name());
            module.init().await.map_err(|source| DeliveryError::Module {
                module: module.name().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Delivers the secret to every enabled module, in order.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::AlreadyDispatched`] on a second dispatch and
    /// the first module error otherwise; later modules are not called.
    pub async fn dispatch_success(&mut self, secret: &SecretString) -> Result<(), DeliveryError> {
        self.begin_dispatch()?;
        for module in self.modules.iter_mut().filter(|m| m.is_enabled()) {
            debug!("Delivering secret to module {}", module.name());
            module
                .on_success(secret)
                .await
                .map_err(|source| DeliveryError::Module {
                    module: module.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Reports a failed run to every enabled module, in order.
    ///
    /// # Errors
    ///
    /// Same as [`ModuleRegistry::dispatch_success`].
    pub async fn dispatch_failure(&mut self, failure: &UnlockedError) -> Result<(), DeliveryError> {
        self.begin_dispatch()?;
        for module in self.modules.iter_mut().filter(|m| m.is_enabled()) {
            debug!("Reporting failure to module {}", module.name());
            module
                .on_failure(failure)
                .await
                .map_err(|source| DeliveryError::Module {
                    module: module.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Cleans up and removes every module.
    ///
    /// All modules are cleaned up even if some fail.
    ///
    /// # Errors
    ///
    /// Returns the first cleanup error.
    pub async fn cleanup_all(&mut self) -> Result<(), DeliveryError> {
        let mut first_error = None;
        for mut module in self.modules.drain(..) {
            if let Err(source) = module.cleanup().await {
                let err = DeliveryError::Module {
                    module: module.name().to_string(),
                    source,
                };
                if first_error.is_none() {
                    first_error = Some(err);
                } else {
                    error!("{err}");
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Makes the registry usable for another run.
    pub fn reset(&mut self) {
        self.modules.clear();
        self.dispatched = false;
    }

    const fn begin_dispatch(&mut self) -> Result<(), DeliveryError> {
        if self.dispatched {
            return Err(DeliveryError::AlreadyDispatched);
        }
        self.dispatched = true;
        Ok(())
    }
}
