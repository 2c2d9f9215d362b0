use log::{error, info};

use unlocked_client::{ReqwestTransport, Transport};
use unlocked_common::KeyRequest;

use crate::delivery::ModuleRegistry;
use crate::error::UnlockedError;
use crate::lifecycle::Lifecycle;

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretDelivered {
    pub handle: String,
    pub id: u64,
    /// Modules that received the secret, in delivery order
    pub modules: Vec<String>,
}

/// Runs one key request from module initialization to cleanup.
pub struct Core<T: Transport = ReqwestTransport> {
    pub lifecycle: Lifecycle<T>,
}

impl<T: Transport> Core<T> {
    pub const fn new(lifecycle: Lifecycle<T>) -> Self {
        Self { lifecycle }
    }

    /// Requests `handle`, then hands the secret or the failure to the
    /// modules in `registry`.
    ///
    /// Modules are always cleaned up, and the registry is drained afterwards.
    /// If module initialization fails no request is made.
    ///
    /// # Errors
    ///
    /// Returns the lifecycle error if the request failed, otherwise the first
    /// delivery error. A cleanup error is returned only if nothing failed
    /// before it.
    pub async fn run(
        &self,
        handle: &str,
        registry: &mut ModuleRegistry,
    ) -> Result<SecretDelivered, UnlockedError> {
        let mut request = KeyRequest::new(handle);
        let result = self.execute(&mut request, registry).await;
        let cleanup = registry.cleanup_all().await;

        match (result, cleanup) {
            (Ok(delivered), Ok(())) => {
                info!(
                    "Key '{}' delivered to {} module(s)",
                    delivered.handle,
                    delivered.modules.len()
                );
                Ok(delivered)
            }
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_error)) => {
                error!("Module cleanup failed: {cleanup_error}");
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        request: &mut KeyRequest,
        registry: &mut ModuleRegistry,
    ) -> Result<SecretDelivered, UnlockedError> {
        registry.init_all().await?;

        match self.lifecycle.run(request).await {
            Ok(secret) => {
                registry.dispatch_success(&secret).await?;
                let id = request.id.ok_or(UnlockedError::Terminal(request.state))?;
                Ok(SecretDelivered {
                    handle: request.handle.clone(),
                    id,
                    modules: registry.enabled_names().into_iter().map(String::from).collect(),
                })
            }
            Err(e) => {
                if let Err(dispatch_error) = registry.dispatch_failure(&e).await {
                    error!("Failed to report failure to modules: {dispatch_error}");
                }
                Err(e)
            }
        }
    }
}
