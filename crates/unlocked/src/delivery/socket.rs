//! Delivery through a socket passed by systemd socket activation.
//!
//! systemd starts the client with a listening socket at fd 3 and describes
//! it in `LISTEN_PID`, `LISTEN_FDS` and `LISTEN_FDNAMES`. On success the
//! module accepts a single connection on that socket and writes the secret
//! to it. Only `AF_UNIX` stream sockets are supported.

use std::os::fd::{FromRawFd, RawFd};
use std::os::unix::net::UnixListener as StdUnixListener;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;

use super::DeliveryModule;
use crate::error::DeliveryError;

/// First file descriptor passed by systemd.
pub const LISTEN_FDS_START: RawFd = 3;

/// The socket activation variables addressed to this process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationEnv {
    /// Number of descriptors passed, starting at [`LISTEN_FDS_START`].
    pub fds: usize,
    pub names: Vec<String>,
}

impl ActivationEnv {
    /// Reads the variables of the current process.
    ///
    /// # Errors
    ///
    /// See [`ActivationEnv::parse`].
    pub fn from_env() -> Result<Self, DeliveryError> {
        Self::parse(|key| std::env::var(key).ok(), std::process::id())
    }

    /// Interprets the variables as returned by `lookup` for process `pid`.
    ///
    /// Variables meant for another process (`LISTEN_PID` differs) count as
    /// no sockets at all. Missing names default to `unknown`.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_PID` or `LISTEN_FDS` is not a number.
    pub fn parse(lookup: impl Fn(&str) -> Option<String>, pid: u32) -> Result<Self, DeliveryError> {
        let Some(listen_pid) = lookup("LISTEN_PID") else {
            return Ok(Self::default());
        };
        let listen_pid: u32 = listen_pid.trim().parse().map_err(|_| {
            DeliveryError::SocketEnvironment(format!("LISTEN_PID is not a number: {listen_pid}"))
        })?;
        if listen_pid != pid {
            debug!("LISTEN_PID {listen_pid} is not this process ({pid})");
            return Ok(Self::default());
        }

        let fds = match lookup("LISTEN_FDS") {
            None => 0,
            Some(fds) => fds.trim().parse().map_err(|_| {
                DeliveryError::SocketEnvironment(format!("LISTEN_FDS is not a number: {fds}"))
            })?,
        };

        let mut names: Vec<String> = lookup("LISTEN_FDNAMES")
            .map(|names| names.split(':').map(ToString::to_string).collect())
            .unwrap_or_default();
        names.resize(fds, "unknown".to_string());

        Ok(Self { fds, names })
    }
}

/// Writes the secret to the first client of a socket-activated listener.
///
/// Disabled by default; enabled by `--sd-socket` or `use_socket = true` in
/// the `[sd_socket]` table. The command line wins over the file.
#[derive(Debug, Default)]
pub struct SdSocketModule {
    enabled: bool,
    cli_enabled: Option<bool>,
    environment: Option<Result<ActivationEnv, DeliveryError>>,
    preset: Option<StdUnixListener>,
    listener: Option<UnixListener>,
}

impl SdSocketModule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes the enabled flag, ignoring the configuration file.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self.cli_enabled = Some(enabled);
        self
    }

    /// Uses `environment` instead of the process environment.
    #[must_use]
    pub fn with_environment(mut self, environment: ActivationEnv) -> Self {
        self.environment = Some(Ok(environment));
        self
    }

    /// Reads the activation variables through `lookup` instead of the
    /// process environment, as seen by process `pid`.
    #[must_use]
    pub fn with_environment_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
        pid: u32,
    ) -> Self {
        self.environment = Some(ActivationEnv::parse(lookup, pid));
        self
    }

    /// Serves on `listener` instead of the descriptor passed by systemd.
    #[must_use]
    pub fn with_listener(mut self, listener: StdUnixListener) -> Self {
        self.preset = Some(listener);
        self
    }

    fn activated_listener(environment: &ActivationEnv) -> Result<StdUnixListener, DeliveryError> {
        match environment.fds {
            0 => return Err(DeliveryError::SocketMissing),
            1 => {}
            n => return Err(DeliveryError::TooManySockets(n)),
        }
        debug!(
            "Socket \"{}\" passed by systemd",
            environment.names.first().map_or("unknown", String::as_str)
        );

        // SAFETY: LISTEN_PID names this process and LISTEN_FDS is exactly 1,
        // so systemd handed us fd 3 and nothing else in the process owns it.
        #[allow(unsafe_code)]
        let listener = unsafe { StdUnixListener::from_raw_fd(LISTEN_FDS_START) };
        Ok(listener)
    }
}

#[async_trait]
impl DeliveryModule for SdSocketModule {
    fn name(&self) -> &str {
        "sd_socket"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn parse_config(&mut self, config: &toml::Table) -> Result<()> {
        if self.cli_enabled.is_some() {
            return Ok(());
        }
        match config.get("use_socket") {
            None => {}
            Some(toml::Value::Boolean(enabled)) => self.enabled = *enabled,
            Some(other) => anyhow::bail!("'use_socket' must be a boolean, got {other}"),
        }
        Ok(())
    }

    async fn init(&mut self) -> Result<()> {
        let environment = self
            .environment
            .take()
            .unwrap_or_else(ActivationEnv::from_env);

        if !self.enabled {
            match environment {
                Ok(environment) if environment.fds > 0 => {
                    return Err(DeliveryError::SocketDisabled.into());
                }
                Ok(_) => {}
                // unreadable variables count as no sockets while disabled
                Err(e) => debug!("Ignoring socket activation environment: {e}"),
            }
            return Ok(());
        }
        let environment = environment?;

        let listener = match self.preset.take() {
            Some(listener) => listener,
            None => Self::activated_listener(&environment)?,
        };
        listener
            .set_nonblocking(true)
            .context("Failed to make the activated socket non-blocking")?;
        self.listener = Some(UnixListener::from_std(listener).context("Failed to register socket")?);
        Ok(())
    }

    async fn on_success(&mut self, secret: &SecretString) -> Result<()> {
        let listener = self
            .listener
            .as_ref()
            .context("Socket module was not initialized")?;

        let (mut stream, _) = listener
            .accept()
            .await
            .context("Failed to accept a connection")?;
        debug!("Client connected to activated socket");

        stream
            .write_all(secret.expose_secret().as_bytes())
            .await
            .context("Failed to send the key")?;
        stream.shutdown().await.context("Failed to close connection")?;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        self.listener = None;
        self.preset = None;
        Ok(())
    }
}
