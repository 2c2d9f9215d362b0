use std::io::{self, Write};

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::DeliveryModule;

/// Writes the secret to standard output, without a trailing newline.
///
/// Enabled unless the `[stdout]` table sets `enabled = false`.
pub struct StdoutModule<W = io::Stdout> {
    writer: W,
    enabled: bool,
}

impl StdoutModule {
    #[must_use]
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for StdoutModule {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send + Sync> StdoutModule<W> {
    pub const fn with_writer(writer: W) -> Self {
        Self {
            writer,
            enabled: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send + Sync> DeliveryModule for StdoutModule<W> {
    fn name(&self) -> &str {
        "stdout"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn parse_config(&mut self, config: &toml::Table) -> Result<()> {
        match config.get("enabled") {
            None => {}
            Some(toml::Value::Boolean(enabled)) => self.enabled = *enabled,
            Some(other) => anyhow::bail!("'enabled' must be a boolean, got {other}"),
        }
        Ok(())
    }

    async fn on_success(&mut self, secret: &SecretString) -> Result<()> {
        self.writer
            .write_all(secret.expose_secret().as_bytes())
            .and_then(|()| self.writer.flush())
            .context("Failed to write the key to standard output")
    }
}
