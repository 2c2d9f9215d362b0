//! Configuration file loading and merging with the command line.
//!
//! The file lives at `<config_dir>/unlocked/config.toml` unless `--config`
//! points elsewhere.
//!
//! ```toml
//! [client]
//! host = "unlocked.example.org"
//! port = 443
//! user = "backup-host"
//! secret = "..."
//! skip_validation = false
//! timeout = 30
//!
//! [polling]
//! interval_secs = 1
//! max_attempts = 600
//!
//! [stdout]
//! enabled = true
//!
//! [sd_socket]
//! use_socket = false
//! ```
//!
//! Precedence is defaults < file < command line. A value that is not set
//! never overrides one that is.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use secrecy::SecretString;
use serde::Deserialize;

use unlocked::credentials::DEFAULT_PORT;
use unlocked::{Credentials, Endpoint, PollPolicy};

use crate::Args;

/// The `[client]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub secret: Option<String>,
    pub skip_validation: Option<bool>,
    /// Request timeout in seconds
    pub timeout: Option<u64>,
}

/// The `[polling]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingSection {
    pub interval_secs: Option<u64>,
    pub max_attempts: Option<u32>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    pub client: ClientSection,
    pub polling: PollingSection,
    /// The whole document, for the delivery modules' tables
    pub raw: toml::Table,
}

impl FileConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or a known table
    /// has unexpected contents.
    pub fn parse(contents: &str) -> Result<Self> {
        let raw: toml::Table = toml::from_str(contents)?;

        let client = match raw.get("client") {
            Some(value) => value
                .clone()
                .try_into::<ClientSection>()
                .context("Invalid [client] table")?,
            None => ClientSection::default(),
        };
        let polling = match raw.get("polling") {
            Some(value) => value
                .clone()
                .try_into::<PollingSection>()
                .context("Invalid [polling] table")?,
            None => PollingSection::default(),
        };

        Ok(Self {
            client,
            polling,
            raw,
        })
    }

    /// Reads the file at `path`.
    ///
    /// With `required` unset, a missing file yields an empty configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !required && !path.exists() {
            log::debug!("No configuration file at {}", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Returns the default configuration file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("unlocked").join("config.toml"))
    }
}

/// Effective settings of a run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: Endpoint,
    pub credentials: Credentials,
    pub poll: PollPolicy,
    pub timeout: Option<Duration>,
}

impl Settings {
    /// Combines the command line with the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if host, user or secret are missing everywhere, or
    /// the port is 0.
    pub fn merge(args: &Args, file: &FileConfig) -> Result<Self> {
        let client = &file.client;

        let Some(host) = args.host.clone().or_else(|| client.host.clone()) else {
            bail!("No hostname given");
        };
        let port = args.port.or(client.port).unwrap_or(DEFAULT_PORT);
        if port == 0 {
            bail!("Invalid port given");
        }
        let Some(secret) = args.secret.clone().or_else(|| client.secret.clone()) else {
            bail!("No secret given");
        };
        let Some(user) = args.user.clone().or_else(|| client.user.clone()) else {
            bail!("No username given");
        };

        let skip_validation = args.skip_validation || client.skip_validation.unwrap_or(false);

        let mut poll = PollPolicy::default();
        if let Some(interval) = args.poll_interval.or(file.polling.interval_secs) {
            poll = poll.with_interval(Duration::from_secs(interval));
        }
        if let Some(max_attempts) = args.max_polls.or(file.polling.max_attempts) {
            poll = poll.with_max_attempts(max_attempts);
        }

        Ok(Self {
            endpoint: Endpoint::builder()
                .host(host)
                .port(port)
                .verify_tls(!skip_validation)
                .build(),
            credentials: Credentials::from_secret(user, SecretString::from(secret)),
            poll,
            timeout: args.timeout.or(client.timeout).map(Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;

    use clap::Parser;

    use super::*;

    const SAMPLE: &str = r#"
[client]
host = "file.example.org"
port = 8443
user = "file-user"
secret = "file-secret"
timeout = 30

[polling]
interval_secs = 5
max_attempts = 10

[sd_socket]
use_socket = true
"#;

    fn args(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("unlocked-client").chain(argv.iter().copied()))
    }

    #[test]
    fn test_parse_sample() {
        let config = FileConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.client.host.as_deref(), Some("file.example.org"));
        assert_eq!(config.client.port, Some(8443));
        assert_eq!(config.polling.max_attempts, Some(10));
        assert!(config.raw.contains_key("sd_socket"));
    }

    #[test]
    fn test_unknown_client_key_is_rejected() {
        assert!(FileConfig::parse("[client]\nhots = \"typo\"").is_err());
        assert!(FileConfig::parse("[client]\nport = \"https\"").is_err());
    }

    #[test]
    fn test_command_line_only() {
        let args = args(&[
            "-H", "localhost", "-p", "8080", "-s", "1234", "-u", "myuser", "disk",
        ]);
        let settings = Settings::merge(&args, &FileConfig::default()).unwrap();

        assert_eq!(settings.endpoint.host, "localhost");
        assert_eq!(settings.endpoint.port, 8080);
        assert!(settings.endpoint.verify_tls);
        assert_eq!(settings.credentials.username, "myuser");
        assert_eq!(settings.credentials.secret_bytes(), b"1234");
        assert_eq!(settings.poll, PollPolicy::default());
        assert_eq!(settings.timeout, None);
        assert_eq!(args.key_handle, "disk");
    }

    #[test]
    fn test_file_fills_unset_values() {
        let file = FileConfig::parse(SAMPLE).unwrap();
        let settings = Settings::merge(&args(&["disk"]), &file).unwrap();

        assert_eq!(settings.endpoint.host, "file.example.org");
        assert_eq!(settings.endpoint.port, 8443);
        assert_eq!(settings.credentials.username, "file-user");
        assert_eq!(settings.poll.interval, Duration::from_secs(5));
        assert_eq!(settings.poll.max_attempts, Some(10));
        assert_eq!(settings.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_command_line_overrides_file() {
        let file = FileConfig::parse(SAMPLE).unwrap();
        let args = args(&[
            "--host",
            "cli.example.org",
            "--user",
            "cli-user",
            "--poll-interval",
            "2",
            "--skip-validation",
            "disk",
        ]);
        let settings = Settings::merge(&args, &file).unwrap();

        assert_eq!(settings.endpoint.host, "cli.example.org");
        assert_eq!(settings.endpoint.port, 8443);
        assert!(!settings.endpoint.verify_tls);
        assert_eq!(settings.credentials.username, "cli-user");
        assert_eq!(settings.credentials.secret_bytes(), b"file-secret");
        assert_eq!(settings.poll.interval, Duration::from_secs(2));
        assert_eq!(settings.poll.max_attempts, Some(10));
    }

    #[test]
    fn test_missing_values() {
        let file = FileConfig::default();

        let err = Settings::merge(&args(&["-s", "x", "-u", "y", "disk"]), &file).unwrap_err();
        assert_eq!(err.to_string(), "No hostname given");

        let err = Settings::merge(&args(&["-H", "h", "-u", "y", "disk"]), &file).unwrap_err();
        assert_eq!(err.to_string(), "No secret given");

        let err = Settings::merge(&args(&["-H", "h", "-s", "x", "disk"]), &file).unwrap_err();
        assert_eq!(err.to_string(), "No username given");

        let err = Settings::merge(
            &args(&["-H", "h", "-p", "0", "-s", "x", "-u", "y", "disk"]),
            &file,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid port given");
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = FileConfig::load(file.path(), true).unwrap();
        assert_eq!(config.client.user.as_deref(), Some("file-user"));

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.toml");
        assert!(FileConfig::load(&missing, false).unwrap().raw.is_empty());
        assert!(FileConfig::load(&missing, true).is_err());
    }
}
