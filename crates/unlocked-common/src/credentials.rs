use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use url::Url;

/// Default HTTPS port of the approval server.
pub const DEFAULT_PORT: u16 = 443;

/// Client identity used to key the request signature.
///
/// The shared secret never leaves the process in cleartext; it is only
/// used as the HMAC key. `Debug` output redacts it.
#[derive(Clone)]
pub struct Credentials {
    /// Handle the server uses to look up the shared secret.
    pub username: String,
    secret: SecretString,
}

impl Credentials {
    /// Creates credentials from a username and a shared secret.
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// Creates credentials from an already wrapped secret.
    pub fn from_secret(username: impl Into<String>, secret: SecretString) -> Self {
        Self {
            username: username.into(),
            secret,
        }
    }

    /// Raw key material for the HMAC.
    #[must_use]
    pub fn secret_bytes(&self) -> &[u8] {
        self.secret.expose_secret().as_bytes()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Location of the approval server. Immutable for the duration of a run.
///
/// # Examples
///
/// ```
/// use unlocked_common::Endpoint;
///
/// let endpoint = Endpoint::builder()
///     .host("unlocked.example.org")
///     .port(8443)
///     .verify_tls(false)
///     .build();
///
/// assert_eq!(
///     endpoint.base_url().unwrap().as_str(),
///     "https://unlocked.example.org:8443/"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct Endpoint {
    /// Hostname of the server.
    #[builder(setter(into))]
    pub host: String,
    /// TCP port, 443 unless configured otherwise.
    #[builder(default = DEFAULT_PORT)]
    pub port: u16,
    /// Whether TLS certificates are validated. `false` is skip-validation mode.
    #[builder(default = true)]
    pub verify_tls: bool,
}

impl Endpoint {
    /// Base URL all API paths are resolved against.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not form a valid URL.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("https://{}/", self.host))?;
        // set_port only fails for cannot-be-a-base URLs, which https never is
        let _ = url.set_port(Some(self.port));
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let credentials = Credentials::new("myuser", "hunter2");
        let debug = format!("{credentials:?}");

        assert!(debug.contains("myuser"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(credentials.secret_bytes(), b"hunter2");
    }

    #[test]
    fn test_endpoint_defaults() {
        let endpoint = Endpoint::builder().host("localhost").build();
        assert_eq!(endpoint.port, 443);
        assert!(endpoint.verify_tls);
        // the default https port is elided by the url crate
        assert_eq!(endpoint.base_url().unwrap().as_str(), "https://localhost/");
    }

    #[test]
    fn test_endpoint_custom_port() {
        let endpoint = Endpoint::builder().host("localhost").port(8443).build();
        let url = endpoint.base_url().unwrap().join("api/requests").unwrap();
        assert_eq!(url.as_str(), "https://localhost:8443/api/requests");
    }

    #[test]
    fn test_endpoint_invalid_host() {
        let endpoint = Endpoint::builder().host("bad host name").build();
        assert!(endpoint.base_url().is_err());
    }
}
