//! HTTP transport seam.
//!
//! The protocol code only needs one capability from the network layer:
//! send a fully assembled request and hand back the status, the headers as
//! received and the complete body. [`Transport`] captures that contract so
//! the lifecycle can run against a scripted transport in tests and against
//! [`ReqwestTransport`] in production.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderName, HeaderValue};

use unlocked_common::{HeaderList, IncomingResponse, Method, OutgoingRequest};

use crate::error::ClientError;

/// Performs a single HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and buffers the whole response.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails at the connection, TLS or HTTP
    /// level. Non-success status codes are not errors at this layer.
    async fn perform(&self, request: &OutgoingRequest) -> Result<IncomingResponse, ClientError>;
}

/// Transport backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    verify_tls: bool,
}

impl ReqwestTransport {
    /// Builds the underlying HTTP client.
    ///
    /// With `verify_tls` set to `false` neither the certificate chain nor the
    /// hostname is checked (skip-validation mode). A `timeout` of `None` means no timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(verify_tls: bool, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("unlocked/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!verify_tls)
            .danger_accept_invalid_hostnames(!verify_tls);

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            verify_tls,
        })
    }

    /// Whether certificates and hostnames are validated.
    #[must_use]
    pub const fn verifies_tls(&self) -> bool {
        self.verify_tls
    }

    const fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform(&self, request: &OutgoingRequest) -> Result<IncomingResponse, ClientError> {
        let mut builder = self
            .client
            .request(Self::method(request.method), request.url.clone());

        for header in &request.headers {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| ClientError::InvalidRequest(format!("{}: {e}", header.name)))?;
            let value = HeaderValue::from_str(&header.value)
                .map_err(|e| ClientError::InvalidRequest(format!("{}: {e}", header.name)))?;
            builder = builder.header(name, value);
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        debug!("{} {}", request.method, request.url);
        let response = builder.send().await?;
        let status = response.status().as_u16();

        let mut headers = HeaderList::new();
        for (name, value) in response.headers() {
            headers.push(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )?;
        }

        let body = response.bytes().await?.to_vec();
        debug!("{} {} -> {status} ({} bytes)", request.method, request.url, body.len());

        Ok(IncomingResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use url::Url;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(method: Method, url: &str, body: Option<&str>) -> OutgoingRequest {
        let mut headers = HeaderList::new();
        headers.push("Accept", "application/json").unwrap();
        headers.push("X-Trace", "abc").unwrap();
        OutgoingRequest {
            method,
            url: Url::parse(url).unwrap(),
            headers,
            body: body.map(ToString::to_string),
        }
    }

    #[tokio::test]
    async fn test_perform_sends_headers_and_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/api/requests/7"))
            .and(header("accept", "application/json"))
            .and(header("x-trace", "abc"))
            .and(body_string(r#"{"state": "FULFILLED"}"#))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain")
                    .set_body_string("secret\n"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new(true, Some(Duration::from_secs(5))).unwrap();
        let url = format!("{}/api/requests/7", mock_server.uri());
        let response = transport
            .perform(&request(Method::Patch, &url, Some(r#"{"state": "FULFILLED"}"#)))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.content_type().as_deref(), Some("text/plain"));
        assert_eq!(response.body, b"secret\n");
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new(true, None).unwrap();
        let response = transport
            .perform(&request(Method::Get, &mock_server.uri(), None))
            .await
            .unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(response.text().unwrap(), "down");
    }

    #[tokio::test]
    async fn test_skip_validation_transport() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new(false, None).unwrap();
        assert!(!transport.verifies_tls());
        assert!(ReqwestTransport::new(true, None).unwrap().verifies_tls());

        let response = transport
            .perform(&request(Method::Get, &mock_server.uri(), None))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_connection_failure_is_network_error() {
        // Port 9 (discard) on localhost is not expected to accept connections
        let transport = ReqwestTransport::new(true, Some(Duration::from_secs(2))).unwrap();
        let result = transport
            .perform(&request(Method::Get, "http://127.0.0.1:9/", None))
            .await;

        let err = result.unwrap_err();
        assert!(err.is_transport_error());
    }

    #[tokio::test]
    async fn test_invalid_header_value_is_rejected() {
        let transport = ReqwestTransport::new(true, None).unwrap();
        let mut outgoing = request(Method::Get, "http://127.0.0.1:9/", None);
        outgoing.headers.push("X-Broken", "line\nbreak").unwrap();

        let result = transport.perform(&outgoing).await;
        assert!(matches!(result, Err(ClientError::InvalidRequest(_))));
    }
}
