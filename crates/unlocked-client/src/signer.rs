//! HMAC request signing.
//!
//! Every call to the approval server carries an `Authorization` header of
//! the form
//!
//! ```text
//! hmac username="<user>", algorithm="sha512", headers="<names>", signature="<HEX>"
//! ```
//!
//! The signature is an upper-case hex HMAC-SHA512 over the signing string:
//! each header line (`Name: value`) that precedes the `Authorization`
//! header followed by `\n`, in insertion order, and then the request body.
//! `headers` lists the lower-cased names of those header lines, separated by
//! single spaces, in the same order.
//!
//! # Example
//!
//! ```
//! use chrono::DateTime;
//! use unlocked_client::signer::{date_header, sign};
//! use unlocked_common::{Credentials, HeaderList};
//!
//! let mut headers = HeaderList::new();
//! headers.push_header(date_header(DateTime::from_timestamp(1_657_446_089, 0)))?;
//!
//! let credentials = Credentials::new("myuser", "1234");
//! let authorization = sign(&headers, &credentials, Some("test"))?;
//!
//! assert!(authorization.starts_with(r#"hmac username="myuser", algorithm="sha512", headers="date""#));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha512;

use unlocked_common::{Credentials, Header, HeaderList};

use crate::error::ClientError;

type HmacSha512 = Hmac<Sha512>;

/// Name of the digest algorithm announced in the header.
pub const ALGORITHM: &str = "sha512";

/// Name of the signature header.
pub const AUTHORIZATION: &str = "Authorization";

/// Name of the date header.
pub const DATE: &str = "Date";

/// Lower-cased header names joined by single spaces, in insertion order.
#[must_use]
pub fn canonical_header_names(headers: &HeaderList) -> String {
    headers
        .iter()
        .map(|h| {
            let line = h.line();
            line.split(':').next().unwrap_or_default().to_ascii_lowercase()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Header lines, each terminated by `\n`, followed by the body.
#[must_use]
pub fn signing_string(headers: &HeaderList, body: Option<&str>) -> String {
    let body = body.unwrap_or_default();
    let capacity = headers
        .iter()
        .map(|h| h.name.len() + h.value.len() + 3)
        .sum::<usize>()
        + body.len();

    let mut data = String::with_capacity(capacity);
    for header in headers {
        data.push_str(&header.line());
        data.push('\n');
    }
    data.push_str(body);
    data
}

/// Upper-case hex HMAC-SHA512 of `message` keyed with `key`.
///
/// # Errors
///
/// Returns an error if the MAC cannot be keyed.
pub fn hmac_sha512_hex(key: &[u8], message: &[u8]) -> Result<String, ClientError> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| ClientError::SigningError(format!("Invalid HMAC key: {e}")))?;
    mac.update(message);
    Ok(hex::encode_upper(mac.finalize().into_bytes()))
}

/// Computes the `Authorization` header value for a request.
///
/// `headers` are the headers to sign, normally just the `Date` header. An
/// absent body is signed as the empty string.
///
/// # Errors
///
/// Returns an error if `headers` is empty or the MAC cannot be computed.
pub fn sign(
    headers: &HeaderList,
    credentials: &Credentials,
    body: Option<&str>,
) -> Result<String, ClientError> {
    if headers.is_empty() {
        return Err(ClientError::SigningError(
            "Refusing to sign a request without headers".to_string(),
        ));
    }

    let names = canonical_header_names(headers);
    let data = signing_string(headers, body);
    let signature = hmac_sha512_hex(credentials.secret_bytes(), data.as_bytes())?;

    Ok(format!(
        r#"hmac username="{}", algorithm="{ALGORITHM}", headers="{names}", signature="{signature}""#,
        credentials.username
    ))
}

/// Formats a timestamp as an RFC 7231 HTTP date.
#[must_use]
pub fn http_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// The `Date` header for `timestamp`, or for the current time if `None`.
#[must_use]
pub fn date_header(timestamp: Option<DateTime<Utc>>) -> Header {
    Header {
        name: DATE.to_string(),
        value: http_date(timestamp.unwrap_or_else(Utc::now)),
    }
}

/// Signs requests on behalf of one client identity.
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
}

impl Signer {
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Appends the `Authorization` header, signed over all headers already
    /// present in `headers` and `body`.
    ///
    /// # Errors
    ///
    /// See [`sign`].
    pub fn authorize(
        &self,
        headers: &mut HeaderList,
        body: Option<&str>,
    ) -> Result<(), ClientError> {
        let value = sign(headers, &self.credentials, body)?;
        headers.push(AUTHORIZATION, value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const EXPECTED_SIGNATURE: &str = "0D137829150CFBE26CBCC48E4AE2EFA1C01CA11836DF65B5C3D6C2A7CF4C67203FD457A144D4E36B96CDE87A765DD6D4C69E2213DB13D93FADF70DE560B6676B";

    fn date_only() -> HeaderList {
        let mut headers = HeaderList::new();
        headers.push("Date", "Sun, 10 Jul 2022 09:41:29 GMT").unwrap();
        headers
    }

    #[test]
    fn test_sign_known_digest() {
        // hmac.new(b"1234", b"Date: Sun, 10 Jul 2022 09:41:29 GMT\ntest", "SHA512").hexdigest().upper()
        let credentials = Credentials::new("myuser", "1234");
        let authorization = sign(&date_only(), &credentials, Some("test")).unwrap();

        assert_eq!(
            authorization,
            format!(
                r#"hmac username="myuser", algorithm="sha512", headers="date", signature="{EXPECTED_SIGNATURE}""#
            )
        );
    }

    #[test]
    fn test_sign_is_deterministic() {
        let credentials = Credentials::new("myuser", "1234");
        let first = sign(&date_only(), &credentials, Some("test")).unwrap();
        let second = sign(&date_only(), &credentials, Some("test")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_absent_body_signs_as_empty() {
        let credentials = Credentials::new("myuser", "1234");
        let absent = sign(&date_only(), &credentials, None).unwrap();
        let empty = sign(&date_only(), &credentials, Some("")).unwrap();
        assert_eq!(absent, empty);
    }

    #[test]
    fn test_header_order_changes_signature() {
        let credentials = Credentials::new("myuser", "1234");

        let mut forward = HeaderList::new();
        forward.push("Date", "Sun, 10 Jul 2022 09:41:29 GMT").unwrap();
        forward.push("X-Nonce", "1").unwrap();

        let mut reverse = HeaderList::new();
        reverse.push("X-Nonce", "1").unwrap();
        reverse.push("Date", "Sun, 10 Jul 2022 09:41:29 GMT").unwrap();

        let a = sign(&forward, &credentials, Some("test")).unwrap();
        let b = sign(&reverse, &credentials, Some("test")).unwrap();
        assert!(a.contains(r#"headers="date x-nonce""#));
        assert!(b.contains(r#"headers="x-nonce date""#));
        assert_ne!(a, b);
    }

    #[test]
    fn test_sign_rejects_empty_headers() {
        let credentials = Credentials::new("myuser", "1234");
        let result = sign(&HeaderList::new(), &credentials, Some("test"));
        assert!(matches!(result, Err(ClientError::SigningError(_))));
    }

    #[test]
    fn test_signing_string() {
        let mut headers = date_only();
        headers.push("Accept", "application/json").unwrap();
        assert_eq!(
            signing_string(&headers, Some("{}")),
            "Date: Sun, 10 Jul 2022 09:41:29 GMT\nAccept: application/json\n{}"
        );
        assert_eq!(canonical_header_names(&headers), "date accept");
    }

    #[test]
    fn test_http_date() {
        let timestamp = DateTime::from_timestamp(1_657_446_089, 0).unwrap();
        assert_eq!(http_date(timestamp), "Sun, 10 Jul 2022 09:41:29 GMT");
        assert_eq!(
            date_header(Some(timestamp)).line(),
            "Date: Sun, 10 Jul 2022 09:41:29 GMT"
        );
    }

    #[test]
    fn test_http_date_pads_single_digits() {
        let timestamp = DateTime::from_timestamp(1_641_013_509, 0).unwrap();
        assert_eq!(http_date(timestamp), "Sat, 01 Jan 2022 05:05:09 GMT");
    }

    #[test]
    fn test_date_header_defaults_to_now() {
        let header = date_header(None);
        assert_eq!(header.name, "Date");
        assert!(header.value.ends_with(" GMT"));
        assert!(DateTime::parse_from_rfc2822(&header.value.replace("GMT", "+0000")).is_ok());
    }

    #[test]
    fn test_signer_authorize_appends_header() {
        let signer = Signer::new(Credentials::new("myuser", "1234"));
        let mut headers = date_only();
        signer.authorize(&mut headers, Some("test")).unwrap();

        assert_eq!(headers.len(), 2);
        let authorization = headers.get("authorization").unwrap();
        assert!(authorization.ends_with(&format!(r#"signature="{EXPECTED_SIGNATURE}""#)));
    }
}
