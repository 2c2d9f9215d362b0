use std::fmt;
use std::str::Utf8Error;

use thiserror::Error;
use url::Url;

/// Errors raised while building header lists.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum HeaderError {
    /// Header names must not be empty.
    #[error("Header name is empty")]
    EmptyName,

    /// Header names must not contain a colon, whitespace or line breaks.
    #[error("Invalid header name: {0:?}")]
    InvalidName(String),
}

/// HTTP verbs used by the approval protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single header as a name/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    /// The literal header line, `Name: value`.
    #[must_use]
    pub fn line(&self) -> String {
        format!("{}: {}", self.name, self.value)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Headers in insertion order.
///
/// The request signature lists the signed header names in the order they
/// were added, so this is a plain sequence rather than a map. Re-ordering
/// two headers changes the signature even though it would not change the
/// meaning of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    headers: Vec<Header>,
}

impl HeaderList {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Appends a header after all existing ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or contains a colon, whitespace
    /// or a line break.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), HeaderError> {
        let name = name.into();
        if name.is_empty() {
            return Err(HeaderError::EmptyName);
        }
        if name
            .chars()
            .any(|c| c == ':' || c.is_whitespace() || c.is_control())
        {
            return Err(HeaderError::InvalidName(name));
        }

        self.headers.push(Header {
            name,
            value: value.into(),
        });
        Ok(())
    }

    /// Appends a pre-built header.
    ///
    /// # Errors
    ///
    /// See [`HeaderList::push`].
    pub fn push_header(&mut self, header: Header) -> Result<(), HeaderError> {
        self.push(header.name, header.value)
    }

    /// First value whose name matches case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.headers.iter()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.headers.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.iter()
    }
}

/// A request ready to be handed to a transport.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderList,
    pub body: Option<String>,
}

/// A response as captured by a transport.
///
/// Headers are kept in the order and form they were received in, trailing
/// line terminators included when the transport delivers them.
#[derive(Debug, Clone, Default)]
pub struct IncomingResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

impl IncomingResponse {
    /// Lower-cased media type from the `content-type` header, if present.
    ///
    /// The header name is matched case-insensitively. Separator characters
    /// before the value and line terminators after it are stripped.
    ///
    /// ```
    /// use unlocked_common::{HeaderList, IncomingResponse};
    ///
    /// let mut headers = HeaderList::new();
    /// headers.push("CONTENT-TYPE", "Application/JSON\r\n")?;
    /// let response = IncomingResponse { status: 200, headers, body: Vec::new() };
    ///
    /// assert_eq!(response.content_type().as_deref(), Some("application/json"));
    /// # Ok::<(), unlocked_common::HeaderError>(())
    /// ```
    #[must_use]
    pub fn content_type(&self) -> Option<String> {
        self.headers.get("content-type").map(|value| {
            value
                .trim_start_matches([':', ' '])
                .trim_end_matches(['\r', '\n'])
                .to_ascii_lowercase()
        })
    }

    /// Body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid UTF-8.
    pub fn text(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(&self.body)
    }
}


#[cfg(test)]
mod proptests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn fuzz_content_type_never_panics(name in ".*", value in ".*") {
            let mut headers = HeaderList::new();
            let _ = headers.push(name, value);
            let response = IncomingResponse { status: 200, headers, body: Vec::new() };
            let _ = response.content_type();
        }

        #[test]
        fn fuzz_valid_names_are_accepted(name in "[A-Za-z0-9-]{1,40}", value in "[ -~]*") {
            let mut headers = HeaderList::new();
            headers.push(name.clone(), value.clone()).unwrap();
            prop_assert_eq!(headers.get(&name.to_ascii_uppercase()), Some(value.as_str()));
        }
    }
}
