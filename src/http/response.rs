//! HTTP/1.1 response parsing using the [`httparse`] crate.
//!
//! Also provides a small builder so transports other than the built-in TCP
//! client (and tests) can construct responses directly.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::{Headers, StatusCode};

/// Errors that can occur while parsing an HTTP/1.1 response head.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header: {value:?}")]
    InvalidContentLength { value: String },
}

/// An HTTP/1.1 response received from a server.
///
/// Responses are immutable once built and are shared between callers as
/// `Arc<Response>` by the coordinator.
///
/// # Examples
///
/// ```
/// use rttp_coord::http::{Response, StatusCode};
///
/// let raw = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 11\r\n\r\n{\"ok\":true}";
/// let (head, offset) = Response::parse_head(raw).unwrap();
/// let response = head.with_body(raw[offset..].to_vec());
///
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.headers().get("content-type"), Some("application/json"));
/// assert_eq!(response.text().unwrap(), r#"{"ok":true}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Response {
    /// Maximum number of headers we accept per response.
    const MAX_HEADERS: usize = 64;

    /// Creates a new HTTP/1.1 response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            version: 1,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parses a status line and headers from the front of `buf`.
    ///
    /// Returns the response (with an empty body) and the byte offset at which
    /// the body begins in `buf`, i.e. immediately after the `\r\n\r\n`
    /// terminator. Reading the body is left to the caller, which knows
    /// whether more bytes are coming.
    ///
    /// # Errors
    ///
    /// - [`ResponseError::Incomplete`] — more data is needed to complete the head.
    /// - [`ResponseError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`ResponseError::MissingField`] — the status code or version is absent.
    pub fn parse_head(buf: &[u8]) -> Result<(Self, usize), ResponseError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_res = httparse::Response::new(&mut headers);

        let body_offset = match raw_res.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(ResponseError::Incomplete),
        };

        let status = raw_res
            .code
            .ok_or(ResponseError::MissingField { field: "status" })?;
        let version = raw_res
            .version
            .ok_or(ResponseError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_res.headers.len());
        for header in raw_res.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        Ok((
            Self {
                status: StatusCode::from_u16(status),
                version,
                headers: header_map,
                body: Bytes::new(),
            },
            body_offset,
        ))
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as UTF-8 text.
    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }

    /// Deserializes the body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body)
    }

    /// Returns the `Content-Length` header parsed as a `usize`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::InvalidContentLength`] if the header is
    /// present but not a decimal integer.
    pub fn content_length(&self) -> Result<Option<usize>, ResponseError> {
        match self.headers.get("content-length") {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ResponseError::InvalidContentLength {
                    value: value.to_owned(),
                }),
        }
    }

    /// Returns `true` if the body uses a transfer coding other than identity.
    pub fn has_transfer_coding(&self) -> bool {
        self.headers
            .get_all("transfer-encoding")
            .any(|v| !v.trim().eq_ignore_ascii_case("identity"))
    }

    /// Returns `true` if the status forbids a body (`1xx`, `204`, `304`).
    pub fn is_bodiless(&self) -> bool {
        let code = self.status.as_u16();
        (100..200).contains(&code) || code == 204 || code == 304
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_ok() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        let (res, offset) = Response::parse_head(raw).unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.version(), 1);
        assert_eq!(res.content_length().unwrap(), Some(5));
        assert_eq!(&raw[offset..], b"hello");
        assert!(res.body().is_empty());
    }

    #[test]
    fn parse_unnamed_status() {
        let raw = b"HTTP/1.0 418 I'm a teapot\r\n\r\n";
        let (res, offset) = Response::parse_head(raw).unwrap();
        assert_eq!(res.status().as_u16(), 418);
        assert_eq!(res.version(), 0);
        assert_eq!(offset, raw.len());
    }

    #[test]
    fn incomplete_head() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Len";
        assert!(matches!(
            Response::parse_head(raw),
            Err(ResponseError::Incomplete)
        ));
    }

    #[test]
    fn malformed_head() {
        let raw = b"NOT-HTTP garbage\r\n\r\n";
        assert!(matches!(
            Response::parse_head(raw),
            Err(ResponseError::Parse(_))
        ));
    }

    #[test]
    fn invalid_content_length() {
        let res = Response::new(StatusCode::OK).header("Content-Length", "lots");
        assert!(matches!(
            res.content_length(),
            Err(ResponseError::InvalidContentLength { .. })
        ));
    }

    #[test]
    fn transfer_coding_detection() {
        let chunked = Response::new(StatusCode::OK).header("Transfer-Encoding", "chunked");
        let identity = Response::new(StatusCode::OK).header("Transfer-Encoding", "identity");
        assert!(chunked.has_transfer_coding());
        assert!(!identity.has_transfer_coding());
        assert!(!Response::new(StatusCode::OK).has_transfer_coding());
    }

    #[test]
    fn bodiless_statuses() {
        assert!(Response::new(StatusCode::NO_CONTENT).is_bodiless());
        assert!(Response::new(StatusCode::NOT_MODIFIED).is_bodiless());
        assert!(!Response::new(StatusCode::OK).is_bodiless());
    }

    #[test]
    fn json_body() {
        #[derive(serde::Deserialize)]
        struct Payload {
            key: u32,
        }
        let res = Response::new(StatusCode::OK).with_body(&b"{\"key\":3}"[..]);
        let payload: Payload = res.json().unwrap();
        assert_eq!(payload.key, 3);
    }
}
