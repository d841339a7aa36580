//! Outbound request configuration and HTTP/1.1 request encoding.

use std::borrow::Cow;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use super::Headers;

/// Errors that can occur while encoding an outbound request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request target must be an origin-form path starting with '/': {target:?}")]
    InvalidTarget { target: String },

    #[error("header {name:?} contains a forbidden character")]
    InvalidHeader { name: String },
}

/// Per-request configuration: query parameters, extra headers, and an
/// optional timeout override.
///
/// `RequestOptions` is serialized verbatim (field order, then parameter and
/// header insertion order) to derive cache keys, so two options values that
/// hold the same parameters in a different order are different requests.
/// Parameter values keep their JSON type: `1` and `"1"` are different keys
/// even though both are sent as `key=1`.
/// Empty fields are skipped, so the default options serialize as `{}`.
///
/// # Examples
///
/// ```
/// use rttp_coord::http::RequestOptions;
///
/// let options = RequestOptions::new()
///     .param("key", "1")
///     .header("Accept", "application/json");
///
/// assert_eq!(options.params(), &[("key".to_owned(), serde_json::json!("1"))]);
/// assert_eq!(options.headers().get("accept"), Some("application/json"));
/// assert_eq!(serde_json::to_string(&RequestOptions::new()).unwrap(), "{}");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestOptions {
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_pairs_as_map"
    )]
    params: Vec<(String, Value)>,

    #[serde(skip_serializing_if = "Headers::is_empty")]
    headers: Headers,

    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

impl RequestOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a query parameter. Parameters are sent in insertion order.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Overrides the client's response timeout for this request.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Returns the query parameters in insertion order.
    pub fn params(&self) -> &[(String, Value)] {
        &self.params
    }

    /// Returns the extra request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the per-request timeout override, if any.
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Returns `target` with the encoded query parameters appended.
    ///
    /// Parameters are percent-encoded as `application/x-www-form-urlencoded`
    /// and joined onto any query string already present in `target`.
    pub fn request_target(&self, target: &str) -> String {
        if self.params.is_empty() {
            return target.to_owned();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(
                self.params
                    .iter()
                    .map(|(name, value)| (name.as_str(), query_value(value))),
            )
            .finish();
        let separator = if target.contains('?') { '&' } else { '?' };
        format!("{target}{separator}{query}")
    }

    /// Encodes a `GET` request for `target` against the server at `authority`
    /// (`host[:port]`) using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Host: <authority>` (always written first).
    /// - `Accept: */*` unless the options carry an `Accept` header.
    /// - `Connection: close`, since every request uses a fresh connection.
    ///
    /// # Errors
    ///
    /// - [`RequestError::InvalidTarget`] — `target` is not an origin-form path.
    /// - [`RequestError::InvalidHeader`] — a header name or value contains CR/LF.
    pub fn encode(&self, authority: &str, target: &str) -> Result<BytesMut, RequestError> {
        if !target.starts_with('/') || target.bytes().any(|b| b.is_ascii_whitespace()) {
            return Err(RequestError::InvalidTarget {
                target: target.to_owned(),
            });
        }
        if let Some((name, _)) = self
            .headers
            .iter()
            .find(|(n, v)| has_line_break(n) || has_line_break(v))
        {
            return Err(RequestError::InvalidHeader {
                name: name.to_owned(),
            });
        }

        let request_target = self.request_target(target);
        let estimated_size = 64 + request_target.len() + self.headers.len() * 64;
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Request line
        buf.put(format!("GET {request_target} HTTP/1.1\r\n").as_bytes());
        buf.put(format!("Host: {authority}\r\n").as_bytes());

        self.headers.write_to(&mut buf);
        if !self.headers.contains("accept") {
            buf.put(&b"Accept: */*\r\n"[..]);
        }
        buf.put(&b"Connection: close\r\n"[..]);

        // Header terminator; GET carries no body.
        buf.put(&b"\r\n"[..]);

        Ok(buf)
    }
}

fn has_line_break(s: &str) -> bool {
    s.bytes().any(|b| b == b'\r' || b == b'\n')
}

/// Query-string form of a parameter value: strings verbatim, `null` empty,
/// everything else as its JSON text.
fn query_value(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Null => Cow::Borrowed(""),
        other => Cow::Owned(other.to_string()),
    }
}

fn serialize_pairs_as_map<S>(pairs: &[(String, Value)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(pairs.iter().map(|(k, v)| (k, v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_str(options: &RequestOptions, target: &str) -> String {
        let buf = options.encode("example.com:8080", target).unwrap();
        String::from_utf8(buf.to_vec()).unwrap()
    }

    #[test]
    fn encode_simple_get() {
        let s = encode_str(&RequestOptions::new(), "/sample.json");
        assert_eq!(
            s,
            "GET /sample.json HTTP/1.1\r\nHost: example.com:8080\r\nAccept: */*\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn encode_query_params_percent_encoded() {
        let options = RequestOptions::new().param("q", "rust lang").param("page", 2);
        let s = encode_str(&options, "/search");
        assert!(s.starts_with("GET /search?q=rust+lang&page=2 HTTP/1.1\r\n"));
    }

    #[test]
    fn params_join_existing_query() {
        let options = RequestOptions::new().param("b", "2");
        assert_eq!(options.request_target("/x?a=1"), "/x?a=1&b=2");
    }

    #[test]
    fn custom_accept_replaces_default() {
        let options = RequestOptions::new().header("Accept", "application/json");
        let s = encode_str(&options, "/");
        assert!(s.contains("Accept: application/json\r\n"));
        assert!(!s.contains("Accept: */*"));
    }

    #[test]
    fn rejects_absolute_and_whitespace_targets() {
        let options = RequestOptions::new();
        assert!(matches!(
            options.encode("h", "http://h/x"),
            Err(RequestError::InvalidTarget { .. })
        ));
        assert!(matches!(
            options.encode("h", "/a b"),
            Err(RequestError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn rejects_header_injection() {
        let options = RequestOptions::new().header("X-Evil", "a\r\nHost: other");
        assert!(matches!(
            options.encode("h", "/"),
            Err(RequestError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn serialization_is_literal_and_order_sensitive() {
        let ab = RequestOptions::new().param("a", "1").param("b", "2");
        let ba = RequestOptions::new().param("b", "2").param("a", "1");
        assert_eq!(
            serde_json::to_string(&ab).unwrap(),
            r#"{"params":{"a":"1","b":"2"}}"#
        );
        assert_ne!(
            serde_json::to_string(&ab).unwrap(),
            serde_json::to_string(&ba).unwrap()
        );
    }

    #[test]
    fn timeout_roundtrips_through_millis() {
        let options = RequestOptions::new().timeout(Duration::from_millis(1500));
        assert_eq!(options.timeout_override(), Some(Duration::from_millis(1500)));
        assert_eq!(
            serde_json::to_string(&options).unwrap(),
            r#"{"timeout_ms":1500}"#
        );
    }

    #[test]
    fn param_values_keep_their_json_type() {
        let number = RequestOptions::new().param("key", 1);
        let text = RequestOptions::new().param("key", "1");
        assert_eq!(
            serde_json::to_string(&number).unwrap(),
            r#"{"params":{"key":1}}"#
        );
        assert_ne!(
            serde_json::to_string(&number).unwrap(),
            serde_json::to_string(&text).unwrap()
        );
        assert_eq!(number.request_target("/x"), text.request_target("/x"));
    }

    #[test]
    fn non_string_params_encode_as_json_text() {
        let options = RequestOptions::new()
            .param("flag", true)
            .param("empty", Value::Null)
            .param("n", 2.5);
        assert_eq!(options.request_target("/x"), "/x?flag=true&empty=&n=2.5");
    }
}
