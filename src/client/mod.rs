//! Async HTTP/1.1 client using Tokio.
//!
//! Opens one TCP connection per request, writes a `GET`, and reads a single
//! response delimited by `Content-Length` or by the server closing the
//! connection. This is the default [`Transport`] behind the coordinator.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::http::{
    RequestOptions, Response, ResponseError, StatusCode, request::RequestError,
};

mod transport;

pub use transport::{Transport, TransportFuture};

/// Errors produced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to connect to {authority}: {source}")]
    Connect {
        authority: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid request: {0}")]
    Request(#[from] RequestError),

    #[error("invalid response: {0}")]
    Response(#[from] ResponseError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed before the response was complete")]
    ConnectionClosed,

    #[error("response exceeds maximum allowed size of {max_bytes} bytes")]
    ResponseTooLarge { max_bytes: usize },

    #[error("unsupported transfer coding: {0}")]
    UnsupportedTransferCoding(String),

    #[error("server responded with {0}")]
    Status(StatusCode),
}

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Client tuning knobs.
///
/// Deserializable so it can be embedded in an application config file; every
/// field is optional there and falls back to [`ClientConfig::default`].
///
/// ```
/// use std::time::Duration;
/// use rttp_coord::client::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(r#"{"response_timeout_ms": 500}"#).unwrap();
/// assert_eq!(config.response_timeout(), Duration::from_millis(500));
/// assert_eq!(config.max_response_size, 8 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Time allowed to establish the TCP connection.
    pub connect_timeout_ms: u64,
    /// Time allowed from sending the request to receiving the full response.
    pub response_timeout_ms: u64,
    /// Largest response (head plus body) we will buffer (8 MiB).
    pub max_response_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            response_timeout_ms: 30_000,
            max_response_size: 8 * 1024 * 1024,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// A minimal HTTP/1.1 client bound to one server.
///
/// Request targets passed to [`Transport::send`] are origin-form paths
/// (`/sample.json`), resolved against the `authority` given at construction.
/// Any non-`2xx` status is reported as [`ClientError::Status`].
///
/// # Examples
///
/// ```rust,no_run
/// use rttp_coord::client::{HttpClient, Transport};
/// use rttp_coord::http::RequestOptions;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = HttpClient::new("127.0.0.1:8080");
///     let response = client
///         .send("/sample.json", &RequestOptions::new().param("key", 1))
///         .await?;
///     println!("{}", response.text()?);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    authority: String,
    config: ClientConfig,
}

impl HttpClient {
    /// Creates a client for the server at `authority` (`host:port`) with default settings.
    pub fn new(authority: impl Into<String>) -> Self {
        Self::with_config(authority, ClientConfig::default())
    }

    /// Creates a client with explicit settings.
    pub fn with_config(authority: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                authority: authority.into(),
                config,
            }),
        }
    }

    /// Returns the `host:port` this client talks to.
    pub fn authority(&self) -> &str {
        &self.inner.authority
    }

    /// Returns the client settings.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl Transport for HttpClient {
    fn send(&self, target: &str, options: &RequestOptions) -> TransportFuture {
        let inner = Arc::clone(&self.inner);
        let encoded = options.encode(&inner.authority, target);
        let response_timeout = options
            .timeout_override()
            .unwrap_or_else(|| inner.config.response_timeout());
        let target = target.to_owned();

        Box::pin(async move {
            let request = encoded?;
            debug!(authority = %inner.authority, path = %target, "sending request");

            let response = exchange(&inner, &request, response_timeout).await?;

            if !response.status().is_success() {
                debug!(path = %target, status = %response.status(), "non-success status");
                return Err(ClientError::Status(response.status()));
            }
            Ok(response)
        })
    }
}

/// Connects, writes `request`, and reads one response, each step under its timeout.
async fn exchange(
    inner: &ClientInner,
    request: &[u8],
    response_timeout: Duration,
) -> Result<Response, ClientError> {
    let connect_timeout = inner.config.connect_timeout();
    let mut stream = timeout(connect_timeout, TcpStream::connect(inner.authority.as_str()))
        .await
        .map_err(|_| ClientError::Timeout(connect_timeout))?
        .map_err(|e| ClientError::Connect {
            authority: inner.authority.clone(),
            source: e,
        })?;

    timeout(response_timeout, async {
        stream.write_all(request).await?;
        stream.flush().await?;
        read_response(&mut stream, inner.config.max_response_size).await
    })
    .await
    .map_err(|_| ClientError::Timeout(response_timeout))?
}

/// Reads a single response from `stream`.
///
/// The body is delimited by `Content-Length` when present, otherwise by the
/// server closing the connection. Transfer codings (chunked) are rejected.
async fn read_response(
    stream: &mut TcpStream,
    max_response_size: usize,
) -> Result<Response, ClientError> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    // Read until the head is complete.
    let (head, body_offset) = loop {
        let bytes_read = stream.read_buf(&mut buf).await?;
        match Response::parse_head(&buf) {
            Ok(pair) => break pair,
            Err(ResponseError::Incomplete) => {
                if bytes_read == 0 {
                    return Err(ClientError::ConnectionClosed);
                }
                if buf.len() > max_response_size {
                    return Err(ClientError::ResponseTooLarge {
                        max_bytes: max_response_size,
                    });
                }
            }
            Err(e) => return Err(e.into()),
        }
    };

    if head.is_bodiless() {
        return Ok(head);
    }
    if head.has_transfer_coding() {
        let coding = head
            .headers()
            .get("transfer-encoding")
            .unwrap_or_default()
            .to_owned();
        warn!(coding = %coding, "server used an unsupported transfer coding");
        return Err(ClientError::UnsupportedTransferCoding(coding));
    }

    let _ = buf.split_to(body_offset);

    match head.content_length()? {
        Some(length) => {
            // Content-Length is server-controlled; compare without adding.
            if length > max_response_size.saturating_sub(body_offset) {
                return Err(ClientError::ResponseTooLarge {
                    max_bytes: max_response_size,
                });
            }
            while buf.len() < length {
                if stream.read_buf(&mut buf).await? == 0 {
                    return Err(ClientError::ConnectionClosed);
                }
            }
            buf.truncate(length);
        }
        None => loop {
            if buf.len() > max_response_size.saturating_sub(body_offset) {
                return Err(ClientError::ResponseTooLarge {
                    max_bytes: max_response_size,
                });
            }
            if stream.read_buf(&mut buf).await? == 0 {
                break;
            }
        },
    }

    Ok(head.with_body(buf.freeze()))
}
