//! # rttp-coord
//!
//! A request-deduplicating, result-caching access layer for outbound HTTP
//! calls, built on a from-scratch async HTTP/1.1 client.
//!
//! Concurrent fetches of the same logical request share one network call,
//! successful responses are cached with a size-bound FIFO policy, and every
//! failure surfaces as a single opaque error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rttp_coord::{HttpClient, RequestCoordinator, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // One coordinator per process; clone it into every task that fetches.
//!     let api = RequestCoordinator::new(HttpClient::new("127.0.0.1:8080"));
//!
//!     let options = RequestOptions::new().param("key", 1);
//!     let response = api.fetch("/sample.json", &options, None).await?;
//!     println!("{}", response.text()?);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod coordinator;
pub mod http;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use client::{ClientConfig, ClientError, HttpClient, Transport};
pub use coordinator::{CoordinatorConfig, FetchError, RequestCoordinator, RequestKey};
pub use http::{Headers, RequestOptions, Response, StatusCode};
