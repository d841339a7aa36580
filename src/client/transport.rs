//! The network collaborator seam used by the coordinator.

use std::future::Future;
use std::pin::Pin;

use super::ClientError;
use crate::http::{RequestOptions, Response};

/// Boxed future returned by [`Transport::send`].
///
/// The future is `'static` so the coordinator can spawn it and let it run to
/// completion independently of any single caller.
pub type TransportFuture = Pin<Box<dyn Future<Output = Result<Response, ClientError>> + Send>>;

/// An HTTP-capable client that performs one request per call.
///
/// The coordinator treats a transport as opaque: `Ok` is success, `Err` is
/// failure, and nothing about the response is interpreted beyond that.
/// Transports are responsible for deciding which statuses count as failures
/// ([`HttpClient`](super::HttpClient) rejects non-`2xx`).
///
/// Any `Fn(String, RequestOptions) -> impl Future<Output = Result<Response, ClientError>>`
/// closure implements this trait, which keeps test doubles short:
///
/// ```
/// use rttp_coord::client::{ClientError, Transport};
/// use rttp_coord::http::{RequestOptions, Response, StatusCode};
///
/// fn assert_transport<T: Transport>(_: &T) {}
///
/// let fake = |_target: String, _options: RequestOptions| async {
///     Ok::<_, ClientError>(Response::new(StatusCode::OK).with_body("stub"))
/// };
/// assert_transport(&fake);
/// ```
pub trait Transport: Send + Sync + 'static {
    /// Starts a request for `target` configured by `options`.
    fn send(&self, target: &str, options: &RequestOptions) -> TransportFuture;
}

impl<T, F> Transport for T
where
    T: Fn(String, RequestOptions) -> F + Send + Sync + 'static,
    F: Future<Output = Result<Response, ClientError>> + Send + 'static,
{
    fn send(&self, target: &str, options: &RequestOptions) -> TransportFuture {
        Box::pin((self)(target.to_owned(), options.clone()))
    }
}
