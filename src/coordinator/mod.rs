//! Request coordination — one network call per logical request, shared by
//! every concurrent caller, with completed results cached.
//!
//! Each [`RequestKey`] moves through three states:
//!
//! | State      | Meaning                                   | Next                          |
//! |------------|-------------------------------------------|-------------------------------|
//! | absent     | never fetched, failed, or evicted         | in-flight on the next `fetch` |
//! | in-flight  | one transport call outstanding, shared    | resolved (ok) / absent (err)  |
//! | resolved   | response cached                           | absent when evicted           |
//!
//! The cache is bounded by a per-call limit and evicts in insertion order
//! (oldest first). Failures are never cached and surface to callers as the
//! opaque [`FetchError::RequestFailed`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::{ClientError, Transport};
use crate::http::{RequestOptions, Response};

mod key;
mod state;

pub use key::RequestKey;

use state::{SharedFetch, State};

/// Cache limit applied when a caller does not pass one.
pub const DEFAULT_CACHE_LIMIT: usize = 999;

/// The only error a caller of [`RequestCoordinator::fetch`] can observe.
///
/// The underlying transport error is logged and then discarded, so callers
/// cannot tell a refused connection from a `500`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("API request failed")]
    RequestFailed,
}

/// Coordinator settings.
///
/// ```
/// use rttp_coord::coordinator::CoordinatorConfig;
///
/// let config: CoordinatorConfig = serde_json::from_str("{}").unwrap();
/// assert_eq!(config.default_cache_limit, 999);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Cache bound used when `fetch` is called without an explicit limit.
    pub default_cache_limit: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_cache_limit: DEFAULT_CACHE_LIMIT,
        }
    }
}

/// Deduplicating, caching front for a [`Transport`].
///
/// Construct one per process and hand out clones; every clone shares the
/// same cache and in-flight registry.
///
/// # Examples
///
/// ```rust,no_run
/// use rttp_coord::client::HttpClient;
/// use rttp_coord::coordinator::RequestCoordinator;
/// use rttp_coord::http::RequestOptions;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let api = RequestCoordinator::new(HttpClient::new("127.0.0.1:8080"));
///
///     let options = RequestOptions::new().param("key", 1);
///     // Both calls share one network round trip.
///     let (a, b) = tokio::join!(
///         api.fetch("/sample.json", &options, None),
///         api.fetch("/sample.json", &options, None),
///     );
///     assert!(std::sync::Arc::ptr_eq(&a?, &b?));
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RequestCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Box<dyn Transport>,
    config: CoordinatorConfig,
    state: Mutex<State>,
}

impl RequestCoordinator {
    /// Creates a coordinator over `transport` with default settings.
    pub fn new(transport: impl Transport) -> Self {
        Self::with_config(transport, CoordinatorConfig::default())
    }

    /// Creates a coordinator with explicit settings.
    pub fn with_config(transport: impl Transport, config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport: Box::new(transport),
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Returns the coordinator settings.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Fetches `request` with `options`, reusing a cached or in-flight result
    /// for the same [`RequestKey`] when one exists.
    ///
    /// `cache_limit` bounds the number of cached responses; `None` uses
    /// [`CoordinatorConfig::default_cache_limit`] and `0` is treated as `1`.
    /// Before anything else, if the cache holds more than the limit, the
    /// single oldest entry is evicted.
    ///
    /// A started request runs to completion on the Tokio runtime even if
    /// every caller stops awaiting it. Must be called from within a Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::RequestFailed`] if the transport fails. Every
    /// caller sharing the attempt receives the same error and nothing is
    /// cached, so a later call starts a fresh attempt.
    pub async fn fetch(
        &self,
        request: &str,
        options: &RequestOptions,
        cache_limit: Option<usize>,
    ) -> Result<Arc<Response>, FetchError> {
        let key = RequestKey::new(request, options).map_err(|e| {
            warn!(path = %request, error = %e, "could not derive request key");
            FetchError::RequestFailed
        })?;
        let limit = cache_limit
            .unwrap_or(self.inner.config.default_cache_limit)
            .max(1);

        // Eviction, lookup, and registration happen under one lock with no
        // await in between.
        let pending = {
            let mut state = self.inner.lock();
            state.shrink_to(limit);

            if let Some(response) = state.cached(&key) {
                debug!(key = %key, "cache hit");
                return Ok(Arc::clone(response));
            }

            match state.pending(&key) {
                Some(pending) => {
                    debug!(key = %key, "joining in-flight request");
                    pending.clone()
                }
                None => {
                    debug!(key = %key, "starting request");
                    let generation = state.next_generation();
                    let pending = self.start(key.clone(), generation, request, options, limit);
                    state.register(key, generation, pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Fetches `request` with default options and the default cache limit.
    pub async fn fetch_path(&self, request: &str) -> Result<Arc<Response>, FetchError> {
        self.fetch(request, &RequestOptions::default(), None).await
    }

    /// Number of cached responses.
    pub fn cached_len(&self) -> usize {
        self.inner.lock().cached_len()
    }

    /// Number of requests currently in flight.
    pub fn in_flight_len(&self) -> usize {
        self.inner.lock().in_flight_len()
    }

    /// Returns `true` if a response for `key` is cached.
    pub fn is_cached(&self, key: &RequestKey) -> bool {
        self.inner.lock().cached(key).is_some()
    }

    /// Returns `true` if a request for `key` is in flight.
    pub fn is_in_flight(&self, key: &RequestKey) -> bool {
        self.inner.lock().is_in_flight(key)
    }

    /// Keys of cached responses, oldest first.
    pub fn cached_keys(&self) -> Vec<RequestKey> {
        self.inner.lock().cached_keys()
    }

    /// Spawns the transport call for `key` and wraps its outcome in a
    /// shareable future. The spawned task records the outcome itself, so the
    /// state is updated whether or not anyone is still awaiting.
    ///
    /// [`Transport::send`] is invoked inside the spawned task, never under
    /// the state lock, so a transport may call back into the coordinator.
    fn start(
        &self,
        key: RequestKey,
        generation: u64,
        request: &str,
        options: &RequestOptions,
        limit: usize,
    ) -> SharedFetch {
        let request = request.to_owned();
        let options = options.clone();
        let task_inner = Arc::clone(&self.inner);
        let task_key = key.clone();

        let task = tokio::spawn(async move {
            let operation = async { task_inner.transport.send(&request, &options).await };
            let outcome = AssertUnwindSafe(operation).catch_unwind().await;
            task_inner.settle(task_key, generation, outcome, limit)
        });

        let inner = Arc::clone(&self.inner);
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    // Cancelled at runtime shutdown: settle never ran.
                    warn!(key = %key, error = %e, "request task did not complete");
                    inner.lock().clear_pending(&key, generation);
                    Err(FetchError::RequestFailed)
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(
        &self,
        key: RequestKey,
        generation: u64,
        outcome: Result<Result<Response, ClientError>, Box<dyn Any + Send>>,
        limit: usize,
    ) -> Result<Arc<Response>, FetchError> {
        let mut state = self.lock();
        match outcome {
            Ok(Ok(response)) => {
                let response = Arc::new(response);
                debug!(key = %key, status = %response.status(), "request completed");
                state.store(key, generation, Arc::clone(&response), limit);
                Ok(response)
            }
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "request failed");
                state.clear_pending(&key, generation);
                Err(FetchError::RequestFailed)
            }
            Err(_) => {
                warn!(key = %key, "transport panicked");
                state.clear_pending(&key, generation);
                Err(FetchError::RequestFailed)
            }
        }
    }
}
