//! The three stores guarded by the coordinator's lock.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use tracing::info;

use super::{FetchError, RequestKey};
use crate::http::Response;

/// A pending fetch that any number of callers can await.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Response>, FetchError>>>;

/// Completed responses in insertion order plus the in-flight registry.
///
/// `order` holds exactly the keys of `responses`, oldest first. A key is
/// never in both `responses` and `in_flight`. Each in-flight entry carries
/// the generation of the attempt that registered it.
#[derive(Default)]
pub(crate) struct State {
    responses: HashMap<RequestKey, Arc<Response>>,
    order: VecDeque<RequestKey>,
    in_flight: HashMap<RequestKey, (u64, SharedFetch)>,
    generation: u64,
}

impl State {
    pub(crate) fn cached(&self, key: &RequestKey) -> Option<&Arc<Response>> {
        self.responses.get(key)
    }

    pub(crate) fn pending(&self, key: &RequestKey) -> Option<&SharedFetch> {
        self.in_flight.get(key).map(|(_, fetch)| fetch)
    }

    /// Hands out the generation for the next attempt.
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    pub(crate) fn register(&mut self, key: RequestKey, generation: u64, fetch: SharedFetch) {
        debug_assert!(!self.responses.contains_key(&key));
        self.in_flight.insert(key, (generation, fetch));
    }

    /// Removes the in-flight entry for `key` if it still belongs to `generation`.
    pub(crate) fn clear_pending(&mut self, key: &RequestKey, generation: u64) -> bool {
        match self.in_flight.get(key) {
            Some((registered, _)) if *registered == generation => {
                self.in_flight.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Removes the single oldest response if the cache holds more than `limit`.
    pub(crate) fn shrink_to(&mut self, limit: usize) {
        if self.responses.len() > limit {
            self.evict_oldest(limit);
        }
    }

    /// Stores a completed response, first making room so the cache holds at
    /// most `limit` entries afterwards.
    pub(crate) fn store(
        &mut self,
        key: RequestKey,
        generation: u64,
        response: Arc<Response>,
        limit: usize,
    ) {
        self.clear_pending(&key, generation);
        if self.responses.len() >= limit {
            self.evict_oldest(limit);
        }
        if self.responses.insert(key.clone(), response).is_none() {
            self.order.push_back(key);
        }
    }

    fn evict_oldest(&mut self, limit: usize) {
        if let Some(oldest) = self.order.pop_front() {
            info!(key = %oldest, limit, "evicting oldest cached response");
            self.responses.remove(&oldest);
            self.in_flight.remove(&oldest);
        }
    }

    pub(crate) fn cached_len(&self) -> usize {
        self.responses.len()
    }

    pub(crate) fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub(crate) fn is_in_flight(&self, key: &RequestKey) -> bool {
        self.in_flight.contains_key(key)
    }

    pub(crate) fn cached_keys(&self) -> Vec<RequestKey> {
        self.order.iter().cloned().collect()
    }
}
