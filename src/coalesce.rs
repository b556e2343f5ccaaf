//! Request coalescing for repeated reads.
//!
//! Identical requests inside the freshness window are served from the last
//! completed result. A newer request supersedes any in-flight one: when the
//! older request finishes its result is discarded instead of applied.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<V> {
    /// Result of a request issued by this call.
    Fresh(V),
    /// An identical request completed within the freshness window.
    Cached(V),
    /// A newer request started while this one was in flight.
    Superseded,
}

struct Completed<K, V> {
    key: K,
    value: V,
    at: DateTime<Utc>,
}

struct CoalesceState<K, V> {
    latest: u64,
    completed: Option<Completed<K, V>>,
}

pub struct CoalescingFetcher<K, V> {
    clock: Arc<dyn Clock>,
    freshness: Duration,
    debounce: Duration,
    state: Mutex<CoalesceState<K, V>>,
}

impl<K, V> CoalescingFetcher<K, V>
where
    K: PartialEq + Clone,
    V: Clone,
{
    pub fn new(clock: Arc<dyn Clock>, freshness: Duration, debounce: Duration) -> Self {
        Self {
            clock,
            freshness,
            debounce,
            state: Mutex::new(CoalesceState {
                latest: 0,
                completed: None,
            }),
        }
    }

    pub async fn fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<Fetched<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let ticket = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(done) = &state.completed {
                if done.key == key && self.is_fresh(done.at) {
                    return Ok(Fetched::Cached(done.value.clone()));
                }
            }
            state.latest += 1;
            state.latest
        };

        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
            if self.is_superseded(ticket) {
                return Ok(Fetched::Superseded);
            }
        }

        let value = fetch().await?;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.latest != ticket {
            return Ok(Fetched::Superseded);
        }
        state.completed = Some(Completed {
            key,
            value: value.clone(),
            at: self.clock.now(),
        });
        Ok(Fetched::Fresh(value))
    }

    /// Forget the cached result so the next fetch always goes out.
    pub fn invalidate(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.completed = None;
    }

    fn is_superseded(&self, ticket: u64) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.latest != ticket
    }

    fn is_fresh(&self, at: DateTime<Utc>) -> bool {
        match self.clock.now().signed_duration_since(at).to_std() {
            Ok(elapsed) => elapsed < self.freshness,
            Err(_) => false,
        }
    }
}
