//! Per-key request coalescing
//!
//! Concurrent callers asking for the same key share one upstream call. The
//! entry is dropped once the call completes, so later callers start fresh.

use archview_common::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

type Slot<T> = Arc<OnceCell<std::result::Result<T, String>>>;

pub struct SingleFlight<T> {
    inflight: Mutex<HashMap<String, Slot<T>>>,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `call` for `key` unless an identical call is already in flight,
    /// in which case wait for its outcome instead.
    ///
    /// Failures are shared with every waiter as [`Error::Upstream`].
    pub async fn run<F, Fut>(&self, key: &str, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let slot = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone();

        let outcome = slot
            .get_or_init(|| async { call().await.map_err(|e| e.to_string()) })
            .await
            .clone();

        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if inflight.get(key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
            inflight.remove(key);
        }
        drop(inflight);

        outcome.map_err(Error::Upstream)
    }

    /// Number of keys with a call in flight
    pub fn len(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
