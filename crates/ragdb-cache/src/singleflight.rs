//! In-process request coalescing: concurrent callers with the same key share
//! one execution and its result.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use ragdb_core::Result;

type Flight<T> = Shared<BoxFuture<'static, Result<T>>>;

pub struct SingleFlight<T: Clone> {
    inflight: Mutex<HashMap<String, Flight<T>>>,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self { inflight: Mutex::new(HashMap::new()) }
    }
}

/// Removes the leader's entry however its call ends, including cancellation.
struct Landing<'a, T: Clone> {
    group: &'a SingleFlight<T>,
    key: String,
}

impl<T: Clone> Drop for Landing<'_, T> {
    fn drop(&mut self) {
        let mut map = match self.group.inflight.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.remove(&self.key);
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` unless a call with `key` is already in flight, in which
    /// case that call's result is awaited instead.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (flight, landing) = {
            let mut map = match self.inflight.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(existing) = map.get(key) {
                (existing.clone(), None)
            } else {
                let flight = work().boxed().shared();
                map.insert(key.to_string(), flight.clone());
                (flight, Some(Landing { group: self, key: key.to_string() }))
            }
        };
        let out = flight.await;
        drop(landing);
        out
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.lock().map_or(0, |m| m.len())
    }
}
