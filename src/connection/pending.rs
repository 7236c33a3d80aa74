//! Correlation of in-flight requests with their responses

use crate::error::{Result, SdkError};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Outstanding requests keyed by correlation id
///
/// Each entry settles at most once: whichever of response, timeout or
/// rejection removes it first wins, and later attempts are no-ops.
pub struct PendingRequests<K, T> {
    inner: Mutex<HashMap<K, oneshot::Sender<Result<T>>>>,
}

impl<K, T> PendingRequests<K, T>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Register a request. Dropping the returned handle before it settles
    /// removes the entry, so a cancelled caller leaves nothing behind.
    pub fn register(&self, key: K) -> Pending<'_, K, T> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(key.clone(), tx);
        Pending {
            requests: self,
            key,
            rx,
        }
    }

    /// Complete a request. Returns false if nothing was waiting on `key`.
    pub fn settle(&self, key: &K, result: Result<T>) -> bool {
        match self.lock().remove(key) {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Drop a request without completing it
    pub fn remove(&self, key: &K) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Fail every outstanding request with `error`
    pub fn reject_all(&self, error: SdkError) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, oneshot::Sender<Result<T>>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, T> Default for PendingRequests<K, T>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// An outstanding request registered with [`PendingRequests`]
pub struct Pending<'a, K, T>
where
    K: Eq + Hash + Clone,
{
    requests: &'a PendingRequests<K, T>,
    key: K,
    rx: oneshot::Receiver<Result<T>>,
}

impl<K, T> Pending<'_, K, T>
where
    K: Eq + Hash + Clone,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Race the response against `timeout`. The entry is gone afterwards
    /// whichever way this ends, so a late response is discarded.
    pub async fn wait(mut self, timeout: Duration) -> Result<T> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SdkError::connection("request dropped before completion")),
            Err(_) => Err(SdkError::Timeout(timeout)),
        }
    }
}

impl<K, T> Drop for Pending<'_, K, T>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        self.requests.remove(&self.key);
    }
}
