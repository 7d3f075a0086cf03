//! Debounced writes with explicit flush
//!
//! Each key owns one pending slot. `schedule` replaces the slot and restarts
//! its timer; when the timer fires the latest payload is written once.
//! `flush` writes the slot immediately and only returns after any in-flight
//! timer write has finished, so a following delete can never be undone by a
//! late write.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

use crate::error::StoreError;

/// Destination of debounced payloads
#[async_trait]
pub trait DebounceSink<T: Sync>: Send + Sync {
    async fn write(&self, key: &str, payload: &T) -> Result<(), StoreError>;
}

struct Pending<T> {
    payload: T,
    generation: u64,
    timer: AbortHandle,
}

struct Inner<T> {
    pending: Mutex<HashMap<String, Pending<T>>>,
    /// Held for the duration of every write
    gate: Mutex<()>,
    next_generation: AtomicU64,
    failures: std::sync::Mutex<Vec<StoreError>>,
}

pub struct Debouncer<T> {
    window: Duration,
    sink: Arc<dyn DebounceSink<T>>,
    inner: Arc<Inner<T>>,
}

impl<T: Send + Sync + 'static> Debouncer<T> {
    pub fn new(window: Duration, sink: Arc<dyn DebounceSink<T>>) -> Self {
        Debouncer {
            window,
            sink,
            inner: Arc::new(Inner {
                pending: Mutex::new(HashMap::new()),
                gate: Mutex::new(()),
                next_generation: AtomicU64::new(0),
                failures: std::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    /// Replace the pending payload for `key` and restart its window.
    pub async fn schedule(&self, key: &str, payload: T) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.inner.pending.lock().await;

        let inner = Arc::clone(&self.inner);
        let sink = Arc::clone(&self.sink);
        let window = self.window;
        let owned_key = key.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _gate = inner.gate.lock().await;
            let due = {
                let mut pending = inner.pending.lock().await;
                match pending.get(&owned_key) {
                    Some(p) if p.generation == generation => pending.remove(&owned_key),
                    _ => None,
                }
            };
            if let Some(due) = due {
                if let Err(e) = sink.write(&owned_key, &due.payload).await {
                    inner.record_failure(&owned_key, e);
                }
            }
        })
        .abort_handle();

        let previous = pending.insert(
            key.to_string(),
            Pending {
                payload,
                generation,
                timer,
            },
        );
        if let Some(previous) = previous {
            previous.timer.abort();
        }
    }

    /// Write the pending payload for `key` now, if any.
    pub async fn flush(&self, key: &str) -> Result<(), StoreError> {
        let taken = self.inner.pending.lock().await.remove(key);
        if let Some(p) = &taken {
            p.timer.abort();
        }

        let _gate = self.inner.gate.lock().await;
        if let Some(p) = taken {
            self.sink.write(key, &p.payload).await?;
        }
        Ok(())
    }

    /// Write every pending payload now. The first error is returned after
    /// all writes were attempted.
    pub async fn flush_all(&self) -> Result<(), StoreError> {
        let taken: Vec<(String, Pending<T>)> =
            self.inner.pending.lock().await.drain().collect();

        let _gate = self.inner.gate.lock().await;
        let mut first_error = None;
        for (key, p) in taken {
            p.timer.abort();
            if let Err(e) = self.sink.write(&key, &p.payload).await {
                tracing::warn!(key = %key, error = %e, "Flushing pending write failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Drop the pending payload for `key` without writing it.
    pub async fn cancel(&self, key: &str) {
        if let Some(p) = self.inner.pending.lock().await.remove(key) {
            p.timer.abort();
        }
    }

    #[cfg(test)]
    pub async fn is_pending(&self, key: &str) -> bool {
        self.inner.pending.lock().await.contains_key(key)
    }

    /// Errors from timer-driven writes since the last call.
    pub fn take_failures(&self) -> Vec<StoreError> {
        match self.inner.failures.lock() {
            Ok(mut failures) => std::mem::take(&mut *failures),
            Err(_) => Vec::new(),
        }
    }
}

impl<T> Inner<T> {
    fn record_failure(&self, key: &str, error: StoreError) {
        tracing::warn!(key = %key, error = %error, "Debounced write failed");
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(error);
        }
    }
}
