//! Reconciliation of cached remote resources
//!
//! A [`Reconciler`] serves a cached value immediately and revalidates it
//! against a cheap server fingerprint. States move
//! `Idle -> Validating -> (Refetching ->) Idle`. A cancelled run never
//! touches the cache or the in-memory value.

pub mod actor;
pub mod resources;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, StoreError};

pub use actor::{SyncActor, SyncCommand, SyncEvent};
pub use resources::{DocResource, EnvResource};

/// What started a reconciliation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Heartbeat,
    /// Refetch regardless of the fingerprint
    Manual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Validating,
    Refetching,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<V> {
    /// Cache matches the fingerprint
    Fresh,
    Refreshed(V),
    /// Fetch failed; the cache stays authoritative
    Failed,
    Cancelled,
}

/// A remote value with a durable cache
#[async_trait]
pub trait SyncedResource: Send + Sync {
    type Value: Clone + Send + Sync;

    fn name(&self) -> &'static str;

    /// Cached value with the fingerprint it was fetched under.
    async fn cached(&self) -> Option<(Self::Value, String)>;

    async fn fetch(&self) -> Result<Self::Value, ApiError>;

    /// Fingerprint to record for a freshly fetched value. `observed` is the
    /// fingerprint the server reported for this run.
    fn fingerprint(&self, value: &Self::Value, observed: Option<&str>) -> String;

    async fn persist(&self, value: &Self::Value, fingerprint: &str) -> Result<(), StoreError>;
}

pub struct Reconciler<R: SyncedResource> {
    resource: R,
    state: SyncState,
    current: Option<R::Value>,
    fingerprint: Option<String>,
}

impl<R: SyncedResource> Reconciler<R> {
    pub fn new(resource: R) -> Self {
        Reconciler {
            resource,
            state: SyncState::Idle,
            current: None,
            fingerprint: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn current(&self) -> Option<&R::Value> {
        self.current.as_ref()
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Adopt the cached value, if any, without contacting the server.
    pub async fn load_cached(&mut self) -> Option<R::Value> {
        let (value, fingerprint) = self.resource.cached().await?;
        tracing::debug!(resource = self.resource.name(), fingerprint = %fingerprint, "Serving cached value");
        self.current = Some(value.clone());
        self.fingerprint = Some(fingerprint);
        Some(value)
    }

    /// Validate against `observed` and refetch when stale. With nothing
    /// cached the fetch always happens.
    pub async fn reconcile(
        &mut self,
        trigger: Trigger,
        observed: Option<&str>,
        token: &CancellationToken,
    ) -> Outcome<R::Value> {
        if token.is_cancelled() {
            return Outcome::Cancelled;
        }

        self.state = SyncState::Validating;
        let stale = match trigger {
            Trigger::Manual => true,
            Trigger::Startup | Trigger::Heartbeat => {
                self.current.is_none()
                    || observed.is_some_and(|fp| self.fingerprint.as_deref() != Some(fp))
            }
        };
        if !stale {
            self.state = SyncState::Idle;
            return Outcome::Fresh;
        }

        self.state = SyncState::Refetching;
        tracing::info!(
            resource = self.resource.name(),
            ?trigger,
            cached = ?self.fingerprint,
            observed = ?observed,
            "Refetching"
        );
        let fetched = tokio::select! {
            biased;

            _ = token.cancelled() => None,
            result = self.resource.fetch() => Some(result),
        };

        let outcome = match fetched {
            None => Outcome::Cancelled,
            Some(Err(e)) => {
                tracing::warn!(resource = self.resource.name(), error = %e, "Refetch failed, keeping cache");
                Outcome::Failed
            }
            Some(Ok(_)) if token.is_cancelled() => Outcome::Cancelled,
            Some(Ok(value)) => {
                let fingerprint = self.resource.fingerprint(&value, observed);
                if let Err(e) = self.resource.persist(&value, &fingerprint).await {
                    tracing::warn!(resource = self.resource.name(), error = %e, "Persisting refreshed value failed");
                }
                self.current = Some(value.clone());
                self.fingerprint = Some(fingerprint);
                Outcome::Refreshed(value)
            }
        };
        self.state = SyncState::Idle;
        outcome
    }
}
