//! The two reconciled resources: the API document and the environment

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{ApiError, StoreError};
use crate::models::{ApiDoc, EnvironmentSchema};
use crate::network::RemoteApi;
use crate::storage::{DocStorage, EnvInstance, EnvStorage};
use crate::sync::SyncedResource;

/// API document; its fingerprint is the `up_time` it embeds
pub struct DocResource {
    api: Arc<dyn RemoteApi>,
    docs: DocStorage,
}

impl DocResource {
    pub fn new(api: Arc<dyn RemoteApi>, docs: DocStorage) -> Self {
        DocResource { api, docs }
    }
}

#[async_trait]
impl SyncedResource for DocResource {
    type Value = ApiDoc;

    fn name(&self) -> &'static str {
        "doc"
    }

    async fn cached(&self) -> Option<(ApiDoc, String)> {
        let doc = self.docs.get().await?;
        let fingerprint = doc.up_time.clone();
        Some((doc, fingerprint))
    }

    async fn fetch(&self) -> Result<ApiDoc, ApiError> {
        self.api.fetch_doc().await
    }

    fn fingerprint(&self, value: &ApiDoc, _observed: Option<&str>) -> String {
        value.up_time.clone()
    }

    async fn persist(&self, value: &ApiDoc, _fingerprint: &str) -> Result<(), StoreError> {
        self.docs.save(value).await
    }
}

/// Environment schema; cached with the ping uptime it was fetched under
pub struct EnvResource {
    api: Arc<dyn RemoteApi>,
    env: EnvStorage,
}

impl EnvResource {
    pub fn new(api: Arc<dyn RemoteApi>, env: EnvStorage) -> Self {
        EnvResource { api, env }
    }
}

#[async_trait]
impl SyncedResource for EnvResource {
    type Value = EnvironmentSchema;

    fn name(&self) -> &'static str {
        "environment"
    }

    async fn cached(&self) -> Option<(EnvironmentSchema, String)> {
        let cached = self.env.instance().await?;
        Some((cached.instance, cached.uptime))
    }

    async fn fetch(&self) -> Result<EnvironmentSchema, ApiError> {
        self.api.fetch_environment().await
    }

    fn fingerprint(&self, _value: &EnvironmentSchema, observed: Option<&str>) -> String {
        observed.unwrap_or_default().to_string()
    }

    async fn persist(&self, value: &EnvironmentSchema, fingerprint: &str) -> Result<(), StoreError> {
        self.env
            .save_instance(&EnvInstance {
                instance: value.clone(),
                uptime: fingerprint.to_string(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::sync::tests::MockApi;
    use crate::sync::{Outcome, Reconciler, SyncState, Trigger};
    use std::sync::atomic::Ordering;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_validation_is_idempotent() {
        let api = Arc::new(MockApi::new("t1"));
        let storage = Storage::in_memory();
        storage.docs.save(&crate::models::fixtures::doc("t1", Vec::new())).await.unwrap();

        let mut docs = Reconciler::new(DocResource::new(api.clone(), storage.docs.clone()));
        let token = CancellationToken::new();
        assert!(docs.load_cached().await.is_some());

        assert_eq!(docs.reconcile(Trigger::Heartbeat, Some("t1"), &token).await, Outcome::Fresh);
        assert_eq!(docs.reconcile(Trigger::Heartbeat, Some("t1"), &token).await, Outcome::Fresh);
        assert_eq!(api.doc_fetches.load(Ordering::SeqCst), 0);
        assert_eq!(docs.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_stale_fingerprint_refetches_once() {
        let api = Arc::new(MockApi::new("t2"));
        let storage = Storage::in_memory();
        storage.docs.save(&crate::models::fixtures::doc("t1", Vec::new())).await.unwrap();

        let mut docs = Reconciler::new(DocResource::new(api.clone(), storage.docs.clone()));
        let token = CancellationToken::new();
        docs.load_cached().await;

        let outcome = docs.reconcile(Trigger::Heartbeat, Some("t2"), &token).await;
        assert!(matches!(outcome, Outcome::Refreshed(ref d) if d.up_time == "t2"));
        assert_eq!(storage.docs.get().await.unwrap().up_time, "t2");

        assert_eq!(docs.reconcile(Trigger::Heartbeat, Some("t2"), &token).await, Outcome::Fresh);
        assert_eq!(api.doc_fetches.load(Ordering::SeqCst), 1);

        docs.reconcile(Trigger::Manual, Some("t2"), &token).await;
        assert_eq!(api.doc_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_cache_fetches_on_startup() {
        let api = Arc::new(MockApi::new("t1"));
        let storage = Storage::in_memory();
        let mut env = Reconciler::new(EnvResource::new(api.clone(), storage.env.clone()));
        let token = CancellationToken::new();

        assert!(env.load_cached().await.is_none());
        let outcome = env.reconcile(Trigger::Startup, Some("t1"), &token).await;
        assert!(matches!(outcome, Outcome::Refreshed(_)));
        assert_eq!(storage.env.instance().await.unwrap().uptime, "t1");
        assert_eq!(env.fingerprint(), Some("t1"));
    }

    #[tokio::test]
    async fn test_failure_keeps_cache() {
        let api = Arc::new(MockApi::new("t1"));
        let storage = Storage::in_memory();
        storage.docs.save(&crate::models::fixtures::doc("t0", Vec::new())).await.unwrap();
        let mut docs = Reconciler::new(DocResource::new(api.clone(), storage.docs.clone()));
        docs.load_cached().await;

        api.set_offline(true);
        let outcome = docs.reconcile(Trigger::Manual, None, &CancellationToken::new()).await;
        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(docs.current().unwrap().up_time, "t0");
        assert_eq!(storage.docs.get().await.unwrap().up_time, "t0");
    }

    #[tokio::test]
    async fn test_cancelled_run_applies_nothing() {
        let api = Arc::new(MockApi::new("t2"));
        let storage = Storage::in_memory();
        let mut docs = Reconciler::new(DocResource::new(api.clone(), storage.docs.clone()));

        let token = CancellationToken::new();
        token.cancel();
        let outcome = docs.reconcile(Trigger::Startup, Some("t2"), &token).await;
        assert_eq!(outcome, Outcome::Cancelled);
        assert!(docs.current().is_none());
        assert!(storage.docs.get().await.is_none());
        assert_eq!(api.doc_fetches.load(Ordering::SeqCst), 0);
    }
}
