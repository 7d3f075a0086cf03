//! Sync actor - startup reconciliation, heartbeat and manual refresh

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::{ApiDoc, EnvironmentSchema};
use crate::network::RemoteApi;
use crate::storage::Storage;
use crate::sync::{DocResource, EnvResource, Outcome, Reconciler, Trigger};

/// Commands sent from App layer to the sync actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Refetch document and environment now
    Refresh,
}

/// Events sent from the sync actor to the App layer
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    DocLoaded {
        doc: ApiDoc,
        from_cache: bool,
    },
    EnvLoaded {
        schema: EnvironmentSchema,
        from_cache: bool,
    },
    Health {
        online: bool,
        uptime: Option<String>,
        checked_at: DateTime<Utc>,
    },
}

pub struct SyncActor {
    api: Arc<dyn RemoteApi>,
    docs: Reconciler<DocResource>,
    env: Reconciler<EnvResource>,
    event_tx: mpsc::UnboundedSender<SyncEvent>,
    heartbeat: Duration,
    token: CancellationToken,
}

impl SyncActor {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        storage: &Storage,
        event_tx: mpsc::UnboundedSender<SyncEvent>,
        heartbeat: Duration,
        token: CancellationToken,
    ) -> Self {
        SyncActor {
            docs: Reconciler::new(DocResource::new(Arc::clone(&api), storage.docs.clone())),
            env: Reconciler::new(EnvResource::new(Arc::clone(&api), storage.env.clone())),
            api,
            event_tx,
            heartbeat,
            token,
        }
    }

    /// Run until the token is cancelled or the command channel closes
    pub async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<SyncCommand>) {
        self.startup().await;

        let mut ticker = tokio::time::interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.token.cancelled() => break,

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SyncCommand::Refresh) => self.run_trigger(Trigger::Manual).await,
                        None => break,
                    }
                }

                _ = ticker.tick() => self.run_trigger(Trigger::Heartbeat).await,
            }
        }
        tracing::debug!("Sync actor stopped");
    }

    /// Serve the caches first, then validate them.
    async fn startup(&mut self) {
        if let Some(doc) = self.docs.load_cached().await {
            let _ = self.event_tx.send(SyncEvent::DocLoaded {
                doc,
                from_cache: true,
            });
        }
        if let Some(schema) = self.env.load_cached().await {
            let _ = self.event_tx.send(SyncEvent::EnvLoaded {
                schema,
                from_cache: true,
            });
        }
        self.run_trigger(Trigger::Startup).await;
    }

    async fn run_trigger(&mut self, trigger: Trigger) {
        let observed = self.ping().await;
        if observed.is_none() && trigger == Trigger::Heartbeat {
            return;
        }

        if let Outcome::Refreshed(doc) = self
            .docs
            .reconcile(trigger, observed.as_deref(), &self.token)
            .await
        {
            let _ = self.event_tx.send(SyncEvent::DocLoaded {
                doc,
                from_cache: false,
            });
        }
        if let Outcome::Refreshed(schema) = self
            .env
            .reconcile(trigger, observed.as_deref(), &self.token)
            .await
        {
            let _ = self.event_tx.send(SyncEvent::EnvLoaded {
                schema,
                from_cache: false,
            });
        }
    }

    /// Ping the server and report health. Returns the fingerprint.
    async fn ping(&self) -> Option<String> {
        let result = tokio::select! {
            biased;

            _ = self.token.cancelled() => return None,
            result = self.api.ping() => result,
        };

        let uptime = match result {
            Ok(pong) => Some(pong.uptime),
            Err(e) => {
                tracing::warn!(error = %e, "Heartbeat failed");
                None
            }
        };
        let _ = self.event_tx.send(SyncEvent::Health {
            online: uptime.is_some(),
            uptime: uptime.clone(),
            checked_at: Utc::now(),
        });
        uptime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::tests::MockApi;
    use std::sync::atomic::Ordering;

    fn spawn(
        api: Arc<MockApi>,
        storage: &Storage,
    ) -> (
        mpsc::UnboundedReceiver<SyncEvent>,
        mpsc::UnboundedSender<SyncCommand>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let actor = SyncActor::new(api, storage, event_tx, Duration::from_secs(30), token.clone());
        let handle = tokio::spawn(actor.run(cmd_rx));
        (event_rx, cmd_tx, token, handle)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> SyncEvent {
        rx.recv().await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_heartbeat_and_refresh() {
        let api = Arc::new(MockApi::new("t1"));
        let storage = Storage::in_memory();
        let (mut rx, cmd_tx, token, handle) = spawn(api.clone(), &storage);

        assert!(matches!(next(&mut rx).await, SyncEvent::Health { online: true, .. }));
        assert!(matches!(next(&mut rx).await, SyncEvent::DocLoaded { from_cache: false, .. }));
        assert!(matches!(next(&mut rx).await, SyncEvent::EnvLoaded { from_cache: false, .. }));

        // unchanged fingerprint: heartbeat only
        assert!(matches!(next(&mut rx).await, SyncEvent::Health { online: true, .. }));
        assert_eq!(api.doc_fetches.load(Ordering::SeqCst), 1);

        api.set_up_time("t2");
        assert!(matches!(next(&mut rx).await, SyncEvent::Health { .. }));
        match next(&mut rx).await {
            SyncEvent::DocLoaded { doc, .. } => assert_eq!(doc.up_time, "t2"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(next(&mut rx).await, SyncEvent::EnvLoaded { .. }));

        cmd_tx.send(SyncCommand::Refresh).unwrap();
        assert!(matches!(next(&mut rx).await, SyncEvent::Health { .. }));
        assert!(matches!(next(&mut rx).await, SyncEvent::DocLoaded { .. }));
        assert_eq!(api.doc_fetches.load(Ordering::SeqCst), 3);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_values_are_served_first() {
        let api = Arc::new(MockApi::new("t1"));
        let storage = Storage::in_memory();
        storage.docs.save(&crate::models::fixtures::doc("t1", Vec::new())).await.unwrap();

        let (mut rx, _cmd_tx, token, handle) = spawn(api.clone(), &storage);
        assert!(matches!(next(&mut rx).await, SyncEvent::DocLoaded { from_cache: true, .. }));
        assert!(matches!(next(&mut rx).await, SyncEvent::Health { online: true, .. }));
        // environment was never cached
        assert!(matches!(next(&mut rx).await, SyncEvent::EnvLoaded { from_cache: false, .. }));
        assert_eq!(api.doc_fetches.load(Ordering::SeqCst), 0);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_heartbeat_reports_health() {
        let api = Arc::new(MockApi::new("t1"));
        let storage = Storage::in_memory();
        let (mut rx, _cmd_tx, token, handle) = spawn(api.clone(), &storage);
        for _ in 0..3 {
            next(&mut rx).await;
        }

        api.set_offline(true);
        assert!(matches!(next(&mut rx).await, SyncEvent::Health { online: false, uptime: None, .. }));
        token.cancel();
        handle.await.unwrap();
    }
}
