//! Network actor - runs compiled requests in the Tokio runtime

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::messages::{NetworkCommand, NetworkResponse};
use crate::network::normalize::normalize;
use crate::network::transport::Transport;

/// Tracks an in-flight request for cancellation
struct ActiveRequest {
    tab_key: String,
    cancel_tx: oneshot::Sender<()>,
}

/// Executes requests concurrently and reports normalised responses
pub struct NetworkActor {
    transport: Arc<dyn Transport>,
    response_tx: mpsc::UnboundedSender<NetworkResponse>,
    active_requests: JoinSet<u64>,
    cancel_handles: HashMap<u64, ActiveRequest>,
}

impl NetworkActor {
    pub fn new(
        transport: Arc<dyn Transport>,
        response_tx: mpsc::UnboundedSender<NetworkResponse>,
    ) -> Self {
        NetworkActor {
            transport,
            response_tx,
            active_requests: JoinSet::new(),
            cancel_handles: HashMap::new(),
        }
    }

    /// Run the network actor message loop
    pub async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<NetworkCommand>) {
        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(NetworkCommand::Execute { id, tab_key, request }) => {
                            let (cancel_tx, mut cancel_rx) = oneshot::channel();
                            self.cancel_handles.insert(id, ActiveRequest {
                                tab_key: tab_key.clone(),
                                cancel_tx,
                            });

                            let transport = Arc::clone(&self.transport);
                            let response_tx = self.response_tx.clone();

                            self.active_requests.spawn(async move {
                                tokio::select! {
                                    biased;

                                    _ = &mut cancel_rx => {}
                                    (raw, timing) = transport.execute(request) => {
                                        let response = normalize(raw, timing);
                                        let _ = response_tx.send(NetworkResponse::Completed {
                                            id,
                                            tab_key,
                                            response,
                                        });
                                    }
                                }
                                id
                            });
                        }

                        Some(NetworkCommand::Cancel(id)) => {
                            if let Some(active) = self.cancel_handles.remove(&id) {
                                tracing::info!(id, tab_key = %active.tab_key, "Cancelling request");
                                let _ = active.cancel_tx.send(());
                                let _ = self.response_tx.send(NetworkResponse::Cancelled {
                                    id,
                                    tab_key: active.tab_key,
                                });
                            }
                        }

                        Some(NetworkCommand::Shutdown) | None => {
                            for (_, active) in self.cancel_handles.drain() {
                                let _ = active.cancel_tx.send(());
                            }
                            self.active_requests.abort_all();
                            break;
                        }
                    }
                }

                Some(result) = self.active_requests.join_next() => {
                    if let Ok(id) = result {
                        self.cancel_handles.remove(&id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpMethod;
    use crate::network::compile::{WireBody, WireRequest};
    use crate::network::normalize::{Payload, RawHttpResponse, Timing};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    struct SlowTransport;

    #[async_trait]
    impl Transport for SlowTransport {
        async fn execute(&self, request: WireRequest) -> (RawHttpResponse, Timing) {
            if request.url.contains("slow") {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            (
                RawHttpResponse {
                    status: 204,
                    status_text: "No Content".into(),
                    headers: Vec::new(),
                    payload: Payload::Empty,
                },
                Timing {
                    duration_ms: 1.0,
                    timestamp: Utc::now(),
                },
            )
        }
    }

    fn request(url: &str) -> WireRequest {
        WireRequest {
            method: HttpMethod::GET,
            url: url.into(),
            headers: Vec::new(),
            body: WireBody::None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_and_cancel() {
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let actor = tokio::spawn(NetworkActor::new(Arc::new(SlowTransport), resp_tx).run(cmd_rx));

        cmd_tx
            .send(NetworkCommand::Execute { id: 1, tab_key: "GET:/slow".into(), request: request("http://x/slow") })
            .unwrap();
        cmd_tx
            .send(NetworkCommand::Execute { id: 2, tab_key: "GET:/fast".into(), request: request("http://x/fast") })
            .unwrap();

        let first = resp_rx.recv().await.unwrap();
        assert!(matches!(first, NetworkResponse::Completed { id: 2, ref response, .. } if response.status == 204));

        cmd_tx.send(NetworkCommand::Cancel(1)).unwrap();
        let second = resp_rx.recv().await.unwrap();
        assert_eq!(second.id(), 1);
        assert_eq!(second.tab_key(), "GET:/slow");
        assert!(matches!(second, NetworkResponse::Cancelled { .. }));

        cmd_tx.send(NetworkCommand::Shutdown).unwrap();
        actor.await.unwrap();
    }
}
