//! Feeds pod network namespaces from container lifecycle events to the driver

use std::sync::Arc;

use async_trait::async_trait;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::types::network_namespace;
use super::types::LifecycleEvent;

/// Receives namespace discoveries from the observer.
#[async_trait]
pub trait PodNetworkHandler: Send + Sync {
    /// The pod's network namespace is known.
    async fn pod_network_ready(&self, pod_uid: &str, netns: &str);

    /// The pod's sandbox is stopping or gone.
    async fn pod_network_gone(&self, pod_uid: &str);
}

/// Sending half handed to the runtime integration. Never blocks.
#[derive(Debug, Clone)]
pub struct LifecycleEventSender {
    inner: mpsc::UnboundedSender<LifecycleEvent>,
}

impl LifecycleEventSender {
    /// Queue an event; returns `false` once the observer has stopped.
    pub fn send(&self, event: LifecycleEvent) -> bool {
        self.inner.send(event).is_ok()
    }
}

pub struct LifecycleObserver<H> {
    handler: Arc<H>,
    events: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl<H: PodNetworkHandler> LifecycleObserver<H> {
    pub fn new(handler: Arc<H>) -> (Self, LifecycleEventSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                handler,
                events: rx,
            },
            LifecycleEventSender { inner: tx },
        )
    }

    #[tracing::instrument(skip_all)]
    pub async fn run(mut self, cancellation_token: CancellationToken) {
        info!("Starting container lifecycle observer");

        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Container lifecycle observer shutdown requested");
                    break;
                }
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle(event).await,
                        None => {
                            warn!("Lifecycle event channel closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle(&self, event: LifecycleEvent) {
        let pod = event.pod();
        if pod.uid.is_empty() {
            return;
        }

        if event.is_teardown() {
            self.handler.pod_network_gone(&pod.uid).await;
            return;
        }

        let netns = network_namespace(pod);
        if netns.is_empty() {
            // Host-network pod or namespace not created yet; a later event retries.
            debug!(pod_uid = %pod.uid, "No network namespace in lifecycle event");
            return;
        }
        self.handler.pod_network_ready(&pod.uid, &netns).await;
    }
}
