//! Control loop - the single task that consumes the source's event sequence
//!
//! Each iteration services exactly one of: an inbound event, the close
//! signal, the keepalive timer or an interval change. The keepalive timer
//! is rearmed from scratch after every iteration, so it only fires after a
//! full interval without any other activity.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use contracts::{NotificationSource, SourceEvent};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::metrics::DispatcherMetrics;
use crate::registry::{lock, DispatcherState, SharedRegistry};

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShutdownReason {
    /// `close()` was called; the caller closes the source
    Requested,
    /// The inbound event sequence ended
    SourceEnded,
    /// Every dispatcher handle was dropped without `close()`
    Abandoned,
}

/// Everything the loop needs apart from the things it waits on
pub(crate) struct ControlLoop<S> {
    registry: SharedRegistry,
    source: Arc<S>,
    metrics: Arc<DispatcherMetrics>,
}

/// Receivers the loop waits on
pub(crate) struct LoopInputs {
    pub(crate) events: mpsc::Receiver<SourceEvent>,
    pub(crate) close_rx: oneshot::Receiver<()>,
    pub(crate) interval_rx: watch::Receiver<Option<Duration>>,
}

impl<S> ControlLoop<S>
where
    S: NotificationSource + Sync + 'static,
{
    pub(crate) fn new(
        registry: SharedRegistry,
        source: Arc<S>,
        metrics: Arc<DispatcherMetrics>,
    ) -> Self {
        Self {
            registry,
            source,
            metrics,
        }
    }

    /// Run until closed, abandoned or the event sequence ends
    #[instrument(name = "dispatcher_control_loop", skip_all)]
    pub(crate) async fn run(self, inputs: LoopInputs) -> ShutdownReason {
        let LoopInputs {
            mut events,
            mut close_rx,
            mut interval_rx,
        } = inputs;
        let mut interval = *interval_rx.borrow_and_update();

        info!(keepalive = ?interval, "Dispatcher loop started");

        let reason = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break ShutdownReason::SourceEnded,
                },
                signal = &mut close_rx => {
                    break match signal {
                        Ok(()) => ShutdownReason::Requested,
                        Err(_) => ShutdownReason::Abandoned,
                    };
                }
                () = keepalive_timer(interval) => self.on_keepalive(),
                Ok(()) = interval_rx.changed() => {
                    interval = *interval_rx.borrow_and_update();
                    debug!(keepalive = ?interval, "Keepalive interval changed");
                }
            }
        };

        self.shutdown(reason).await
    }

    fn dispatch(&self, event: SourceEvent) {
        let registry = lock(&self.registry);
        match event {
            SourceEvent::Notification(notification) => {
                registry.notify(notification, &self.metrics);
            }
            SourceEvent::Resync => {
                let fanout = registry.broadcast(&self.metrics);
                debug!(channels = fanout, "Resync broadcast");
            }
        }
    }

    fn on_keepalive(&self) {
        self.metrics.inc_keepalive_count();
        observability::record_keepalive_fired();

        // A hanging probe must never hold up delivery
        let source = Arc::clone(&self.source);
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            match source.probe().await {
                Ok(()) => observability::record_probe_result(true),
                Err(e) => {
                    metrics.inc_probe_failure_count();
                    observability::record_probe_result(false);
                    warn!(error = %e, "Keepalive probe failed");
                }
            }
        });

        let registry = lock(&self.registry);
        if registry.broadcast_on_timeout() {
            let fanout = registry.broadcast(&self.metrics);
            debug!(channels = fanout, "Keepalive broadcast");
        }
    }

    async fn shutdown(&self, reason: ShutdownReason) -> ShutdownReason {
        let (closed, close_requested) = {
            let mut registry = lock(&self.registry);
            // `close()` moves the state to CLOSING before signalling
            let close_requested = registry.state() != DispatcherState::Open;
            let closed = registry.drain();
            self.metrics.set_registered(0);
            (closed, close_requested)
        };
        info!(?reason, channels = closed, "Dispatcher channels closed");

        // `close()` closes the source itself once it sees the loop finish
        if reason == ShutdownReason::Requested || close_requested {
            return ShutdownReason::Requested;
        }

        if let Err(e) = self.source.close().await {
            warn!(error = %e, "Source close failed during loop shutdown");
        }
        lock(&self.registry).set_state(DispatcherState::Closed);
        info!("Dispatcher closed");
        reason
    }
}

/// Sleep for the interval, or forever when keepalive is off
async fn keepalive_timer(interval: Option<Duration>) {
    match interval {
        Some(interval) => sleep(interval).await,
        None => pending().await,
    }
}
