// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pod reconciler - converges capture state to each pod's capture annotation.

use crate::capture::CaptureManager;
use crate::types::{DeletedPod, DesiredIntent, PodEvent, PodRef};
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// What a single event asks of the capture manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    Start { max_files: u32 },
    Stop,
    Converged,
}

/// Decide the manager call for a pod given its intent and whether it is already captured.
/// Only presence matters for a running capture: a changed file count does not restart it.
pub fn plan(intent: DesiredIntent, capturing: bool) -> Convergence {
    match (intent, capturing) {
        (DesiredIntent::Present { max_files }, false) => Convergence::Start { max_files },
        (DesiredIntent::Absent, true) => Convergence::Stop,
        _ => Convergence::Converged,
    }
}

pub struct PodReconciler {
    manager: Arc<CaptureManager>,
    /// Last seen state of every pod, only used to re-evaluate pods whose capture died
    known: RwLock<HashMap<String, PodRef>>,
    liveness_interval: Option<Duration>,
}

impl PodReconciler {
    pub fn new(manager: Arc<CaptureManager>, liveness_interval: Option<Duration>) -> Self {
        Self {
            manager,
            known: RwLock::new(HashMap::new()),
            liveness_interval,
        }
    }

    /// Process pod events and liveness sweeps until `shutdown` resolves or the
    /// event stream ends. Captures are left running; stopping them is up to the caller.
    pub async fn run<S, F>(&self, events: S, shutdown: F)
    where
        S: Stream<Item = PodEvent>,
        F: Future<Output = ()>,
    {
        let mut events = pin!(events);
        let mut shutdown = pin!(shutdown);
        let mut sweep = self.liveness_interval.map(|period| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        info!("Pod reconciler started, watching pods");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested, pod reconciler stopping");
                    break;
                }
                event = events.next() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        warn!("Pod event stream ended");
                        break;
                    }
                },
                _ = next_tick(&mut sweep) => self.sweep().await,
            }
        }
    }

    pub async fn handle(&self, event: PodEvent) {
        match event {
            PodEvent::Applied(pod) => {
                self.apply(&pod).await;
            }
            PodEvent::Deleted(deleted) => {
                self.delete(deleted).await;
            }
        }
    }

    /// Pod created or updated
    #[instrument(skip(self, pod), fields(pod = %pod.name, namespace = %pod.namespace))]
    pub async fn apply(&self, pod: &PodRef) -> Convergence {
        self.known
            .write()
            .await
            .insert(pod.name.clone(), pod.clone());

        let capturing = self.manager.is_capturing(&pod.name).await;
        let action = plan(pod.intent(), capturing);

        match action {
            Convergence::Start { max_files } => {
                info!(max_files, "Starting capture");
                self.manager.start_capture(&pod.name, max_files).await;
            }
            Convergence::Stop => {
                info!("Annotation removed, stopping capture");
                self.manager.stop_capture(&pod.name).await;
            }
            Convergence::Converged => debug!(capturing, "Already converged"),
        }

        action
    }

    /// Pod deleted. Stops the capture whatever the last known annotations were.
    #[instrument(skip(self, deleted), fields(pod = %deleted.pod().name, namespace = %deleted.pod().namespace))]
    pub async fn delete(&self, deleted: DeletedPod) -> Convergence {
        let pod = deleted.pod();
        self.known.write().await.remove(&pod.name);

        if !self.manager.is_capturing(&pod.name).await {
            return Convergence::Converged;
        }

        match &deleted {
            DeletedPod::Live(_) => info!("Pod deleted, stopping capture"),
            DeletedPod::Tombstone(_) => info!("Pod deleted while unobserved, stopping capture"),
        }
        self.manager.stop_capture(&pod.name).await;
        Convergence::Stop
    }

    /// Drop captures whose process died and start them again for pods that still ask for one.
    pub async fn sweep(&self) {
        for key in self.manager.reap_exited().await {
            let pod = self.known.read().await.get(&key).cloned();
            match pod {
                Some(pod) => {
                    self.apply(&pod).await;
                }
                None => debug!(pod = %key, "No known state for exited capture, not restarting"),
            }
        }
    }
}

async fn next_tick(sweep: &mut Option<Interval>) {
    match sweep {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
