// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Watches the pods scheduled on this node and turns watch events into pod events.

use crate::error::CaptureError;
use crate::types::{DeletedPod, PodEvent, PodRef};
use futures::{stream, Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Stream of events for all pods on `node_name`, across namespaces.
/// Watch failures are logged and retried with backoff.
pub fn pod_events(client: Client, node_name: &str) -> impl Stream<Item = PodEvent> {
    let pods: Api<Pod> = Api::all(client);
    let config = watcher::Config::default().fields(&format!("spec.nodeName={node_name}"));
    let mut translator = PodEventTranslator::default();

    watcher(pods, config)
        .default_backoff()
        .filter_map(|res| async move {
            match res {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("{}", CaptureError::from(e));
                    None
                }
            }
        })
        .flat_map(move |event| stream::iter(translator.translate(event)))
}

/// Converts watcher events into pod events.
///
/// A relist replaces the whole view of the node. Pods known before the relist
/// but missing from it were deleted while the watch was down; they are
/// reported as tombstones carrying their last known state.
#[derive(Debug, Default)]
pub struct PodEventTranslator {
    known: BTreeMap<String, PodRef>,
    relisted: Option<HashSet<String>>,
}

impl PodEventTranslator {
    pub fn translate(&mut self, event: watcher::Event<Pod>) -> Vec<PodEvent> {
        match event {
            watcher::Event::Apply(pod) => self.applied(&pod).into_iter().collect(),
            watcher::Event::Delete(pod) => match PodRef::from_pod(&pod) {
                Some(pod) => {
                    self.known.remove(&pod.name);
                    vec![PodEvent::Deleted(DeletedPod::Live(pod))]
                }
                None => {
                    debug!("Skipping delete of pod without a name");
                    Vec::new()
                }
            },
            watcher::Event::Init => {
                debug!("Pod relist started");
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(pod) => {
                let event = self.applied(&pod);
                if let (Some(seen), Some(PodEvent::Applied(pod))) = (&mut self.relisted, &event) {
                    seen.insert(pod.name.clone());
                }
                event.into_iter().collect()
            }
            watcher::Event::InitDone => {
                let seen = self.relisted.take().unwrap_or_default();
                let gone: Vec<String> = self
                    .known
                    .keys()
                    .filter(|name| !seen.contains(*name))
                    .cloned()
                    .collect();

                info!(
                    "Pod relist complete: {} pods on node, {} gone",
                    seen.len(),
                    gone.len()
                );

                gone.into_iter()
                    .filter_map(|name| self.known.remove(&name))
                    .map(|pod| PodEvent::Deleted(DeletedPod::Tombstone(pod)))
                    .collect()
            }
        }
    }

    fn applied(&mut self, pod: &Pod) -> Option<PodEvent> {
        let Some(pod) = PodRef::from_pod(pod) else {
            debug!("Skipping pod without a name");
            return None;
        };
        self.known.insert(pod.name.clone(), pod.clone());
        Some(PodEvent::Applied(pod))
    }
}
