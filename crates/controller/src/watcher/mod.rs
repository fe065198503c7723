//! Feeding the role registry from the pods running in the cluster.
//!
//! [`PodWatcher`] turns pod watch events into [`RoleEvent`]s on a bounded
//! queue and [`RoleEventConsumer`] applies them to a [`RoleStore`]. A full
//! queue blocks the watcher until the consumer catches up.

mod error;

use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    Api,
    runtime::{WatchStreamExt, watcher},
};
use tokio::sync::mpsc;

pub use self::error::Error;
use crate::{
    ext::PodExt,
    registry::{Consumer, RoleStore},
};

/// A change in the roles wanted by pods.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RoleEvent {
    Desired(Consumer),
    Undesired(Consumer),
    /// The complete set of consumers after a (re)list.
    Resync(Vec<Consumer>),
}

/// Creates the queue between a [`PodWatcher`] and a [`RoleEventConsumer`].
#[must_use]
pub fn role_event_queue(capacity: usize) -> (mpsc::Sender<RoleEvent>, mpsc::Receiver<RoleEvent>) {
    mpsc::channel(capacity.max(1))
}

/// The consumer `pod` represents, if it asks for a role.
fn consumer_of(pod: &Pod) -> Option<Consumer> {
    let role = pod.iam_role()?;
    let namespace = pod.metadata.namespace.as_deref()?;
    let name = pod.metadata.name.as_deref()?;
    Some(Consumer::new(role, namespace, name))
}

/// Translates a watch event. Pods seen while (re)listing are collected in
/// `relisted` and released as one [`RoleEvent::Resync`] once the list is
/// complete.
fn role_event(event: watcher::Event<Pod>, relisted: &mut Vec<Consumer>) -> Option<RoleEvent> {
    match event {
        watcher::Event::Init => {
            relisted.clear();
            None
        }
        watcher::Event::InitApply(pod) => {
            relisted.extend(consumer_of(&pod));
            None
        }
        watcher::Event::InitDone => Some(RoleEvent::Resync(std::mem::take(relisted))),
        watcher::Event::Apply(pod) => consumer_of(&pod).map(RoleEvent::Desired),
        watcher::Event::Delete(pod) => consumer_of(&pod).map(RoleEvent::Undesired),
    }
}

/// Watches pods and reports the roles they ask for.
pub struct PodWatcher {
    api: Api<Pod>,
    sender: mpsc::Sender<RoleEvent>,
}

impl PodWatcher {
    /// Watches pods in `namespace`, or in every namespace when `None`.
    #[must_use]
    pub fn new(
        client: kube::Client,
        namespace: Option<&str>,
        sender: mpsc::Sender<RoleEvent>,
    ) -> Self {
        let api = namespace.map_or_else(
            || Api::all(client.clone()),
            |namespace| Api::namespaced(client.clone(), namespace),
        );
        Self { api, sender }
    }

    /// Runs until `shutdown_signal` resolves. Watch errors are retried with
    /// backoff.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventQueueClosed`] if the consumer went away.
    pub async fn run(self, shutdown_signal: impl Future<Output = ()> + Unpin) -> Result<(), Error> {
        let Self { api, sender } = self;

        let stream = watcher(api, watcher::Config::default()).default_backoff();
        let mut stream = std::pin::pin!(stream);
        let mut shutdown_signal = shutdown_signal.into_stream();
        let mut relisted = Vec::new();

        loop {
            let event = tokio::select! {
                _ = shutdown_signal.next() => break,
                event = stream.next() => event,
            };

            let event = match event {
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    tracing::warn!("Pod watch failed, retrying, error: {err}");
                    continue;
                }
                None => break,
            };

            let Some(role_event) = role_event(event, &mut relisted) else {
                continue;
            };

            tokio::select! {
                _ = shutdown_signal.next() => break,
                sent = sender.send(role_event) => {
                    if sent.is_err() {
                        return Err(Error::EventQueueClosed);
                    }
                }
            }
        }

        tracing::info!("Pod watcher stopped");
        Ok(())
    }
}

/// Applies [`RoleEvent`]s to a [`RoleStore`].
pub struct RoleEventConsumer {
    roles: Arc<RoleStore>,
    receiver: mpsc::Receiver<RoleEvent>,
}

impl RoleEventConsumer {
    #[must_use]
    pub const fn new(roles: Arc<RoleStore>, receiver: mpsc::Receiver<RoleEvent>) -> Self {
        Self { roles, receiver }
    }

    /// Runs until `shutdown_signal` resolves or every sender is gone. Events
    /// still queued at shutdown are dropped.
    pub async fn run(self, shutdown_signal: impl Future<Output = ()> + Unpin) {
        let Self { roles, mut receiver } = self;
        let mut shutdown_signal = shutdown_signal.into_stream();

        loop {
            let event = tokio::select! {
                _ = shutdown_signal.next() => break,
                event = receiver.recv() => event,
            };
            let Some(event) = event else {
                break;
            };
            apply(&roles, event);
        }

        tracing::info!("Role event consumer stopped");
    }
}

fn apply(roles: &RoleStore, event: RoleEvent) {
    match event {
        RoleEvent::Desired(consumer) => {
            tracing::debug!(
                role = %consumer.role,
                namespace = %consumer.namespace,
                pod = %consumer.name,
                "Pod wants role"
            );
            roles.add(&consumer);
        }
        RoleEvent::Undesired(consumer) => {
            tracing::debug!(
                role = %consumer.role,
                namespace = %consumer.namespace,
                pod = %consumer.name,
                "Pod no longer wants role"
            );
            roles.remove(&consumer);
        }
        RoleEvent::Resync(consumers) => {
            tracing::info!(consumers = consumers.len(), "Resynced pod roles");
            roles.replace(&consumers);
        }
    }
}
