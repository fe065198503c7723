//! Kubernetes events on declaring objects.
//!
//! Recording is fire-and-forget: a failed event is logged and never fails a
//! reconcile.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, Recorder, Reporter};

pub use kube::runtime::events::EventType;

/// Publishes events about an object.
pub trait EventRecorder {
    async fn record(&self, subject: &ObjectReference, type_: EventType, reason: &str, note: String);
}

/// [`EventRecorder`] writing `events.k8s.io` events.
#[derive(Clone)]
pub struct KubeRecorder {
    recorder: Recorder,
}

impl KubeRecorder {
    /// Creates a recorder reporting as `controller`.
    #[must_use]
    pub fn new(client: kube::Client, controller: &str) -> Self {
        let reporter = Reporter { controller: controller.to_string(), instance: None };
        Self { recorder: Recorder::new(client, reporter) }
    }
}

impl EventRecorder for KubeRecorder {
    async fn record(&self, subject: &ObjectReference, type_: EventType, reason: &str, note: String) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: reason.to_string(),
            secondary: None,
        };
        if let Err(err) = self.recorder.publish(&event, subject).await {
            tracing::warn!(
                reason,
                object = subject.name.as_deref(),
                "Failed to publish event, error: {err}"
            );
        }
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`.
pub mod reasons {
    pub const GET_CREDENTIALS_FAILED: &str = "GetCredentialsFailed";
    pub const CREATE_SECRET_FAILED: &str = "CreateSecretFailed";
    pub const UPDATE_SECRET_FAILED: &str = "UpdateSecretFailed";
    pub const CREATE_CREDENTIALS: &str = "CreateCredentials";
    pub const UPDATE_CREDENTIALS: &str = "UpdateCredentials";
}
