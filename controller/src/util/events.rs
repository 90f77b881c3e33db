//! Structured Kubernetes `Event`s surfaced alongside the plain-text status lines: a
//! `PortExhaustion` event when the Port Registry has nothing left to allocate, and an
//! `ErrResourceExists` event when a `GameServer`'s pod name collides with a pod this controller
//! does not own.

use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};

const REPORTER: &str = "fleet-controller";

fn recorder_for<K>(client: Client, object: &K) -> Recorder
where
    K: Resource<DynamicType = ()>,
{
    Recorder::new(client, Reporter::from(REPORTER.to_string()), object.object_ref(&()))
}

/// Raised from the Collection Reconciler when allocating a child's host ports fails because the
/// range is exhausted.
pub async fn port_exhaustion(client: Client, collection: &fleet_types::GameServerCollection) {
    let recorder = recorder_for(client, collection);
    let event = Event {
        type_: EventType::Warning,
        reason: "PortExhaustion".into(),
        note: Some("the host port range has no ports left to allocate for a new child".into()),
        action: "CreateChild".into(),
        secondary: None,
    };
    if let Err(e) = recorder.publish(&event).await {
        eprintln!("failed to publish PortExhaustion event: {e}");
    }
}

/// Raised from the Server Reconciler when the owned pod's name already exists but belongs to
/// someone else.
pub async fn resource_exists(client: Client, server: &fleet_types::GameServer) {
    let recorder = recorder_for(client, server);
    let event = Event {
        type_: EventType::Warning,
        reason: "ErrResourceExists".into(),
        note: Some(super::messages::POD_FOREIGN_OWNER.into()),
        action: "CreatePod".into(),
        secondary: None,
    };
    if let Err(e) = recorder.publish(&event).await {
        eprintln!("failed to publish ErrResourceExists event: {e}");
    }
}
