//! I/O side of the Collection Reconciler (§4.4): everything that touches the Kubernetes API.
//! Kept apart from `logic.rs` so the decisions stay testable without a live cluster.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{
    Api, Client, ResourceExt,
    api::{ObjectMeta, Patch, PatchParams, PostParams},
};
use owo_colors::OwoColorize;
use serde_json::json;

use crate::ports::PortRegistry;
use crate::util::colors::{FG1, FG2};
use crate::util::patch::patch_status;
use crate::util::{Error, events, messages};
use fleet_types::{
    COLLECTION_LABEL, GameServer, GameServerCollection, GameServerSpec, GameServerState,
    GameServerStatus, PortMapping,
};

const FIELD_MANAGER: &str = "fleet-controller";

/// Builds and creates one child `GameServer` owned by `collection`, allocating one host port per
/// port template entry. On any allocation failure, ports already taken in this call for earlier
/// templates are released before returning — the caller does not need to track partial state.
pub async fn create_child(
    client: Client,
    api: &Api<GameServer>,
    ports: &PortRegistry,
    collection: &GameServerCollection,
    child_name: &str,
) -> Result<(), Error> {
    let mut allocated = Vec::with_capacity(collection.spec.ports.len());
    for template in &collection.spec.ports {
        match ports.allocate(child_name) {
            Ok(port) => allocated.push(PortMapping {
                name: template.name.clone(),
                container_port: template.container_port,
                protocol: template.protocol,
                host_port: port,
            }),
            Err(e) => {
                ports.release(child_name);
                events::port_exhaustion(client, collection).await;
                return Err(e);
            }
        }
    }

    let owner_ref = OwnerReference {
        api_version: "fleet.gameservers.io/v1".to_string(),
        kind: "GameServerCollection".to_string(),
        name: collection.name_any(),
        uid: collection.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    };

    let server = GameServer {
        metadata: ObjectMeta {
            name: Some(child_name.to_string()),
            namespace: collection.namespace(),
            owner_references: Some(vec![owner_ref]),
            labels: Some(
                [(COLLECTION_LABEL.to_string(), collection.name_any())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        },
        spec: GameServerSpec {
            ports: allocated,
            pod_template: collection.spec.pod_template.clone(),
        },
        status: Some(GameServerStatus {
            game_server_state: GameServerState::Creating,
            ..Default::default()
        }),
    };

    api.create(&PostParams::default(), &server).await?;
    println!(
        "  {} created child {}",
        "+".color(FG2),
        child_name.color(FG1)
    );
    Ok(())
}

/// Clears the ownerRef and collection label, and separately sets `MarkedForDeletion`, per §4.4's
/// scale-down branch. Two requests (metadata is not part of the status subresource) but one
/// logical step — the reconciler always performs both before moving on.
pub async fn mark_for_deletion(
    client: Client,
    server_api: &Api<GameServer>,
    server: &GameServer,
) -> Result<(), Error> {
    let namespace = server
        .namespace()
        .ok_or_else(|| Error::UserInput("GameServer must be namespaced".into()))?;
    let name = server.name_any();

    let body = json!({
        "metadata": {
            "ownerReferences": null,
            "labels": { COLLECTION_LABEL: null }
        }
    });
    server_api
        .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(body))
        .await?;

    patch_status(
        client,
        server,
        |s: &GameServer| s.status.clone(),
        |status: &mut GameServerStatus| {
            status.game_server_state = GameServerState::MarkedForDeletion;
        },
    )
    .await?;

    println!(
        "  {} {} {}",
        "-".color(FG2),
        name.color(FG1),
        messages::TERMINATING
    );
    Ok(())
}

/// Deletes a drained (`MarkedForDeletion`, zero players) child outright.
pub async fn delete_drained(api: &Api<GameServer>, server: &GameServer) -> Result<(), Error> {
    let name = server.name_any();
    api.delete(&name, &Default::default()).await?;
    println!("  {} deleted drained {}", "x".color(FG2), name.color(FG1));
    Ok(())
}

/// Writes the recomputed rollup to `status`, skipped entirely by the caller when it is unchanged
/// from the cached value (the idempotence property in §8).
pub async fn write_status(
    client: Client,
    collection: &GameServerCollection,
    rollup: &crate::collections::logic::StatusRollup,
) -> Result<(), Error> {
    patch_status(
        client,
        collection,
        |c: &GameServerCollection| c.status.clone(),
        |status| {
            status.available_replicas = rollup.available_replicas;
            status.game_server_collection_state = rollup.collection_state;
            status.pod_collection_state = rollup.pod_state;
            status.last_updated = Some(chrono::Utc::now().to_rfc3339());
        },
    )
    .await
}
