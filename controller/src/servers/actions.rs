//! I/O side of the Server Reconciler (§4.5): the pod builder plus the status-patch helpers
//! `determine_action`'s decisions map onto.

use k8s_openapi::api::core::v1::{ContainerPort, Pod};
use kube::{
    Api, Client, Resource, ResourceExt,
    api::{ObjectMeta, PostParams},
};
use owo_colors::OwoColorize;

use crate::util::colors::{FG1, FG2};
use crate::util::patch::patch_status;
use crate::util::{Error, events, messages};
use fleet_types::{GameServer, GameServerState, GameServerStatus, PodState};

/// Builds the owned pod from the server's inherited template, overlaying a `ContainerPort` per
/// port mapping (with `hostPort` set to the port the registry already allocated) onto the
/// template's first container — `pod_template` is otherwise opaque to this crate.
fn server_pod(server: &GameServer) -> Pod {
    let mut spec = server.spec.pod_template.spec.clone().unwrap_or_default();
    let ports: Vec<ContainerPort> = server
        .spec
        .ports
        .iter()
        .map(|p| ContainerPort {
            name: Some(p.name.clone()),
            container_port: p.container_port,
            host_port: Some(p.host_port as i32),
            protocol: Some(p.protocol.to_string()),
            ..Default::default()
        })
        .collect();
    if let Some(container) = spec.containers.first_mut() {
        container.ports = Some(ports);
    }

    Pod {
        metadata: ObjectMeta {
            name: server.meta().name.clone(),
            namespace: server.meta().namespace.clone(),
            owner_references: Some(vec![server.controller_owner_ref(&()).expect("namespaced GameServer")]),
            ..Default::default()
        },
        spec: Some(spec),
        status: None,
    }
}

pub async fn create_pod(client: Client, server: &GameServer) -> Result<(), Error> {
    let namespace = server
        .namespace()
        .ok_or_else(|| Error::UserInput("GameServer must be namespaced".into()))?;
    let pod = server_pod(server);
    let pods: Api<Pod> = Api::namespaced(client.clone(), &namespace);
    pods.create(&PostParams::default(), &pod).await?;
    println!(
        "  {} created pod for {}",
        "+".color(FG2),
        server.name_any().color(FG1)
    );
    Ok(())
}

pub async fn recreate_pod(client: Client, server: &GameServer) -> Result<(), Error> {
    let namespace = server
        .namespace()
        .ok_or_else(|| Error::UserInput("GameServer must be namespaced".into()))?;
    let pods: Api<Pod> = Api::namespaced(client, &namespace);
    pods.delete(&server.name_any(), &Default::default()).await?;
    println!(
        "  {} recreating pod for {}",
        "~".color(FG2),
        server.name_any().color(FG1)
    );
    Ok(())
}

/// Reports a pod-name collision with a pod this controller does not own: surfaces a Kubernetes
/// `ErrResourceExists` event on `server` and returns the corresponding typed error so the caller's
/// work queue backs off and retries rather than treating this as a one-shot no-op.
pub async fn report_foreign_owner(client: Client, server: &GameServer) -> Result<(), Error> {
    eprintln!(
        "{} {}: {}",
        "error".red(),
        server.name_any(),
        messages::POD_FOREIGN_OWNER
    );
    events::resource_exists(client, server).await;
    Err(Error::ResourceExists(server.name_any()))
}

pub async fn mirror_status(
    client: Client,
    server: &GameServer,
    pod_state: PodState,
    game_server_state: GameServerState,
) -> Result<(), Error> {
    patch_status(
        client,
        server,
        |s: &GameServer| s.status.clone(),
        |status: &mut GameServerStatus| {
            status.pod_state = pod_state;
            status.game_server_state = game_server_state;
        },
    )
    .await
}
