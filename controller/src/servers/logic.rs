//! Pure decision function for the Server Reconciler (§4.5): given the owned pod (if any) and the
//! `GameServer`'s own cached status, decide what to do.

use fleet_types::{GameServer, GameServerState, PodState};
use k8s_openapi::api::core::v1::Pod;

#[derive(Debug, PartialEq, Eq)]
pub enum ServerAction {
    CreatePod,
    /// A pod with this name exists but isn't owned by the expected `GameServer`.
    ForeignOwner,
    /// The pod terminated (`Succeeded`/`Failed`); delete it so the next pass recreates it.
    RecreatePod,
    Mirror {
        pod_state: PodState,
        game_server_state: GameServerState,
    },
    NoOp,
}

fn is_owned(pod: &Pod, server: &GameServer) -> bool {
    use kube::ResourceExt;
    let server_uid = server.uid();
    pod.metadata
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.kind == "GameServer" && Some(&r.uid) == server_uid.as_ref()))
}

pub fn determine_action(pod: Option<&Pod>, server: &GameServer) -> ServerAction {
    let Some(pod) = pod else {
        return ServerAction::CreatePod;
    };
    if !is_owned(pod, server) {
        return ServerAction::ForeignOwner;
    }

    let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
    let pod_state = PodState::from(phase);

    if matches!(pod_state, PodState::Succeeded | PodState::Failed) {
        return ServerAction::RecreatePod;
    }

    let current = server.status.as_ref();

    // A server marked for deletion by the Collection Reconciler keeps that state regardless of
    // what the pod reports; only podState is kept fresh so the drain rule sees up-to-date data.
    if current.is_some_and(|s| s.game_server_state == GameServerState::MarkedForDeletion) {
        return if current.unwrap().pod_state == pod_state {
            ServerAction::NoOp
        } else {
            ServerAction::Mirror {
                pod_state,
                game_server_state: GameServerState::MarkedForDeletion,
            }
        };
    }

    let game_server_state = match pod_state {
        PodState::Pending => GameServerState::Creating,
        PodState::Running => GameServerState::Running,
        PodState::Unknown => GameServerState::Failed,
        PodState::Succeeded | PodState::Failed => unreachable!("handled above"),
    };

    let unchanged = current.is_some_and(|s| {
        s.pod_state == pod_state && s.game_server_state == game_server_state
    });

    if unchanged {
        ServerAction::NoOp
    } else {
        ServerAction::Mirror {
            pod_state,
            game_server_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_types::{GameServerSpec, GameServerStatus};
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::api::ObjectMeta;

    fn server(status: Option<GameServerStatus>) -> GameServer {
        GameServer {
            metadata: ObjectMeta {
                name: Some("s1".into()),
                namespace: Some("default".into()),
                uid: Some("uid-1".into()),
                ..Default::default()
            },
            spec: GameServerSpec {
                ports: vec![],
                pod_template: Default::default(),
            },
            status,
        }
    }

    fn owned_pod(phase: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("s1".into()),
                namespace: Some("default".into()),
                owner_references: Some(vec![OwnerReference {
                    kind: "GameServer".into(),
                    uid: "uid-1".into(),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn missing_pod_creates() {
        let server = server(None);
        assert_eq!(determine_action(None, &server), ServerAction::CreatePod);
    }

    #[test]
    fn foreign_owned_pod_is_reported_not_recreated() {
        let server = server(None);
        let mut pod = owned_pod("Running");
        pod.metadata.owner_references.as_mut().unwrap()[0].uid = "someone-else".into();
        assert_eq!(determine_action(Some(&pod), &server), ServerAction::ForeignOwner);
    }

    #[test]
    fn pending_pod_mirrors_creating() {
        let server = server(None);
        let pod = owned_pod("Pending");
        assert_eq!(
            determine_action(Some(&pod), &server),
            ServerAction::Mirror {
                pod_state: PodState::Pending,
                game_server_state: GameServerState::Creating
            }
        );
    }

    #[test]
    fn running_pod_mirrors_running() {
        let server = server(None);
        let pod = owned_pod("Running");
        assert_eq!(
            determine_action(Some(&pod), &server),
            ServerAction::Mirror {
                pod_state: PodState::Running,
                game_server_state: GameServerState::Running
            }
        );
    }

    #[test]
    fn unchanged_status_is_a_noop() {
        let server = server(Some(GameServerStatus {
            game_server_state: GameServerState::Running,
            pod_state: PodState::Running,
            active_players: 3,
            last_updated: None,
        }));
        let pod = owned_pod("Running");
        assert_eq!(determine_action(Some(&pod), &server), ServerAction::NoOp);
    }

    #[test]
    fn terminated_pod_is_recreated() {
        let server = server(None);
        let pod = owned_pod("Succeeded");
        assert_eq!(determine_action(Some(&pod), &server), ServerAction::RecreatePod);
    }

    #[test]
    fn unknown_phase_mirrors_failed() {
        let server = server(None);
        let mut pod = owned_pod("Waffling");
        pod.status.as_mut().unwrap().phase = Some("Waffling".into());
        assert_eq!(
            determine_action(Some(&pod), &server),
            ServerAction::Mirror {
                pod_state: PodState::Unknown,
                game_server_state: GameServerState::Failed
            }
        );
    }

    #[test]
    fn marked_for_deletion_survives_a_running_pod() {
        let server = server(Some(GameServerStatus {
            game_server_state: GameServerState::MarkedForDeletion,
            pod_state: PodState::Pending,
            active_players: 0,
            last_updated: None,
        }));
        let pod = owned_pod("Running");
        assert_eq!(
            determine_action(Some(&pod), &server),
            ServerAction::Mirror {
                pod_state: PodState::Running,
                game_server_state: GameServerState::MarkedForDeletion
            }
        );
    }
}
