//! Pure decision functions for the Collection Reconciler (§4.4), split out from the I/O in
//! `actions.rs` so the decisions are testable without a Kubernetes API server.

use fleet_types::{GameServer, GameServerState, PodState};
use rand::Rng;
use rand::seq::SliceRandom;

/// What the reconciler should do to close the gap between `have` and `want` children.
#[derive(Debug, PartialEq, Eq)]
pub enum MembershipDecision {
    Create(u32),
    ScaleDown(u32),
    NoOp,
}

pub fn decide_membership(have: u32, want: u32) -> MembershipDecision {
    use std::cmp::Ordering::*;
    match have.cmp(&want) {
        Less => MembershipDecision::Create(want - have),
        Greater => MembershipDecision::ScaleDown(have - want),
        Equal => MembershipDecision::NoOp,
    }
}

/// Chooses `count` distinct indices into `children` by uniform random sampling without
/// replacement, per §4.4's scale-down tie-break.
pub fn choose_scale_down_targets(
    children: &[GameServer],
    count: u32,
    rng: &mut impl Rng,
) -> Vec<usize> {
    let count = (count as usize).min(children.len());
    let mut indices: Vec<usize> = (0..children.len()).collect();
    indices.shuffle(rng);
    indices.truncate(count);
    indices
}

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// A 5-character lowercase-alphanumeric suffix appended to generated child names.
pub fn random_suffix(rng: &mut impl Rng) -> String {
    (0..5)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

pub fn child_name(collection_name: &str, rng: &mut impl Rng) -> String {
    format!("{collection_name}-{}", random_suffix(rng))
}

/// Recomputed status rollup (§4.4, tail of `sync`). `gameServerCollectionState`/
/// `podCollectionState` surface the first non-`Running` child's state, by list order, or
/// `Running` if every child is.
pub struct StatusRollup {
    pub available_replicas: u32,
    pub collection_state: GameServerState,
    pub pod_state: PodState,
}

pub fn compute_status(children: &[GameServer]) -> StatusRollup {
    let available_replicas = children
        .iter()
        .filter(|c| {
            let status = c.status.as_ref();
            status.is_some_and(|s| {
                s.game_server_state == GameServerState::Running && s.pod_state == PodState::Running
            })
        })
        .count() as u32;

    let collection_state = children
        .iter()
        .find_map(|c| {
            let state = c.status.as_ref()?.game_server_state;
            (state != GameServerState::Running).then_some(state)
        })
        .unwrap_or(GameServerState::Running);

    let pod_state = children
        .iter()
        .find_map(|c| {
            let state = c.status.as_ref()?.pod_state;
            (state != PodState::Running).then_some(state)
        })
        .unwrap_or(PodState::Running);

    StatusRollup {
        available_replicas,
        collection_state,
        pod_state,
    }
}

/// The drain discipline (§3, §9 open question): a `MarkedForDeletion` child with no players left
/// is ready to be deleted outright. Placed in the Collection Reconciler's post-pass because it
/// already holds the full, freshly-listed child set each cycle.
pub fn drainable<'a>(children: &'a [GameServer]) -> impl Iterator<Item = &'a GameServer> {
    children.iter().filter(|c| {
        c.status.as_ref().is_some_and(|s| {
            s.game_server_state == GameServerState::MarkedForDeletion && s.active_players == 0
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_types::{GameServerSpec, GameServerStatus};
    use k8s_openapi::api::core::v1::PodTemplateSpec;
    use kube::api::ObjectMeta;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn server(name: &str, state: GameServerState, pod_state: PodState, players: u32) -> GameServer {
        GameServer {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: GameServerSpec {
                ports: vec![],
                pod_template: PodTemplateSpec::default(),
            },
            status: Some(GameServerStatus {
                game_server_state: state,
                pod_state,
                active_players: players,
                last_updated: None,
            }),
        }
    }

    #[test]
    fn membership_decision_create_scale_down_noop() {
        assert_eq!(decide_membership(0, 3), MembershipDecision::Create(3));
        assert_eq!(decide_membership(3, 1), MembershipDecision::ScaleDown(2));
        assert_eq!(decide_membership(2, 2), MembershipDecision::NoOp);
    }

    #[test]
    fn scale_down_targets_are_distinct_and_bounded() {
        let children: Vec<GameServer> = (0..5)
            .map(|i| server(&format!("c-{i}"), GameServerState::Running, PodState::Running, 0))
            .collect();
        let mut rng = StdRng::seed_from_u64(7);
        let targets = choose_scale_down_targets(&children, 3, &mut rng);
        assert_eq!(targets.len(), 3);
        let unique: std::collections::HashSet<_> = targets.iter().collect();
        assert_eq!(unique.len(), 3);
        assert!(targets.iter().all(|&i| i < children.len()));
    }

    #[test]
    fn scale_down_count_clamped_to_population() {
        let children: Vec<GameServer> = (0..2)
            .map(|i| server(&format!("c-{i}"), GameServerState::Running, PodState::Running, 0))
            .collect();
        let mut rng = StdRng::seed_from_u64(1);
        let targets = choose_scale_down_targets(&children, 10, &mut rng);
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn status_rollup_all_running_is_available() {
        let children = vec![
            server("a", GameServerState::Running, PodState::Running, 0),
            server("b", GameServerState::Running, PodState::Running, 2),
        ];
        let rollup = compute_status(&children);
        assert_eq!(rollup.available_replicas, 2);
        assert_eq!(rollup.collection_state, GameServerState::Running);
        assert_eq!(rollup.pod_state, PodState::Running);
    }

    #[test]
    fn status_rollup_surfaces_first_non_running_state() {
        let children = vec![
            server("a", GameServerState::Creating, PodState::Pending, 0),
            server("b", GameServerState::Running, PodState::Running, 0),
        ];
        let rollup = compute_status(&children);
        assert_eq!(rollup.available_replicas, 0);
        assert_eq!(rollup.collection_state, GameServerState::Creating);
        assert_eq!(rollup.pod_state, PodState::Pending);
    }

    #[test]
    fn availability_requires_both_server_and_pod_running() {
        let children = vec![server("a", GameServerState::Running, PodState::Pending, 0)];
        let rollup = compute_status(&children);
        assert_eq!(rollup.available_replicas, 0);
    }

    #[test]
    fn drainable_only_yields_marked_for_deletion_with_zero_players() {
        let children = vec![
            server("a", GameServerState::MarkedForDeletion, PodState::Running, 2),
            server("b", GameServerState::MarkedForDeletion, PodState::Running, 0),
            server("c", GameServerState::Running, PodState::Running, 0),
        ];
        let names: Vec<&str> = drainable(&children).map(|c| c.metadata.name.as_deref().unwrap()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn random_suffix_is_five_lowercase_alphanumeric_chars() {
        let mut rng = StdRng::seed_from_u64(42);
        let suffix = random_suffix(&mut rng);
        assert_eq!(suffix.len(), 5);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
