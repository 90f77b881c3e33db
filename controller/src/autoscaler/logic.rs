//! Pure decision functions for the Autoscaler Reconciler (§4.6): cooldown gate, health gate,
//! utilization, and the single-step scale decision. Kept free of any `kube::Client` so the
//! end-to-end scenarios in §8 (4-6) can run as plain unit tests.

use chrono::{DateTime, Utc};
use fleet_types::{AutoScalerSpec, GameServerCollection, GameServerState, PodState};
use std::time::Duration;

/// Parses an RFC 3339 timestamp, treating anything absent or unparseable as "never".
pub fn parse_last_scale_at(value: Option<&str>) -> DateTime<Utc> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn cooldown_elapsed(last_scale_at: DateTime<Utc>, now: DateTime<Utc>, cooldown: Duration) -> bool {
    let cooldown = chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX);
    now - last_scale_at >= cooldown
}

pub fn is_healthy(collection: &GameServerCollection) -> bool {
    collection.status.as_ref().is_some_and(|s| {
        s.game_server_collection_state == GameServerState::Running
            && s.pod_collection_state == PodState::Running
    })
}

/// Percentage utilization, `sum(activePlayers) / (replicas * maxPlayersPerServer)`. Zero replicas
/// or zero capacity-per-server is defined as 0% rather than dividing by zero.
pub fn utilization(total_players: u32, replicas: u32, max_players_per_server: u32) -> f64 {
    let capacity = replicas as f64 * max_players_per_server as f64;
    if capacity == 0.0 {
        0.0
    } else {
        (total_players as f64 / capacity) * 100.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ScaleDecision {
    ScaleOut(u32),
    ScaleIn(u32),
    NoOp,
}

pub fn decide(utilization: f64, replicas: u32, spec: &AutoScalerSpec) -> ScaleDecision {
    if utilization >= spec.scale_out_threshold && replicas < spec.max {
        ScaleDecision::ScaleOut(replicas + 1)
    } else if utilization <= spec.scale_in_threshold && replicas > spec.min {
        ScaleDecision::ScaleIn(replicas - 1)
    } else {
        ScaleDecision::NoOp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn spec(min: u32, max: u32, out: f64, inn: f64) -> AutoScalerSpec {
        AutoScalerSpec {
            enabled: true,
            min,
            max,
            scale_out_threshold: out,
            scale_in_threshold: inn,
            cooldown: "5m".to_string(),
            max_players_per_server: 10,
            last_scale_at: None,
        }
    }

    #[test]
    fn malformed_timestamp_is_never() {
        let parsed = parse_last_scale_at(Some("not-a-time"));
        assert_eq!(parsed, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn absent_timestamp_is_never() {
        assert_eq!(parse_last_scale_at(None), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn valid_timestamp_parses() {
        let ts = "2026-01-01T00:00:00Z";
        let parsed = parse_last_scale_at(Some(ts));
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn cooldown_blocks_recent_scale() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2026, 1, 1, 0, 4, 0).unwrap();
        assert!(!cooldown_elapsed(last, now, Duration::from_secs(300)));
    }

    #[test]
    fn cooldown_allows_after_elapsed() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 10, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2026, 1, 1, 0, 4, 0).unwrap();
        assert!(cooldown_elapsed(last, now, Duration::from_secs(300)));
    }

    #[test]
    fn utilization_basic() {
        assert_eq!(utilization(9, 1, 10), 90.0);
        assert_eq!(utilization(0, 0, 10), 0.0);
    }

    #[test]
    fn scale_out_end_to_end_scenario_4() {
        let s = spec(1, 5, 80.0, 60.0);
        let u = utilization(9, 1, 10);
        assert_eq!(decide(u, 1, &s), ScaleDecision::ScaleOut(2));
    }

    #[test]
    fn scale_in_below_threshold() {
        let s = spec(1, 5, 80.0, 60.0);
        let u = utilization(1, 2, 10); // 5%
        assert_eq!(decide(u, 2, &s), ScaleDecision::ScaleIn(1));
    }

    #[test]
    fn no_scale_out_past_max() {
        let s = spec(1, 2, 80.0, 60.0);
        let u = utilization(20, 2, 10);
        assert_eq!(decide(u, 2, &s), ScaleDecision::NoOp);
    }

    #[test]
    fn no_scale_in_below_min() {
        let s = spec(1, 5, 80.0, 60.0);
        let u = utilization(0, 1, 10);
        assert_eq!(decide(u, 1, &s), ScaleDecision::NoOp);
    }

    #[test]
    fn unhealthy_collection_is_not_healthy() {
        use fleet_types::{GameServerCollectionSpec, GameServerCollectionStatus};
        use kube::api::ObjectMeta;

        let collection = GameServerCollection {
            metadata: ObjectMeta::default(),
            spec: GameServerCollectionSpec::default(),
            status: Some(GameServerCollectionStatus {
                available_replicas: 0,
                game_server_collection_state: GameServerState::Creating,
                pod_collection_state: PodState::Pending,
                last_updated: None,
            }),
        };
        assert!(!is_healthy(&collection));
    }
}
