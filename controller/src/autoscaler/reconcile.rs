//! Drives the Autoscaler Reconciler's `sync(key)` (§4.6). Unlike the Collection/Server
//! reconcilers, this one polls: after every run (whether or not it scaled) it nudges the shared
//! queue to re-visit the same key after [`POLL_INTERVAL`], since the signal it reacts to
//! (`status.activePlayers`) is written by an external caller and does not itself produce a watch
//! event on this reconciler's own writes.

use chrono::Utc;
use kube::{
    Client,
    runtime::reflector::{ObjectRef, Store},
};
use owo_colors::OwoColorize;
use std::sync::Arc;
use tokio::time::Duration;

use crate::autoscaler::logic::{self, ScaleDecision};
use crate::skeleton::Skeleton;
use crate::util::colors::FG2;
use crate::util::Error;
#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;
use fleet_types::{GameServer, GameServerCollection};

pub const POLL_INTERVAL: Duration = Duration::from_secs(15);

pub struct AutoscalerContext {
    pub client: Client,
    pub collections: Store<GameServerCollection>,
    pub children: Store<GameServer>,
    pub skeleton: Arc<Skeleton>,
    #[cfg(feature = "metrics")]
    pub metrics: ControllerMetrics,
}

fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('/')
}

pub async fn sync(key: String, ctx: Arc<AutoscalerContext>) -> Result<(), Error> {
    let (namespace, name) = split_key(&key)
        .ok_or_else(|| Error::UserInput(format!("malformed reconciliation key: {key}")))?;

    let collection_ref = ObjectRef::new(name).within(namespace);
    let Some(collection) = ctx.collections.get(&collection_ref) else {
        return Ok(());
    };

    #[cfg(feature = "metrics")]
    ctx.metrics
        .reconcile_counter
        .with_label_values(&[name, namespace])
        .inc();

    // Always re-visit: unconditional at the very top so a transient error below doesn't stop
    // the poll.
    schedule_next(&ctx, &key);

    #[cfg(feature = "metrics")]
    let decide_timer = ctx
        .metrics
        .read_histogram
        .with_label_values(&[name, namespace, "utilization"])
        .start_timer();

    let Some(spec) = collection.spec.auto_scaler.clone() else {
        return Ok(());
    };
    if !spec.enabled {
        return Ok(());
    }
    if !logic::is_healthy(&collection) {
        return Ok(());
    }

    let cooldown = parse_duration::parse(&spec.cooldown)?;
    let last_scale_at = logic::parse_last_scale_at(spec.last_scale_at.as_deref());
    let now = Utc::now();
    if !logic::cooldown_elapsed(last_scale_at, now, cooldown) {
        return Ok(());
    }

    let total_players: u32 = ctx
        .children
        .state()
        .into_iter()
        .filter(|c| {
            use kube::ResourceExt;
            c.namespace().as_deref() == Some(namespace)
                && c.labels().get(fleet_types::COLLECTION_LABEL).map(String::as_str) == Some(name)
        })
        .filter_map(|c| c.status.map(|s| s.active_players))
        .sum();

    let replicas = collection.spec.replicas;
    let u = logic::utilization(total_players, replicas, spec.max_players_per_server);
    let decision = logic::decide(u, replicas, &spec);

    #[cfg(feature = "metrics")]
    decide_timer.observe_duration();

    let action_label = match decision {
        ScaleDecision::ScaleOut(_) => "scale_out",
        ScaleDecision::ScaleIn(_) => "scale_in",
        ScaleDecision::NoOp => "noop",
    };
    #[cfg(feature = "metrics")]
    ctx.metrics
        .action_counter
        .with_label_values(&[name, namespace, action_label])
        .inc();

    let new_replicas = match decision {
        ScaleDecision::ScaleOut(r) | ScaleDecision::ScaleIn(r) => r,
        ScaleDecision::NoOp => return Ok(()),
    };

    #[cfg(feature = "metrics")]
    let write_timer = ctx
        .metrics
        .write_histogram
        .with_label_values(&[name, namespace, action_label])
        .start_timer();

    // `replicas` and `autoScaler.lastScaleAt` both live on the collection's spec, not its status —
    // a single merge patch against the main object via `patch_metadata`, not `patch_status`.
    crate::util::patch::patch_metadata::<GameServerCollection>(
        ctx.client.clone(),
        namespace,
        name,
        serde_json::json!({
            "spec": {
                "replicas": new_replicas,
                "autoScaler": { "lastScaleAt": now.to_rfc3339() },
            },
        }),
    )
    .await?;

    #[cfg(feature = "metrics")]
    write_timer.observe_duration();

    println!(
        "{} {} utilization={:.1}% replicas {} -> {}",
        "autoscaler".color(FG2),
        key.color(FG2),
        u,
        replicas,
        new_replicas
    );

    Ok(())
}

fn schedule_next(ctx: &AutoscalerContext, key: &str) {
    let skeleton = Arc::clone(&ctx.skeleton);
    let key = key.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(POLL_INTERVAL).await;
        skeleton.nudge(key);
    });
}
