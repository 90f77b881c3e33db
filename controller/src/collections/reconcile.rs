//! Ties `logic.rs` (decisions) and `actions.rs` (I/O) into the `sync(key)` handler the
//! [`crate::skeleton::Skeleton`] drives, per §4.4.

use kube::{
    Client, ResourceExt,
    api::Api,
    runtime::reflector::{ObjectRef, Store},
};
use owo_colors::OwoColorize;
use std::sync::Arc;

use crate::collections::{actions, logic};
use crate::ports::PortRegistry;
use crate::skeleton::Skeleton;
use crate::util::Error;
use crate::util::PROBE_INTERVAL;
use crate::util::colors::FG2;
#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;
use fleet_types::{COLLECTION_LABEL, GameServer, GameServerCollection};

pub struct CollectionContext {
    pub client: Client,
    pub collections: Store<GameServerCollection>,
    pub children: Store<GameServer>,
    pub ports: Arc<PortRegistry>,
    pub skeleton: Arc<Skeleton>,
    #[cfg(feature = "metrics")]
    pub metrics: ControllerMetrics,
}

/// Re-visits `key` after [`PROBE_INTERVAL`] even absent a watch event, so a drifted status (e.g.
/// a child's player count changed by an external mutation that raced a cache update) is still
/// caught. Mirrors the Autoscaler Reconciler's fixed-interval self-nudge.
fn schedule_probe(ctx: &CollectionContext, key: &str) {
    let skeleton = Arc::clone(&ctx.skeleton);
    let key = key.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(PROBE_INTERVAL).await;
        skeleton.nudge(key);
    });
}

/// Splits `namespace/name` into its parts, as produced by [`crate::skeleton::object_key`].
fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('/')
}

pub async fn sync(key: String, ctx: Arc<CollectionContext>) -> Result<(), Error> {
    let (namespace, name) = split_key(&key)
        .ok_or_else(|| Error::UserInput(format!("malformed reconciliation key: {key}")))?;

    let collection_ref = ObjectRef::new(name).within(namespace);
    let Some(collection) = ctx.collections.get(&collection_ref) else {
        // Deleted: children are garbage-collected by the orchestrator via ownerRef.
        return Ok(());
    };

    #[cfg(feature = "metrics")]
    ctx.metrics
        .reconcile_counter
        .with_label_values(&[name, namespace])
        .inc();

    schedule_probe(&ctx, &key);

    #[cfg(feature = "metrics")]
    let decide_timer = ctx
        .metrics
        .read_histogram
        .with_label_values(&[name, namespace, "membership"])
        .start_timer();

    let mut children: Vec<GameServer> = ctx
        .children
        .state()
        .into_iter()
        .filter(|c| {
            c.namespace().as_deref() == Some(namespace)
                && c.labels().get(COLLECTION_LABEL).map(String::as_str) == Some(name)
        })
        .collect();

    let have = children.len() as u32;
    let want = collection.spec.replicas;
    let decision = logic::decide_membership(have, want);

    #[cfg(feature = "metrics")]
    decide_timer.observe_duration();

    let action_label = match &decision {
        logic::MembershipDecision::Create(_) => "create",
        logic::MembershipDecision::ScaleDown(_) => "scale_down",
        logic::MembershipDecision::NoOp => "noop",
    };
    #[cfg(feature = "metrics")]
    ctx.metrics
        .action_counter
        .with_label_values(&[name, namespace, action_label])
        .inc();

    match decision {
        logic::MembershipDecision::Create(count) => {
            #[cfg(feature = "metrics")]
            let write_timer = ctx
                .metrics
                .write_histogram
                .with_label_values(&[name, namespace, action_label])
                .start_timer();
            let server_api: Api<GameServer> = Api::namespaced(ctx.client.clone(), namespace);
            let mut rng = rand::rng();
            for _ in 0..count {
                let child_name = logic::child_name(name, &mut rng);
                actions::create_child(
                    ctx.client.clone(),
                    &server_api,
                    &ctx.ports,
                    &collection,
                    &child_name,
                )
                .await?;
            }
            #[cfg(feature = "metrics")]
            write_timer.observe_duration();
        }
        logic::MembershipDecision::ScaleDown(count) => {
            #[cfg(feature = "metrics")]
            let write_timer = ctx
                .metrics
                .write_histogram
                .with_label_values(&[name, namespace, action_label])
                .start_timer();
            let server_api: Api<GameServer> = Api::namespaced(ctx.client.clone(), namespace);
            let mut rng = rand::rng();
            let targets = logic::choose_scale_down_targets(&children, count, &mut rng);
            for &idx in &targets {
                actions::mark_for_deletion(ctx.client.clone(), &server_api, &children[idx]).await?;
                // Reflect the write locally so the drain pass and status rollup below see it
                // without waiting for the next watch event.
                if let Some(status) = children[idx].status.as_mut() {
                    status.game_server_state = fleet_types::GameServerState::MarkedForDeletion;
                }
            }
            #[cfg(feature = "metrics")]
            write_timer.observe_duration();
        }
        logic::MembershipDecision::NoOp => {}
    }

    let server_api: Api<GameServer> = Api::namespaced(ctx.client.clone(), namespace);
    let mut remaining = Vec::with_capacity(children.len());
    for child in children.drain(..) {
        if logic::drainable(std::slice::from_ref(&child)).next().is_some() {
            actions::delete_drained(&server_api, &child).await?;
            ctx.ports.release(&child.name_any());
        } else {
            remaining.push(child);
        }
    }
    let children = remaining;

    let rollup = logic::compute_status(&children);
    let unchanged = collection.status.as_ref().is_some_and(|s| {
        s.available_replicas == rollup.available_replicas
            && s.game_server_collection_state == rollup.collection_state
            && s.pod_collection_state == rollup.pod_state
    });
    if !unchanged {
        actions::write_status(ctx.client.clone(), &collection, &rollup).await?;
        println!(
            "{} {} available={} state={}",
            "collection".color(FG2),
            key.color(FG2),
            rollup.available_replicas,
            rollup.collection_state
        );
    }

    Ok(())
}
