//! Ties `logic.rs` and `actions.rs` into the `sync(key)` handler for the Server Reconciler
//! (§4.5), fed by the same kind of watch as the Collection Reconciler plus the owned `Pod` kind.

use k8s_openapi::api::core::v1::Pod;
use kube::{
    Client,
    api::Api,
    runtime::reflector::{ObjectRef, Store},
};
use std::sync::Arc;

use crate::servers::{actions, logic, logic::ServerAction};
use crate::skeleton::Skeleton;
use crate::util::Error;
use crate::util::PROBE_INTERVAL;
#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;
use fleet_types::GameServer;

pub struct ServerContext {
    pub client: Client,
    pub servers: Store<GameServer>,
    pub skeleton: Arc<Skeleton>,
    #[cfg(feature = "metrics")]
    pub metrics: ControllerMetrics,
}

fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('/')
}

/// Re-visits `key` after [`PROBE_INTERVAL`] even absent a watch event, catching a `Pod` phase
/// transition whose watch event this process somehow missed.
fn schedule_probe(ctx: &ServerContext, key: &str) {
    let skeleton = Arc::clone(&ctx.skeleton);
    let key = key.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(PROBE_INTERVAL).await;
        skeleton.nudge(key);
    });
}

async fn get_pod(api: &Api<Pod>, name: &str) -> Result<Option<Pod>, Error> {
    match api.get(name).await {
        Ok(pod) => Ok(Some(pod)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn sync(key: String, ctx: Arc<ServerContext>) -> Result<(), Error> {
    let (namespace, name) = split_key(&key)
        .ok_or_else(|| Error::UserInput(format!("malformed reconciliation key: {key}")))?;

    let server_ref = ObjectRef::new(name).within(namespace);
    let Some(server) = ctx.servers.get(&server_ref) else {
        return Ok(());
    };

    #[cfg(feature = "metrics")]
    ctx.metrics
        .reconcile_counter
        .with_label_values(&[name, namespace])
        .inc();

    schedule_probe(&ctx, &key);

    let pod_api: Api<Pod> = Api::namespaced(ctx.client.clone(), namespace);

    #[cfg(feature = "metrics")]
    let decide_timer = ctx
        .metrics
        .read_histogram
        .with_label_values(&[name, namespace, "pod_phase"])
        .start_timer();
    let pod = get_pod(&pod_api, name).await?;
    let action = logic::determine_action(pod.as_ref(), &server);
    #[cfg(feature = "metrics")]
    decide_timer.observe_duration();

    let action_label = match &action {
        ServerAction::CreatePod => "create_pod",
        ServerAction::ForeignOwner => "foreign_owner",
        ServerAction::RecreatePod => "recreate_pod",
        ServerAction::Mirror { .. } => "mirror",
        ServerAction::NoOp => "noop",
    };
    #[cfg(feature = "metrics")]
    ctx.metrics
        .action_counter
        .with_label_values(&[name, namespace, action_label])
        .inc();

    #[cfg(feature = "metrics")]
    let write_timer = (!matches!(action, ServerAction::NoOp)).then(|| {
        ctx.metrics
            .write_histogram
            .with_label_values(&[name, namespace, action_label])
            .start_timer()
    });

    match action {
        ServerAction::CreatePod => actions::create_pod(ctx.client.clone(), &server).await?,
        ServerAction::ForeignOwner => {
            actions::report_foreign_owner(ctx.client.clone(), &server).await?
        }
        ServerAction::RecreatePod => actions::recreate_pod(ctx.client.clone(), &server).await?,
        ServerAction::Mirror {
            pod_state,
            game_server_state,
        } => {
            actions::mirror_status(ctx.client.clone(), &server, pod_state, game_server_state)
                .await?
        }
        ServerAction::NoOp => {}
    }

    #[cfg(feature = "metrics")]
    if let Some(timer) = write_timer {
        timer.observe_duration();
    }

    Ok(())
}
