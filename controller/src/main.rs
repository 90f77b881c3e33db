use clap::{Parser, Subcommand};
use fleet_common::args::{ControllerArgs, PortRangeArgs};
use fleet_types::{COLLECTION_LABEL, GameServer, GameServerCollection};
use k8s_openapi::api::core::v1::Pod;
use kube::{Client, ResourceExt, api::Api, runtime::watcher};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod autoscaler;
mod collections;
mod ports;
mod queue;
mod servers;
mod skeleton;
mod util;

#[cfg(feature = "metrics")]
use util::metrics::ControllerMetrics;

use ports::PortRegistry;
use skeleton::{Skeleton, object_key, prewarm};

/// Top-level CLI configuration for the binary.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Prometheus metrics server scrape port. Disabled by default.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

/// List of subcommands for the binary. Clap converts each variant name to kebab-case.
#[derive(Subcommand)]
enum Command {
    /// Runs the Collection, Server, and Autoscaler reconcilers in one process.
    Run {
        #[command(flatten)]
        controller: ControllerArgs,
        #[command(flatten)]
        ports: PortRangeArgs,
    },
    /// Runs only the Collection and Server reconcilers.
    Collections {
        #[command(flatten)]
        controller: ControllerArgs,
        #[command(flatten)]
        ports: PortRangeArgs,
    },
    /// Runs only the Autoscaler reconciler.
    Autoscaler {
        #[command(flatten)]
        controller: ControllerArgs,
    },
}

fn child_collection_key(server: &GameServer) -> Option<String> {
    let collection_name = server.labels().get(COLLECTION_LABEL)?;
    let namespace = server.namespace()?;
    Some(format!("{namespace}/{collection_name}"))
}

fn namespaced_api<K>(client: Client, namespace: &str) -> Api<K>
where
    K: kube::Resource<Scope = kube::core::NamespaceResourceScope>,
{
    if namespace.is_empty() {
        Api::all(client)
    } else {
        Api::namespaced(client, namespace)
    }
}

/// Wires the watches, Port Registry, and work queue for the Collection + Server reconcilers and
/// runs both worker pools until `shutdown` is cancelled.
async fn run_collections_and_servers(
    client: Client,
    controller: ControllerArgs,
    port_range: PortRangeArgs,
    shutdown: CancellationToken,
    #[cfg(feature = "metrics")] metrics: (ControllerMetrics, ControllerMetrics),
) -> Result<(), util::Error> {
    #[cfg(feature = "metrics")]
    let (collections_metrics, servers_metrics) = metrics;
    let collection_api: Api<GameServerCollection> =
        namespaced_api(client.clone(), &controller.namespace);
    let server_api: Api<GameServer> = namespaced_api(client.clone(), &controller.namespace);

    let registry = Arc::new(PortRegistry::new(port_range.min_port, port_range.max_port));
    registry.reconstruct(&server_api).await?;
    registry.finalize();

    // A raw (non-reflector) watch dedicated to releasing ports on deletion (§9): the
    // prewarmed-reflector stream below only surfaces applied (created/updated) objects, so a
    // `GameServer` deletion — whether from the drain pass or a direct external delete (§6) —
    // needs its own stream to observe the `Deleted` variant.
    tokio::spawn(watch_port_releases(server_api.clone(), Arc::clone(&registry)));

    let (collections_store, collections_stream) =
        prewarm(collection_api, watcher::Config::default()).await?;
    let (servers_store, servers_stream) = prewarm(server_api, watcher::Config::default()).await?;
    let (_pods_store, pods_stream) = prewarm(
        Api::<Pod>::all(client.clone()),
        watcher::Config::default(),
    )
    .await?;

    let collection_skeleton = Arc::new(Skeleton::new(controller.workers));
    collection_skeleton.feed(collections_stream, |c| Some(object_key(c)));

    let server_skeleton = Arc::new(Skeleton::new(controller.workers));
    server_skeleton.feed(servers_stream, |s: &GameServer| Some(object_key(s)));
    server_skeleton.feed(pods_stream, |p| Some(object_key(p)));

    // The Collection Reconciler must also wake on child churn, translated to the owning
    // collection's key.
    let (_servers_store2, servers_stream2) =
        prewarm(Api::<GameServer>::all(client.clone()), watcher::Config::default()).await?;
    collection_skeleton.feed(servers_stream2, |s| child_collection_key(s));

    // Caches are synced and both work queues are fed; the process can now serve a readiness
    // probe honestly.
    fleet_common::signal_ready();

    let collection_ctx = Arc::new(collections::CollectionContext {
        client: client.clone(),
        collections: collections_store,
        children: servers_store.clone(),
        ports: Arc::clone(&registry),
        skeleton: Arc::clone(&collection_skeleton),
        #[cfg(feature = "metrics")]
        metrics: collections_metrics,
    });
    let server_ctx = Arc::new(servers::ServerContext {
        client,
        servers: servers_store,
        skeleton: Arc::clone(&server_skeleton),
        #[cfg(feature = "metrics")]
        metrics: servers_metrics,
    });

    let collection_handle = {
        let shutdown = shutdown.clone();
        let ctx = Arc::clone(&collection_ctx);
        let skeleton = Arc::clone(&collection_skeleton);
        tokio::spawn(async move {
            skeleton
                .run(shutdown, move |key| {
                    let ctx = Arc::clone(&ctx);
                    async move { collections::sync(key, ctx).await }
                })
                .await
        })
    };
    let server_handle = {
        let ctx = Arc::clone(&server_ctx);
        let skeleton = Arc::clone(&server_skeleton);
        tokio::spawn(async move {
            skeleton
                .run(shutdown, move |key| {
                    let ctx = Arc::clone(&ctx);
                    async move { servers::sync(key, ctx).await }
                })
                .await
        })
    };

    let _ = tokio::join!(collection_handle, server_handle);
    Ok(())
}

async fn run_autoscaler(
    client: Client,
    controller: ControllerArgs,
    shutdown: CancellationToken,
    #[cfg(feature = "metrics")] metrics: ControllerMetrics,
) -> Result<(), util::Error> {
    let collection_api: Api<GameServerCollection> =
        namespaced_api(client.clone(), &controller.namespace);
    let server_api: Api<GameServer> = namespaced_api(client.clone(), &controller.namespace);

    let (collections_store, collections_stream) =
        prewarm(collection_api, watcher::Config::default()).await?;
    let (servers_store, servers_stream) = prewarm(server_api, watcher::Config::default()).await?;

    let skeleton = Arc::new(Skeleton::new(controller.workers));
    skeleton.feed(collections_stream, |c| Some(object_key(c)));
    skeleton.feed(servers_stream, |s| child_collection_key(s));

    // Caches are synced and the work queue is fed; the process can now serve a readiness probe
    // honestly.
    fleet_common::signal_ready();

    let ctx = Arc::new(autoscaler::AutoscalerContext {
        client,
        collections: collections_store,
        children: servers_store,
        skeleton: Arc::clone(&skeleton),
        #[cfg(feature = "metrics")]
        metrics,
    });

    skeleton
        .run(shutdown, move |key| {
            let ctx = Arc::clone(&ctx);
            async move { autoscaler::sync(key, ctx).await }
        })
        .await;
    Ok(())
}

/// Watches `GameServer` directly (bypassing the reflector, which only surfaces applied objects)
/// so that a deletion — from the drain pass or an external `kubectl delete` alike — releases its
/// host port back to the [`PortRegistry`] (§9).
async fn watch_port_releases(api: Api<GameServer>, registry: Arc<PortRegistry>) {
    use futures::StreamExt;
    use kube::runtime::{WatchStreamExt, watcher::Event};

    let mut stream = Box::pin(watcher(api, watcher::Config::default()).default_backoff());
    loop {
        match stream.next().await {
            Some(Ok(Event::Deleted(server))) => {
                registry.release(&server.name_any());
            }
            Some(Ok(Event::Applied(_) | Event::Restarted(_))) => {}
            Some(Err(e)) => {
                eprintln!("port release watch error: {e}");
            }
            None => break,
        }
    }
}

/// Secondary entrypoint that runs the appropriate subcommand.
async fn run(client: Client) {
    let cli = Cli::parse();
    let shutdown = CancellationToken::new();
    tokio::spawn(fleet_common::shutdown::shutdown_signal(shutdown.clone()));

    #[cfg(feature = "metrics")]
    let registry = prometheus::Registry::new();
    #[cfg(feature = "metrics")]
    if let Some(metrics_port) = cli.metrics_port {
        tokio::spawn(util::metrics::run_server(registry.clone(), metrics_port));
    }

    let result = match cli.command {
        Command::Run { controller, ports } => {
            let autoscaler_client = client.clone();
            let autoscaler_controller = controller.clone();
            let autoscaler_shutdown = shutdown.clone();
            #[cfg(feature = "metrics")]
            let autoscaler_metrics = ControllerMetrics::new("autoscaler", &registry);
            let autoscaler_handle = tokio::spawn(async move {
                run_autoscaler(
                    autoscaler_client,
                    autoscaler_controller,
                    autoscaler_shutdown,
                    #[cfg(feature = "metrics")]
                    autoscaler_metrics,
                )
                .await
            });
            #[cfg(feature = "metrics")]
            let collections_and_servers_metrics = (
                ControllerMetrics::new("collections", &registry),
                ControllerMetrics::new("servers", &registry),
            );
            let main_result = run_collections_and_servers(
                client,
                controller,
                ports,
                shutdown,
                #[cfg(feature = "metrics")]
                collections_and_servers_metrics,
            )
            .await;
            let _ = autoscaler_handle.await;
            main_result
        }
        Command::Collections { controller, ports } => {
            #[cfg(feature = "metrics")]
            let metrics = (
                ControllerMetrics::new("collections", &registry),
                ControllerMetrics::new("servers", &registry),
            );
            run_collections_and_servers(
                client,
                controller,
                ports,
                shutdown,
                #[cfg(feature = "metrics")]
                metrics,
            )
            .await
        }
        Command::Autoscaler { controller } => {
            #[cfg(feature = "metrics")]
            let metrics = ControllerMetrics::new("autoscaler", &registry);
            run_autoscaler(
                client,
                controller,
                shutdown,
                #[cfg(feature = "metrics")]
                metrics,
            )
            .await
        }
    };

    result.expect("reconciler loop exited with an error");
}

/// Main entrypoint that sets up the environment before running the secondary entrypoint `run`.
#[tokio::main]
async fn main() {
    fleet_common::init();

    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    let client: Client = Client::try_default()
        .await
        .expect("Expected a valid KUBECONFIG environment variable.");

    run(client).await;
}
