use hyper::{
    Body, Request, Response, Server,
    service::{make_service_fn, service_fn},
};
use prometheus::{
    Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder, register_histogram_vec_with_registry,
    register_int_counter_vec_with_registry,
};
use std::convert::Infallible;

/// Per-reconciler-kind counters and histograms, all registered onto one shared [`Registry`]
/// (passed in by `main`) so the `collections`/`servers`/`autoscaler` reconcilers can run in the
/// same process and still be scraped from a single `/metrics` endpoint without name collisions
/// (each metric name is prefixed with `kind`).
pub struct ControllerMetrics {
    pub reconcile_counter: IntCounterVec,
    pub action_counter: IntCounterVec,
    pub read_histogram: HistogramVec,
    pub write_histogram: HistogramVec,
}

impl ControllerMetrics {
    pub fn new(kind: &str, registry: &Registry) -> Self {
        let reconcile_counter = register_int_counter_vec_with_registry!(
            format!("{kind}_reconcile_total"),
            "Total number of reconciliations handled.",
            &["name", "namespace"],
            registry
        )
        .expect("register reconcile_counter");
        let action_counter = register_int_counter_vec_with_registry!(
            format!("{kind}_action_total"),
            "Total number of actions taken, by action kind.",
            &["name", "namespace", "action"],
            registry
        )
        .expect("register action_counter");
        let read_histogram = register_histogram_vec_with_registry!(
            format!("{kind}_read_seconds"),
            "Time spent deciding the next action.",
            &["name", "namespace", "action"],
            registry
        )
        .expect("register read_histogram");
        let write_histogram = register_histogram_vec_with_registry!(
            format!("{kind}_write_seconds"),
            "Time spent applying the decided action.",
            &["name", "namespace", "action"],
            registry
        )
        .expect("register write_histogram");
        Self {
            reconcile_counter,
            action_counter,
            read_histogram,
            write_histogram,
        }
    }
}

/// Serves the default process registry plus whatever `ControllerMetrics` registries have been
/// merged into it on `/metrics`. Left running for the lifetime of the process; a panic inside it
/// is caught by the process-wide panic hook installed in `main`.
pub async fn run_server(registry: Registry, port: u16) {
    let make_svc = make_service_fn(move |_conn| {
        let registry = registry.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                async move {
                    if req.uri().path() != "/metrics" {
                        return Ok::<_, Infallible>(
                            Response::builder().status(404).body(Body::empty()).unwrap(),
                        );
                    }
                    let metric_families = registry.gather();
                    let mut buffer = Vec::new();
                    TextEncoder::new()
                        .encode(&metric_families, &mut buffer)
                        .expect("encode metrics");
                    Ok(Response::new(Body::from(buffer)))
                }
            }))
        }
    });
    let addr = ([0, 0, 0, 0], port).into();
    if let Err(e) = Server::bind(&addr).serve(make_svc).await {
        eprintln!("metrics server error: {e}");
    }
}
