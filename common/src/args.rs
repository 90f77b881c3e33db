use clap::Parser;

/// Host port range the port registry allocates from. Flattened into each controller binary's
/// top-level args.
#[derive(Parser, Debug, Clone)]
pub struct PortRangeArgs {
    #[arg(long, env = "MIN_PORT", default_value_t = 20000)]
    pub min_port: u16,

    #[arg(long, env = "MAX_PORT", default_value_t = 30000)]
    pub max_port: u16,
}

/// Shared controller-skeleton knobs: worker pool size and the namespace to watch.
#[derive(Parser, Debug, Clone)]
pub struct ControllerArgs {
    #[arg(long, env = "WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Namespace to reconcile. Empty string means all namespaces.
    #[arg(long, env = "NAMESPACE", default_value = "")]
    pub namespace: String,
}
