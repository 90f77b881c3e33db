pub mod colors;
pub mod events;
pub mod messages;
pub mod patch;

#[cfg(feature = "metrics")]
pub mod metrics;

use tokio::time::Duration;

/// How often a fully-reconciled `GameServer`/`GameServerCollection` is re-checked even without
/// a watch event, and the window after which a stale `Active`-equivalent status is refreshed.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Errors that can occur while reconciling. Never crosses a `panic!` boundary — every worker
/// catches this and feeds it back into the work queue's backoff.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("invalid input: {0}")]
    UserInput(String),

    #[error("host port range is exhausted")]
    PortsExhausted,

    #[error("pod '{0}' exists but is not owned by the expected GameServer")]
    ResourceExists(String),

    #[error("failed to parse timestamp: {0}")]
    Chrono(#[from] chrono::ParseError),

    #[error("failed to parse duration: {0}")]
    Duration(#[from] parse_duration::parse::Error),
}
