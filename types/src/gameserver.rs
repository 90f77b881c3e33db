use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Label carried by every [`GameServer`] owned by a collection; the value is the owning
/// collection's name. Maintained as a strict function of `ownerReferences` — never set or
/// cleared independently of the owner reference.
pub const COLLECTION_LABEL: &str = "fleet.gameservers.io/collection";

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "fleet.gameservers.io",
    version = "v1",
    kind = "GameServer",
    plural = "gameservers",
    shortname = "gs",
    derive = "PartialEq",
    status = "GameServerStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.gameServerState\", \"name\": \"STATE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.podState\", \"name\": \"POD\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.activePlayers\", \"name\": \"PLAYERS\", \"type\": \"integer\" }"
)]
pub struct GameServerSpec {
    /// Ordered port mappings, one per container port the game server listens on. `host_port` is
    /// assigned once, by the port registry, at creation time and never changes afterwards.
    pub ports: Vec<PortMapping>,

    /// Opaque pod template inherited from the owning collection at creation time.
    pub pod_template: PodTemplateSpec,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct PortMapping {
    pub name: String,
    pub container_port: i32,
    #[serde(default = "default_protocol")]
    pub protocol: PortProtocol,
    pub host_port: u16,
}

fn default_protocol() -> PortProtocol {
    PortProtocol::Tcp
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default, JsonSchema)]
pub enum PortProtocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortProtocol::Tcp => write!(f, "TCP"),
            PortProtocol::Udp => write!(f, "UDP"),
        }
    }
}

/// Status object for the [`GameServer`] resource.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct GameServerStatus {
    #[serde(rename = "gameServerState")]
    pub game_server_state: GameServerState,

    #[serde(rename = "podState")]
    pub pod_state: PodState,

    /// Updated out-of-band by the external mutation façade; drives the autoscaler and the
    /// drain discipline for `MarkedForDeletion` servers.
    #[serde(rename = "activePlayers", default)]
    pub active_players: u32,

    #[serde(rename = "lastUpdated")]
    pub last_updated: Option<String>,
}

/// A short description of the [`GameServer`] resource's current state.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum GameServerState {
    #[default]
    Creating,
    Running,
    MarkedForDeletion,
    Failed,
}

impl FromStr for GameServerState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Creating" => Ok(GameServerState::Creating),
            "Running" => Ok(GameServerState::Running),
            "MarkedForDeletion" => Ok(GameServerState::MarkedForDeletion),
            "Failed" => Ok(GameServerState::Failed),
            _ => Err(()),
        }
    }
}

impl fmt::Display for GameServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameServerState::Creating => write!(f, "Creating"),
            GameServerState::Running => write!(f, "Running"),
            GameServerState::MarkedForDeletion => write!(f, "MarkedForDeletion"),
            GameServerState::Failed => write!(f, "Failed"),
        }
    }
}

/// Mirrored from the orchestrator pod's `status.phase`.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum PodState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl fmt::Display for PodState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodState::Pending => write!(f, "Pending"),
            PodState::Running => write!(f, "Running"),
            PodState::Succeeded => write!(f, "Succeeded"),
            PodState::Failed => write!(f, "Failed"),
            PodState::Unknown => write!(f, "Unknown"),
        }
    }
}

impl From<Option<&str>> for PodState {
    fn from(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodState::Pending,
            Some("Running") => PodState::Running,
            Some("Succeeded") => PodState::Succeeded,
            Some("Failed") => PodState::Failed,
            _ => PodState::Unknown,
        }
    }
}
