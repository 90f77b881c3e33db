use crate::gameserver::{GameServerState, PodState, PortProtocol};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "fleet.gameservers.io",
    version = "v1",
    kind = "GameServerCollection",
    plural = "gameservercollections",
    shortname = "gsc",
    derive = "PartialEq",
    status = "GameServerCollectionStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.replicas\", \"name\": \"DESIRED\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.availableReplicas\", \"name\": \"AVAILABLE\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.gameServerCollectionState\", \"name\": \"STATE\", \"type\": \"string\" }"
)]
pub struct GameServerCollectionSpec {
    pub replicas: u32,

    /// Port template inherited by each child; `host_port` is left unset here and assigned per
    /// child by the port registry.
    pub ports: Vec<PortTemplate>,

    pub pod_template: PodTemplateSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_map: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaler: Option<AutoScalerSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct PortTemplate {
    pub name: String,
    pub container_port: i32,
    #[serde(default)]
    pub protocol: PortProtocol,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct AutoScalerSpec {
    pub enabled: bool,
    pub min: u32,
    pub max: u32,

    #[serde(rename = "scaleOutThreshold")]
    pub scale_out_threshold: f64,
    #[serde(rename = "scaleInThreshold")]
    pub scale_in_threshold: f64,

    /// ISO-8601 duration, e.g. "PT5M"; parsed with `parse_duration` at the call site.
    pub cooldown: String,

    #[serde(rename = "maxPlayersPerServer")]
    pub max_players_per_server: u32,

    /// RFC 3339 timestamp of the last scaling write, or absent/malformed if the autoscaler has
    /// never acted — both are treated as "never".
    #[serde(rename = "lastScaleAt", default, skip_serializing_if = "Option::is_none")]
    pub last_scale_at: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct GameServerCollectionStatus {
    #[serde(rename = "availableReplicas", default)]
    pub available_replicas: u32,

    #[serde(rename = "gameServerCollectionState")]
    pub game_server_collection_state: GameServerState,

    #[serde(rename = "podCollectionState")]
    pub pod_collection_state: PodState,

    #[serde(rename = "lastUpdated")]
    pub last_updated: Option<String>,
}
