pub mod collection;
pub mod gameserver;

pub use collection::{
    AutoScalerSpec, GameServerCollection, GameServerCollectionSpec, GameServerCollectionStatus,
    PortTemplate,
};
pub use gameserver::{
    COLLECTION_LABEL, GameServer, GameServerSpec, GameServerState, GameServerStatus, PodState,
    PortMapping, PortProtocol,
};
