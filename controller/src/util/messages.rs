pub const TERMINATING: &str = "the game server is draining and will be deleted once empty.";
pub const POD_FOREIGN_OWNER: &str = "a pod with this name already exists and is not owned by this GameServer.";
