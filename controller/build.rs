use fleet_types::*;
use kube::CustomResourceExt;
use std::fs;

fn main() {
    let _ = fs::create_dir("../crds");
    fs::write(
        "../crds/fleet.gameservers.io_gameserver_crd.yaml",
        serde_yaml::to_string(&GameServer::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/fleet.gameservers.io_gameservercollection_crd.yaml",
        serde_yaml::to_string(&GameServerCollection::crd()).unwrap(),
    )
    .unwrap();
}
