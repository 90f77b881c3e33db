use kube::{
    Api, Client, Resource, ResourceExt,
    api::{Patch, PatchParams},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::fmt::Debug;

use crate::util::Error;

const FIELD_MANAGER: &str = "fleet-controller";

/// Clones `instance`'s status (via `get_status`, falling back to `S::default()`), applies
/// `mutate`, and writes it back as a single merge patch against the status subresource.
/// Idempotent by construction: callers are expected to skip this entirely when the mutated
/// status equals the cached one.
pub async fn patch_status<K, S, F>(
    client: Client,
    instance: &K,
    get_status: impl Fn(&K) -> Option<S>,
    mutate: F,
) -> Result<(), Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    S: Default + Clone + Serialize,
    F: FnOnce(&mut S),
{
    let namespace = instance
        .namespace()
        .ok_or_else(|| Error::UserInput("resource must be namespaced to patch status".into()))?;
    let name = instance.name_any();
    let mut status = get_status(instance).unwrap_or_default();
    mutate(&mut status);
    let api: Api<K> = Api::namespaced(client, &namespace);
    let patch = Patch::Merge(json!({ "status": status }));
    api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &patch)
        .await?;
    Ok(())
}

/// Applies an arbitrary merge patch to the main object (metadata/spec, never `status` — the
/// status subresource must be patched separately via [`patch_status`]). Used to atomically clear
/// `ownerReferences` and the collection-membership label together on scale-down.
pub async fn patch_metadata<K>(
    client: Client,
    namespace: &str,
    name: &str,
    body: Value,
) -> Result<(), Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let api: Api<K> = Api::namespaced(client, namespace);
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(body))
        .await?;
    Ok(())
}
