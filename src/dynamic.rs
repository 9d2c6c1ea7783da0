//! Discovery-backed client for arbitrary resource kinds
//!
//! Scenario steps may create, delete, or probe resources this crate has no
//! typed bindings for. Kinds are resolved through API discovery on every
//! call; callers invoke this rarely, so nothing is cached.

use std::path::Path;

use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::{self, Scope};
use kube::{Client, ResourceExt};
use tracing::debug;

use crate::scenario::Gvk;
use crate::{Error, Result};

/// Generic resource client bound to one namespace
#[derive(Clone)]
pub struct DynamicClient {
    client: Client,
    namespace: String,
}

impl DynamicClient {
    /// Create a client resolving namespaced kinds into `namespace`.
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Probe that an API kind exists by attempting a list of it.
    pub async fn probe(&self, gvk: &Gvk) -> Result<()> {
        let api = self.resource_for(gvk).await?;
        api.list(&ListParams::default())
            .await
            .map_err(|e| Error::control_plane("list", gvk.to_string(), e))?;
        Ok(())
    }

    /// Create the resource described by a YAML file.
    pub async fn create_from_file(&self, path: &Path) -> Result<()> {
        let (object, gvk) = self.object_from_file(path).await?;
        let api = self.resource_for(&gvk).await?;
        api.create(&PostParams::default(), &object)
            .await
            .map_err(|e| Error::control_plane("create", object.name_any(), e))?;
        debug!(kind = %gvk, name = %object.name_any(), "created resource");
        Ok(())
    }

    /// Delete the resource described by a YAML file.
    ///
    /// Propagation policy is left to the cluster default.
    pub async fn delete_from_file(&self, path: &Path) -> Result<()> {
        let (object, gvk) = self.object_from_file(path).await?;
        let api = self.resource_for(&gvk).await?;
        api.delete(&object.name_any(), &DeleteParams::default())
            .await
            .map_err(|e| Error::control_plane("delete", object.name_any(), e))?;
        debug!(kind = %gvk, name = %object.name_any(), "deleted resource");
        Ok(())
    }

    /// Resolve a kind through discovery and scope the resulting handle.
    async fn resource_for(&self, gvk: &Gvk) -> Result<Api<DynamicObject>> {
        let target = GroupVersionKind::gvk(&gvk.group, &gvk.version, &gvk.kind);
        let (resource, capabilities) = discovery::pinned_kind(&self.client, &target)
            .await
            .map_err(|e| Error::control_plane("discover", gvk.to_string(), e))?;

        Ok(if capabilities.scope == Scope::Namespaced {
            Api::namespaced_with(self.client.clone(), &self.namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        })
    }

    async fn object_from_file(&self, path: &Path) -> Result<(DynamicObject, Gvk)> {
        let data = tokio::fs::read_to_string(path).await?;
        let object: DynamicObject = serde_yaml::from_str(&data).map_err(|e| {
            Error::serialization(format!("invalid resource file `{}`: {e}", path.display()))
        })?;
        let gvk = object_gvk(&object).ok_or_else(|| {
            Error::serialization(format!(
                "resource file `{}` is missing apiVersion or kind",
                path.display()
            ))
        })?;
        Ok((object, gvk))
    }
}

fn object_gvk(object: &DynamicObject) -> Option<Gvk> {
    let types = object.types.as_ref()?;
    if types.api_version.is_empty() || types.kind.is_empty() {
        return None;
    }
    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", types.api_version.as_str()),
    };
    Some(Gvk {
        group: group.to_string(),
        version: version.to_string(),
        kind: types.kind.clone(),
    })
}
