//! StorageClass Stores
//!
//! Lookups of the class a volume was provisioned from. Classes may be
//! edited or deleted while volumes exist, so a missing class is `Ok(None)`.

use crate::domain::ports::StorageClassStore;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::debug;

// =============================================================================
// Kubernetes Store
// =============================================================================

/// Reads StorageClasses from the API server
#[derive(Clone)]
pub struct KubeStorageClassStore {
    api: Api<StorageClass>,
}

impl KubeStorageClassStore {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl StorageClassStore for KubeStorageClassStore {
    async fn get(&self, name: &str) -> Result<Option<StorageClass>> {
        let class = self.api.get_opt(name).await?;
        if class.is_none() {
            debug!(class = name, "StorageClass not found");
        }
        Ok(class)
    }
}

// =============================================================================
// Static Store
// =============================================================================

/// Fixed set of classes, for standalone use and tests
#[derive(Debug, Clone, Default)]
pub struct StaticStorageClassStore {
    classes: BTreeMap<String, StorageClass>,
}

impl StaticStorageClassStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class keyed by its metadata name
    pub fn with_class(mut self, class: StorageClass) -> Self {
        let name = class.metadata.name.clone().unwrap_or_default();
        self.classes.insert(name, class);
        self
    }
}

impl FromIterator<StorageClass> for StaticStorageClassStore {
    fn from_iter<I: IntoIterator<Item = StorageClass>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |store, class| store.with_class(class))
    }
}

#[async_trait]
impl StorageClassStore for StaticStorageClassStore {
    async fn get(&self, name: &str) -> Result<Option<StorageClass>> {
        Ok(self.classes.get(name).cloned())
    }
}
