//! Domain Ports - Core trait definitions for the provisioner
//!
//! These traits define the boundaries between the volume lifecycle logic and
//! the external control loop and class store that drive it.

use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::StorageClass;
use std::sync::Arc;

// =============================================================================
// Provisioning Request/Outcome
// =============================================================================

/// Options the control loop hands to [`Provisioner::provision`]
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Claim being provisioned
    pub claim: PersistentVolumeClaim,
    /// Generated name for the new PersistentVolume
    pub pv_name: String,
    /// Class the claim requested
    pub storage_class: StorageClass,
}

impl ProvisionOptions {
    pub fn namespace(&self) -> &str {
        self.claim.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn claim_name(&self) -> &str {
        self.claim.metadata.name.as_deref().unwrap_or_default()
    }
}

/// State of a provisioning attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    /// No work is pending; the call either produced a volume or failed for good
    Finished,
}

impl std::fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisioningState::Finished => write!(f, "finished"),
        }
    }
}

// =============================================================================
// Provisioner Port
// =============================================================================

/// Callbacks invoked by the external provisioning control loop
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create backing storage for a claim and describe it as a PersistentVolume
    async fn provision(
        &self,
        options: ProvisionOptions,
    ) -> Result<(PersistentVolume, ProvisioningState)>;

    /// Dispose of the backing storage of a released PersistentVolume
    async fn delete(&self, volume: &PersistentVolume) -> Result<()>;
}

// =============================================================================
// Storage Class Store Port
// =============================================================================

/// Read access to StorageClass objects by name
#[async_trait]
pub trait StorageClassStore: Send + Sync {
    /// Fetch a class; `Ok(None)` when it does not exist
    async fn get(&self, name: &str) -> Result<Option<StorageClass>>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ProvisionerRef = Arc<dyn Provisioner>;
pub type StorageClassStoreRef = Arc<dyn StorageClassStore>;
