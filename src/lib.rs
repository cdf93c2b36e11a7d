//! NFS Subdirectory Provisioner
//!
//! Dynamically provisions Kubernetes PersistentVolumes as subdirectories of
//! a single NFS export, and decides what happens to each directory when its
//! claim is released.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │            External provisioning control loop                │
//! │      (watch, retry with backoff, leader election)            │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │ provision(options)           │ delete(volume)
//! ┌───────────────┴──────────────────────────────┴───────────────┐
//! │                      NfsProvisioner                          │
//! │  ┌──────────────────────┐     ┌───────────────────────────┐  │
//! │  │ PathTemplateResolver │     │   DeletePolicyResolver    │  │
//! │  │  pathPattern → dir   │     │ volume > class > defaults │  │
//! │  └──────────────────────┘     └───────────────────────────┘  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  <mount_path>/<offset>   ≡   <server>:<export_path>/<offset> │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`provisioner`]: volume lifecycle and StorageClass stores
//! - [`policy`]: path templates, path safety and delete policies
//! - [`config`]: process-wide configuration
//! - [`domain`]: ports implemented and consumed by the provisioner
//! - [`error`]: Error types and handling

pub mod config;
pub mod domain;
pub mod error;
pub mod policy;
pub mod provisioner;

// Re-export commonly used types
pub use config::{ProvisionerConfig, DEFAULT_MOUNT_PATH};

pub use domain::ports::{
    ProvisionOptions, Provisioner, ProvisionerRef, ProvisioningState, StorageClassStore,
    StorageClassStoreRef,
};

pub use error::{Error, ErrorAction, Result};

pub use policy::{
    DeleteAction, DeletePolicyResolver, DispositionPolicy, OnDelete, PathTemplate,
    PathTemplateResolver, PolicyDefaults,
};

pub use provisioner::{KubeStorageClassStore, NfsProvisioner, StaticStorageClassStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
