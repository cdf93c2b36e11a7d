//! Provisioner Module
//!
//! The NFS subdirectory provisioner and the StorageClass stores it reads
//! from at delete time.

pub mod class_store;
pub mod nfs;

pub use class_store::{KubeStorageClassStore, StaticStorageClassStore};
pub use nfs::{
    volume_class_name, NfsProvisioner, VolumePaths, ARCHIVE_PREFIX, BETA_STORAGE_CLASS_ANNOTATION,
    PATH_PATTERN_KEY,
};
