//! NFS Subdirectory Provisioner
//!
//! Each PersistentVolume is a directory below the NFS export. The export is
//! mounted into the provisioner at `mount_path`, so every volume has two
//! addresses for the same offset:
//!
//! - server view: `<export_path>/<offset>`, written into the NFS source
//! - mount view: `<mount_path>/<offset>`, where the directory is created,
//!   removed or archived

use crate::config::ProvisionerConfig;
use crate::domain::ports::{
    ProvisionOptions, Provisioner, ProvisioningState, StorageClassStoreRef,
};
use crate::error::{Error, Result};
use crate::policy::delete::{DeleteAction, DeletePolicyResolver, DispositionPolicy};
use crate::policy::path;
use crate::policy::template::{ClaimMetadata, PathTemplateResolver};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{NFSVolumeSource, PersistentVolume, PersistentVolumeSpec};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::fs::{self, DirBuilder, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// StorageClass parameter holding the directory template
pub const PATH_PATTERN_KEY: &str = "pathPattern";

/// Prefix given to archived directories
pub const ARCHIVE_PREFIX: &str = "archived-";

/// Legacy annotation naming a volume's class
pub const BETA_STORAGE_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";

const VOLUME_MODE: u32 = 0o777;
const STORAGE_RESOURCE: &str = "storage";
const DEFAULT_RECLAIM_POLICY: &str = "Delete";

// =============================================================================
// Volume Paths
// =============================================================================

/// Both addresses of one volume directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePaths {
    /// Offset below the export root
    pub relative: String,
    /// Path on the NFS server
    pub server: String,
    /// Path through the local mount
    pub mount: PathBuf,
}

// =============================================================================
// NFS Provisioner
// =============================================================================

/// Provisions and disposes of NFS subdirectory volumes
pub struct NfsProvisioner {
    config: ProvisionerConfig,
    paths: PathTemplateResolver,
    policy: DeletePolicyResolver,
    classes: Option<StorageClassStoreRef>,
    set_mode: fn(&Path, u32) -> io::Result<()>,
}

fn set_volume_mode(dir: &Path, mode: u32) -> io::Result<()> {
    fs::set_permissions(dir, Permissions::from_mode(mode))
}

impl NfsProvisioner {
    /// Create a provisioner without a class store; deletes will fail until
    /// one is attached with [`NfsProvisioner::with_class_store`].
    pub fn new(config: ProvisionerConfig) -> Self {
        let policy = DeletePolicyResolver::new(config.defaults);
        Self {
            config,
            paths: PathTemplateResolver,
            policy,
            classes: None,
            set_mode: set_volume_mode,
        }
    }

    /// Attach the store used to re-read classes at delete time
    pub fn with_class_store(mut self, classes: StorageClassStoreRef) -> Self {
        self.classes = Some(classes);
        self
    }

    /// Resolve where a claim's directory lives
    pub fn volume_paths(&self, options: &ProvisionOptions) -> VolumePaths {
        let metadata = ClaimMetadata::from_claim(&options.claim);
        let pattern = options
            .storage_class
            .parameters
            .as_ref()
            .and_then(|p| p.get(PATH_PATTERN_KEY))
            .map(String::as_str);

        let relative = self.paths.resolve(pattern, &metadata, &options.pv_name);
        VolumePaths {
            server: path::join(&self.config.export_path, &relative),
            mount: self.config.mount_path.join(&relative),
            relative,
        }
    }

    /// Create `dir` and its missing parents. Returns the topmost directory
    /// this call created, `None` when `dir` already existed.
    fn create_directory(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let created = self.first_missing_ancestor(dir);
        debug!(
            path = %dir.display(),
            created = ?created,
            "Creating volume directory"
        );
        DirBuilder::new()
            .recursive(true)
            .mode(VOLUME_MODE)
            .create(dir)
            .map_err(|e| Error::filesystem("create directory", dir, e))?;

        // The creation mode is filtered through the umask, so set it again.
        if let Err(e) = (self.set_mode)(dir, VOLUME_MODE) {
            self.cleanup(created.as_deref(), "chmod error");
            return Err(Error::filesystem("set permissions on", dir, e));
        }
        Ok(created)
    }

    /// Topmost component of `dir` below the mount root that does not exist yet
    fn first_missing_ancestor(&self, dir: &Path) -> Option<PathBuf> {
        let mut missing = None;
        for ancestor in dir
            .ancestors()
            .take_while(|a| *a != self.config.mount_path.as_path() && !a.as_os_str().is_empty())
        {
            match fs::symlink_metadata(ancestor) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    missing = Some(ancestor.to_path_buf());
                }
                _ => break,
            }
        }
        missing
    }

    /// Best-effort removal of what a failed provision created. Directories
    /// that existed before the call are never touched.
    fn cleanup(&self, created: Option<&Path>, reason: &str) {
        let Some(dir) = created else {
            debug!("Volume directory existed before provisioning, nothing to clean up");
            return;
        };
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!(
                path = %dir.display(),
                error = %e,
                "Unable to clean up path after {}", reason
            );
        }
    }

    fn build_volume(
        &self,
        options: &ProvisionOptions,
        paths: &VolumePaths,
        policy: &DispositionPolicy,
    ) -> PersistentVolume {
        let class = &options.storage_class;
        let claim_spec = options.claim.spec.as_ref();

        let capacity = claim_spec
            .and_then(|spec| spec.resources.as_ref())
            .and_then(|resources| resources.requests.as_ref())
            .and_then(|requests| requests.get(STORAGE_RESOURCE))
            .map(|quantity| BTreeMap::from([(STORAGE_RESOURCE.to_string(), quantity.clone())]));

        PersistentVolume {
            metadata: ObjectMeta {
                name: Some(options.pv_name.clone()),
                annotations: policy.to_annotations(),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                persistent_volume_reclaim_policy: Some(
                    class
                        .reclaim_policy
                        .clone()
                        .unwrap_or_else(|| DEFAULT_RECLAIM_POLICY.to_string()),
                ),
                access_modes: claim_spec.and_then(|spec| spec.access_modes.clone()),
                mount_options: class.mount_options.clone(),
                capacity,
                storage_class_name: class.metadata.name.clone(),
                nfs: Some(NFSVolumeSource {
                    server: self.config.server.clone(),
                    path: paths.server.clone(),
                    read_only: Some(false),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Class the volume was provisioned from, `None` when it names none or
    /// the class has since been deleted.
    async fn class_for_volume(&self, volume: &PersistentVolume) -> Result<Option<StorageClass>> {
        let classes = self
            .classes
            .as_ref()
            .ok_or_else(|| Error::Configuration("cannot get kube client".into()))?;

        let Some(name) = volume_class_name(volume) else {
            debug!(
                volume = volume.metadata.name.as_deref().unwrap_or_default(),
                "Volume has no storage class"
            );
            return Ok(None);
        };

        let class = classes.get(name).await?;
        if class.is_none() {
            warn!(class = name, "StorageClass not found, using volume and default policy");
        }
        Ok(class)
    }

    /// Map a stored server path to the local mount, refusing anything that
    /// is not strictly inside the export.
    fn mount_path_for(&self, server_path: &str) -> Result<(PathBuf, String)> {
        let cleaned = path::clean(server_path);
        let root = path::clean(&self.config.export_path);

        match path::relative_offset(&root, &cleaned) {
            Some(relative) if relative != "." => {
                Ok((self.config.mount_path.join(relative), cleaned))
            }
            _ => {
                error!(path = %cleaned, root = %root, "Volume path is outside the export root");
                Err(Error::InvalidPath {
                    path: cleaned,
                    root,
                })
            }
        }
    }

    fn archive(&self, dir: &Path, server_path: &str) -> Result<()> {
        let base = Path::new(server_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let archive_path = self.config.mount_path.join(format!("{}{}", ARCHIVE_PREFIX, base));

        info!(
            from = %dir.display(),
            to = %archive_path.display(),
            "Archiving volume directory"
        );
        fs::rename(dir, &archive_path).map_err(|e| Error::filesystem("archive", dir, e))
    }
}

/// Name of a volume's class: the legacy beta annotation first, then
/// `spec.storageClassName`.
pub fn volume_class_name(volume: &PersistentVolume) -> Option<&str> {
    volume
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(BETA_STORAGE_CLASS_ANNOTATION))
        .or_else(|| volume.spec.as_ref()?.storage_class_name.as_ref())
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}

#[async_trait]
impl Provisioner for NfsProvisioner {
    async fn provision(
        &self,
        options: ProvisionOptions,
    ) -> Result<(PersistentVolume, ProvisioningState)> {
        let has_selector = options
            .claim
            .spec
            .as_ref()
            .is_some_and(|spec| spec.selector.is_some());
        if has_selector {
            return Err(Error::UnsupportedRequest("claim Selector is not supported".into()));
        }

        debug!(
            namespace = options.namespace(),
            claim = options.claim_name(),
            volume = %options.pv_name,
            "Provisioning volume"
        );

        let paths = self.volume_paths(&options);
        let created = self.create_directory(&paths.mount)?;

        let policy = match self.policy.for_provision(&options.storage_class) {
            Ok(policy) => policy,
            Err(e) => {
                self.cleanup(created.as_deref(), "delete options error");
                return Err(e);
            }
        };

        let volume = self.build_volume(&options, &paths, &policy);
        info!(
            volume = %options.pv_name,
            path = %paths.server,
            on_delete = %policy.on_delete,
            archive_on_delete = ?policy.archive_on_delete,
            "Provisioned volume"
        );
        Ok((volume, ProvisioningState::Finished))
    }

    async fn delete(&self, volume: &PersistentVolume) -> Result<()> {
        let volume_name = volume.metadata.name.as_deref().unwrap_or_default();
        let nfs = volume
            .spec
            .as_ref()
            .and_then(|spec| spec.nfs.as_ref())
            .ok_or_else(|| Error::InvalidPath {
                path: String::new(),
                root: self.config.export_path.clone(),
            })?;

        let (dir, server_path) = self.mount_path_for(&nfs.path)?;

        match fs::metadata(&dir) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %dir.display(), "Path does not exist, deletion skipped");
                return Ok(());
            }
            Err(e) => return Err(Error::filesystem("stat", &dir, e)),
        }

        let class = self.class_for_volume(volume).await?;
        let policy = self.policy.for_volume(volume, class.as_ref())?;

        match policy.action() {
            DeleteAction::Remove => {
                info!(volume = volume_name, path = %dir.display(), "Removing volume directory");
                fs::remove_dir_all(&dir).map_err(|e| Error::filesystem("remove", &dir, e))
            }
            DeleteAction::Retain => {
                info!(volume = volume_name, path = %dir.display(), "Retaining volume directory");
                Ok(())
            }
            DeleteAction::Archive => self.archive(&dir, &server_path),
        }
    }
}
