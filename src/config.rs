//! Provisioner Configuration
//!
//! Immutable process-wide settings shared by the path resolver, the delete
//! policy resolver and the NFS provisioner.

use crate::error::{Error, Result};
use crate::policy::delete::{parse_bool, OnDelete, PolicyDefaults};
use std::path::PathBuf;

/// Where the NFS export is mounted inside the provisioner container
pub const DEFAULT_MOUNT_PATH: &str = "/persistentvolumes";

/// Configuration for the NFS subdirectory provisioner
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// NFS server address written into every PersistentVolume
    pub server: String,
    /// Exported directory on the server; all volumes live below it
    pub export_path: String,
    /// Local mount point of `export_path`
    pub mount_path: PathBuf,
    /// Provisioner name StorageClasses refer to
    pub provisioner_name: String,
    /// Whether the control loop should run leader election
    pub leader_election: bool,
    /// Fallback delete policy
    pub defaults: PolicyDefaults,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            export_path: String::new(),
            mount_path: PathBuf::from(DEFAULT_MOUNT_PATH),
            provisioner_name: String::new(),
            leader_election: true,
            defaults: PolicyDefaults::default(),
        }
    }
}

impl ProvisionerConfig {
    pub fn new(
        server: impl Into<String>,
        export_path: impl Into<String>,
        provisioner_name: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            export_path: export_path.into(),
            provisioner_name: provisioner_name.into(),
            ..Default::default()
        }
    }

    pub fn with_mount_path(mut self, mount_path: impl Into<PathBuf>) -> Self {
        self.mount_path = mount_path.into();
        self
    }

    pub fn with_defaults(mut self, defaults: PolicyDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Check that every required setting is present
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("NFS_SERVER", self.server.as_str()),
            ("NFS_PATH", self.export_path.as_str()),
            ("PROVISIONER_NAME", self.provisioner_name.as_str()),
        ];
        if let Some((key, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(Error::Configuration(format!("{} not set", key)));
        }
        if self.mount_path.as_os_str().is_empty() {
            return Err(Error::Configuration("mount path not set".into()));
        }
        Ok(())
    }
}

/// Parse the default disposition. Unlike class parameters, an unknown value
/// is rejected so a typo cannot silently disable the default.
pub fn parse_default_on_delete(key: &str, value: Option<&str>) -> Result<OnDelete> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(OnDelete::Unspecified),
        Some(value) => match OnDelete::normalize(value) {
            OnDelete::Unspecified => Err(Error::Configuration(format!(
                "Invalid value for {}: {}",
                key, value
            ))),
            on_delete => Ok(on_delete),
        },
    }
}

/// Parse an optional strict boolean setting; empty means unset.
pub fn parse_bool_setting(key: &str, value: Option<&str>) -> Result<Option<bool>> {
    value
        .filter(|v| !v.is_empty())
        .map(|value| {
            parse_bool(value).ok_or_else(|| {
                Error::Configuration(format!("Unable to parse {}: {}", key, value))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_validate_requires_fields() {
        let config = ProvisionerConfig::new("nfs.example.com", "/exports", "example.com/nfs");
        assert!(config.validate().is_ok());
        assert_eq!(config.mount_path, PathBuf::from(DEFAULT_MOUNT_PATH));
        assert!(config.leader_election);

        let err = ProvisionerConfig::new("", "/exports", "example.com/nfs")
            .validate()
            .unwrap_err();
        assert_matches!(err, Error::Configuration(ref msg) if msg == "NFS_SERVER not set");

        let err = ProvisionerConfig::new("nfs", " ", "example.com/nfs")
            .validate()
            .unwrap_err();
        assert_matches!(err, Error::Configuration(ref msg) if msg == "NFS_PATH not set");
    }

    #[test]
    fn test_parse_default_on_delete() {
        assert_eq!(parse_default_on_delete("K", None).unwrap(), OnDelete::Unspecified);
        assert_eq!(parse_default_on_delete("K", Some("")).unwrap(), OnDelete::Unspecified);
        assert_eq!(parse_default_on_delete("K", Some(" Retain ")).unwrap(), OnDelete::Retain);
        assert_matches!(
            parse_default_on_delete("K", Some("archive")),
            Err(Error::Configuration(_))
        );
    }

    #[test]
    fn test_parse_bool_setting() {
        assert_eq!(parse_bool_setting("K", None).unwrap(), None);
        assert_eq!(parse_bool_setting("K", Some("false")).unwrap(), Some(false));
        assert_matches!(parse_bool_setting("K", Some("nope")), Err(Error::Configuration(_)));
    }
}
