//! Delete Policies
//!
//! Decides what happens to a volume's directory when its claim is released.
//! Two knobs are resolved independently through the same ordered layers
//! (PersistentVolume annotations, StorageClass parameters, provisioner
//! defaults):
//!
//! - `onDelete`: `delete` or `retain`; unknown tokens fall through silently.
//! - `archiveOnDelete`: a strict boolean; an unparsable value is an error.

use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::PersistentVolume;
use k8s_openapi::api::storage::v1::StorageClass;
use std::collections::BTreeMap;

/// Annotation / parameter key for the delete-or-retain disposition
pub const ON_DELETE_KEY: &str = "onDelete";

/// Annotation / parameter key for the archive flag
pub const ARCHIVE_ON_DELETE_KEY: &str = "archiveOnDelete";

// =============================================================================
// On Delete
// =============================================================================

/// Explicit disposition of a released volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OnDelete {
    Delete,
    Retain,
    #[default]
    Unspecified,
}

impl OnDelete {
    /// Case-insensitive, trimmed match on `delete`/`retain`; anything else
    /// is unspecified.
    pub fn normalize(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "delete" => OnDelete::Delete,
            "retain" => OnDelete::Retain,
            _ => OnDelete::Unspecified,
        }
    }

    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            OnDelete::Delete => Some("delete"),
            OnDelete::Retain => Some("retain"),
            OnDelete::Unspecified => None,
        }
    }

    pub fn is_specified(&self) -> bool {
        !matches!(self, OnDelete::Unspecified)
    }
}

impl std::fmt::Display for OnDelete {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().unwrap_or("unspecified"))
    }
}

/// Strict boolean parsing (`1`, `t`, `true`, `0`, `f`, `false` and their
/// capitalized forms).
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

// =============================================================================
// Disposition
// =============================================================================

/// Resolved delete policy for one volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispositionPolicy {
    pub on_delete: OnDelete,
    pub archive_on_delete: Option<bool>,
}

/// What to do with a released volume's directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteAction {
    /// Remove the directory tree
    Remove,
    /// Leave the directory untouched
    Retain,
    /// Rename the directory to an `archived-` sibling
    Archive,
}

impl DispositionPolicy {
    /// An explicit disposition wins; the archive flag only decides when the
    /// disposition is unspecified, and archiving is the default.
    pub fn action(&self) -> DeleteAction {
        match (self.on_delete, self.archive_on_delete) {
            (OnDelete::Delete, _) => DeleteAction::Remove,
            (OnDelete::Retain, _) => DeleteAction::Retain,
            (OnDelete::Unspecified, Some(false)) => DeleteAction::Remove,
            (OnDelete::Unspecified, _) => DeleteAction::Archive,
        }
    }

    /// Annotations to persist on a new PersistentVolume, `None` when neither
    /// knob was resolved.
    pub fn to_annotations(&self) -> Option<BTreeMap<String, String>> {
        let mut annotations = BTreeMap::new();
        if let Some(on_delete) = self.on_delete.as_str() {
            annotations.insert(ON_DELETE_KEY.to_string(), on_delete.to_string());
        }
        if let Some(archive) = self.archive_on_delete {
            annotations.insert(ARCHIVE_ON_DELETE_KEY.to_string(), archive.to_string());
        }
        (!annotations.is_empty()).then_some(annotations)
    }
}

// =============================================================================
// Policy Layers
// =============================================================================

/// Provisioner-wide fallback values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolicyDefaults {
    pub on_delete: OnDelete,
    pub archive_on_delete: Option<bool>,
}

/// One precedence layer holding raw, unparsed values
#[derive(Debug, Clone)]
pub struct PolicyLayer<'a> {
    /// Human readable origin, used in error messages
    pub source: String,
    pub on_delete: Option<&'a str>,
    pub archive_on_delete: Option<&'a str>,
}

impl<'a> PolicyLayer<'a> {
    /// Annotations persisted on a PersistentVolume. An empty archive
    /// annotation counts as unset.
    pub fn volume(volume: &'a PersistentVolume) -> Self {
        let annotations = volume.metadata.annotations.as_ref();
        let get = |key: &str| annotations.and_then(|a| a.get(key)).map(String::as_str);
        Self {
            source: format!(
                "PersistentVolume {}",
                volume.metadata.name.as_deref().unwrap_or_default()
            ),
            on_delete: get(ON_DELETE_KEY),
            archive_on_delete: get(ARCHIVE_ON_DELETE_KEY).filter(|v| !v.is_empty()),
        }
    }

    /// Parameters of a StorageClass. A present archive parameter must parse,
    /// even when empty.
    pub fn class(class: &'a StorageClass) -> Self {
        let parameters = class.parameters.as_ref();
        let get = |key: &str| parameters.and_then(|p| p.get(key)).map(String::as_str);
        Self {
            source: format!(
                "StorageClass {}",
                class.metadata.name.as_deref().unwrap_or_default()
            ),
            on_delete: get(ON_DELETE_KEY),
            archive_on_delete: get(ARCHIVE_ON_DELETE_KEY),
        }
    }

    pub fn defaults(defaults: &PolicyDefaults) -> PolicyLayer<'static> {
        PolicyLayer {
            source: "provisioner defaults".to_string(),
            on_delete: defaults.on_delete.as_str(),
            archive_on_delete: defaults
                .archive_on_delete
                .map(|archive| if archive { "true" } else { "false" }),
        }
    }

    fn resolved_on_delete(&self) -> Option<OnDelete> {
        self.on_delete
            .map(OnDelete::normalize)
            .filter(OnDelete::is_specified)
    }

    fn resolved_archive_on_delete(&self) -> Result<Option<bool>> {
        self.archive_on_delete
            .map(|value| {
                parse_bool(value).ok_or_else(|| Error::InvalidPolicyValue {
                    key: ARCHIVE_ON_DELETE_KEY.to_string(),
                    layer: self.source.clone(),
                    value: value.to_string(),
                })
            })
            .transpose()
    }
}

/// Query providers in order and return the first present value. Providers
/// after the first hit are never evaluated, so a bad value in a lower layer
/// is not reported once a higher layer has answered.
pub fn first_present<T, I>(providers: I) -> Result<Option<T>>
where
    I: IntoIterator<Item = Result<Option<T>>>,
{
    for provided in providers {
        if let Some(value) = provided? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

// =============================================================================
// Resolver
// =============================================================================

/// Merges policy layers into a [`DispositionPolicy`]
#[derive(Debug, Clone, Default)]
pub struct DeletePolicyResolver {
    defaults: PolicyDefaults,
}

impl DeletePolicyResolver {
    pub fn new(defaults: PolicyDefaults) -> Self {
        Self { defaults }
    }

    /// Resolve `layers` in order, with the provisioner defaults appended as
    /// the last layer.
    pub fn resolve(&self, layers: &[PolicyLayer<'_>]) -> Result<DispositionPolicy> {
        let defaults = PolicyLayer::defaults(&self.defaults);
        let ordered = || layers.iter().chain(std::iter::once(&defaults));

        let on_delete = first_present(ordered().map(|layer| Ok(layer.resolved_on_delete())))?
            .unwrap_or_default();
        let archive_on_delete =
            first_present(ordered().map(PolicyLayer::resolved_archive_on_delete))?;

        Ok(DispositionPolicy {
            on_delete,
            archive_on_delete,
        })
    }

    /// Policy to persist when provisioning: class parameters, then defaults.
    pub fn for_provision(&self, class: &StorageClass) -> Result<DispositionPolicy> {
        self.resolve(&[PolicyLayer::class(class)])
    }

    /// Policy to apply at delete time: volume annotations, then the current
    /// class (if it still exists), then defaults.
    pub fn for_volume(
        &self,
        volume: &PersistentVolume,
        class: Option<&StorageClass>,
    ) -> Result<DispositionPolicy> {
        let mut layers = vec![PolicyLayer::volume(volume)];
        layers.extend(class.map(PolicyLayer::class));
        self.resolve(&layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn map(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn class(pairs: &[(&str, &str)]) -> StorageClass {
        StorageClass {
            metadata: ObjectMeta {
                name: Some("class".into()),
                ..Default::default()
            },
            parameters: map(pairs),
            ..Default::default()
        }
    }

    fn volume(pairs: &[(&str, &str)]) -> PersistentVolume {
        PersistentVolume {
            metadata: ObjectMeta {
                name: Some("pv".into()),
                annotations: map(pairs),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn resolver(on_delete: OnDelete, archive_on_delete: Option<bool>) -> DeletePolicyResolver {
        DeletePolicyResolver::new(PolicyDefaults {
            on_delete,
            archive_on_delete,
        })
    }

    #[test]
    fn test_normalize_on_delete() {
        assert_eq!(OnDelete::normalize("delete"), OnDelete::Delete);
        assert_eq!(OnDelete::normalize("  ReTaIn "), OnDelete::Retain);
        assert_eq!(OnDelete::normalize("archive"), OnDelete::Unspecified);
        assert_eq!(OnDelete::normalize(""), OnDelete::Unspecified);
    }

    #[test]
    fn test_parse_bool_is_strict() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("T"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("yes"), None);
        assert_eq!(parse_bool(" true"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_first_present_stops_at_first_hit() {
        let providers: Vec<Result<Option<u32>>> = vec![
            Ok(None),
            Ok(Some(2)),
            Err(Error::Configuration("never reached".into())),
        ];
        assert_eq!(first_present(providers).unwrap(), Some(2));

        let empty: Vec<Result<Option<u32>>> = vec![Ok(None), Ok(None)];
        assert_eq!(first_present(empty).unwrap(), None);
    }

    #[test]
    fn test_action_mapping() {
        let policy = |on_delete, archive_on_delete| DispositionPolicy {
            on_delete,
            archive_on_delete,
        };
        assert_eq!(policy(OnDelete::Retain, Some(true)).action(), DeleteAction::Retain);
        assert_eq!(policy(OnDelete::Delete, Some(true)).action(), DeleteAction::Remove);
        assert_eq!(policy(OnDelete::Unspecified, Some(false)).action(), DeleteAction::Remove);
        assert_eq!(policy(OnDelete::Unspecified, Some(true)).action(), DeleteAction::Archive);
        assert_eq!(policy(OnDelete::Unspecified, None).action(), DeleteAction::Archive);
    }

    #[test]
    fn test_to_annotations() {
        assert_eq!(DispositionPolicy::default().to_annotations(), None);

        let annotations = DispositionPolicy {
            on_delete: OnDelete::Retain,
            archive_on_delete: Some(false),
        }
        .to_annotations()
        .unwrap();
        assert_eq!(annotations.get(ON_DELETE_KEY).map(String::as_str), Some("retain"));
        assert_eq!(annotations.get(ARCHIVE_ON_DELETE_KEY).map(String::as_str), Some("false"));
    }

    #[test]
    fn test_provision_uses_class_then_defaults() {
        let resolver = resolver(OnDelete::Delete, Some(true));

        let policy = resolver
            .for_provision(&class(&[(ON_DELETE_KEY, "retain"), (ARCHIVE_ON_DELETE_KEY, "false")]))
            .unwrap();
        assert_eq!(policy.on_delete, OnDelete::Retain);
        assert_eq!(policy.archive_on_delete, Some(false));

        let policy = resolver.for_provision(&class(&[])).unwrap();
        assert_eq!(policy.on_delete, OnDelete::Delete);
        assert_eq!(policy.archive_on_delete, Some(true));

        let policy = DeletePolicyResolver::default()
            .for_provision(&StorageClass::default())
            .unwrap();
        assert_eq!(policy, DispositionPolicy::default());
    }

    #[test]
    fn test_unknown_class_disposition_falls_through() {
        let policy = resolver(OnDelete::Retain, None)
            .for_provision(&class(&[(ON_DELETE_KEY, "shred")]))
            .unwrap();
        assert_eq!(policy.on_delete, OnDelete::Retain);
    }

    #[test]
    fn test_provision_rejects_invalid_archive() {
        let resolver = resolver(OnDelete::Unspecified, Some(true));

        let err = resolver
            .for_provision(&class(&[(ARCHIVE_ON_DELETE_KEY, "not-a-bool")]))
            .unwrap_err();
        assert_matches!(err, Error::InvalidPolicyValue { ref value, .. } if value == "not-a-bool");

        let err = resolver
            .for_provision(&class(&[(ARCHIVE_ON_DELETE_KEY, "")]))
            .unwrap_err();
        assert_matches!(err, Error::InvalidPolicyValue { .. });
    }

    #[test]
    fn test_volume_annotations_override() {
        let resolver = resolver(OnDelete::Delete, Some(true));
        let volume = volume(&[(ON_DELETE_KEY, "retain"), (ARCHIVE_ON_DELETE_KEY, "false")]);
        let class = class(&[(ON_DELETE_KEY, "delete"), (ARCHIVE_ON_DELETE_KEY, "true")]);

        let policy = resolver.for_volume(&volume, Some(&class)).unwrap();
        assert_eq!(policy.on_delete, OnDelete::Retain);
        assert_eq!(policy.archive_on_delete, Some(false));
    }

    #[test]
    fn test_volume_disposition_wins_over_every_layer() {
        let volume = volume(&[(ON_DELETE_KEY, "Delete")]);
        let classes = [
            None,
            Some(class(&[(ON_DELETE_KEY, "retain")])),
            Some(class(&[(ON_DELETE_KEY, "bogus")])),
        ];
        let defaults = [OnDelete::Retain, OnDelete::Unspecified, OnDelete::Delete];

        for class in &classes {
            for default in defaults {
                let policy = resolver(default, None)
                    .for_volume(&volume, class.as_ref())
                    .unwrap();
                assert_eq!(policy.on_delete, OnDelete::Delete);
            }
        }
    }

    #[test]
    fn test_volume_fallbacks() {
        let resolver = resolver(OnDelete::Retain, Some(false));
        let volume = volume(&[]);

        let policy = resolver
            .for_volume(&volume, Some(&class(&[(ARCHIVE_ON_DELETE_KEY, "true")])))
            .unwrap();
        assert_eq!(policy.on_delete, OnDelete::Retain);
        assert_eq!(policy.archive_on_delete, Some(true));

        let policy = resolver.for_volume(&volume, Some(&class(&[]))).unwrap();
        assert_eq!(policy.archive_on_delete, Some(false));

        let policy = resolver.for_volume(&volume, None).unwrap();
        assert_eq!(policy.on_delete, OnDelete::Retain);
        assert_eq!(policy.archive_on_delete, Some(false));
    }

    #[test]
    fn test_empty_volume_archive_annotation_is_unset() {
        let policy = resolver(OnDelete::Unspecified, None)
            .for_volume(
                &volume(&[(ARCHIVE_ON_DELETE_KEY, "")]),
                Some(&class(&[(ARCHIVE_ON_DELETE_KEY, "false")])),
            )
            .unwrap();
        assert_eq!(policy.archive_on_delete, Some(false));
    }

    #[test]
    fn test_volume_rejects_invalid_archive() {
        let resolver = resolver(OnDelete::Unspecified, Some(true));

        let err = resolver
            .for_volume(
                &volume(&[(ARCHIVE_ON_DELETE_KEY, "invalid")]),
                Some(&class(&[(ARCHIVE_ON_DELETE_KEY, "true")])),
            )
            .unwrap_err();
        assert_matches!(err, Error::InvalidPolicyValue { ref layer, .. } if layer == "PersistentVolume pv");

        let err = resolver
            .for_volume(&volume(&[]), Some(&class(&[(ARCHIVE_ON_DELETE_KEY, "invalid")])))
            .unwrap_err();
        assert_matches!(err, Error::InvalidPolicyValue { ref layer, .. } if layer == "StorageClass class");
    }

    #[test]
    fn test_valid_volume_archive_shadows_invalid_class() {
        let policy = DeletePolicyResolver::default()
            .for_volume(
                &volume(&[(ARCHIVE_ON_DELETE_KEY, "true")]),
                Some(&class(&[(ARCHIVE_ON_DELETE_KEY, "invalid")])),
            )
            .unwrap();
        assert_eq!(policy.archive_on_delete, Some(true));
    }
}
