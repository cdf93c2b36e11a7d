//! Path Templates
//!
//! A StorageClass `pathPattern` names the subdirectory for each claim using
//! placeholders over the claim's metadata:
//!
//! - `${.PVC.name}`, `${.PVC.namespace}`
//! - `${.PVC.labels.<key>}`
//! - `${.PVC.annotations.<key>}`
//!
//! Templates are parsed once into segments and rendered by position, so a
//! label value that itself looks like a placeholder is copied verbatim.

use crate::policy::path;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use std::collections::BTreeMap;
use tracing::debug;

const PLACEHOLDER_OPEN: &str = "${.PVC.";
const PLACEHOLDER_CLOSE: char = '}';
const LABELS_PREFIX: &str = "labels.";
const ANNOTATIONS_PREFIX: &str = "annotations.";

// =============================================================================
// Claim Metadata
// =============================================================================

/// Claim metadata a template can reference
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimMetadata<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub labels: Option<&'a BTreeMap<String, String>>,
    pub annotations: Option<&'a BTreeMap<String, String>>,
}

impl<'a> ClaimMetadata<'a> {
    pub fn from_claim(claim: &'a PersistentVolumeClaim) -> Self {
        let meta = &claim.metadata;
        Self {
            name: meta.name.as_deref().unwrap_or_default(),
            namespace: meta.namespace.as_deref().unwrap_or_default(),
            labels: meta.labels.as_ref(),
            annotations: meta.annotations.as_ref(),
        }
    }

    fn field(&self, field: &str) -> &'a str {
        match field {
            "name" => self.name,
            "namespace" => self.namespace,
            _ => "",
        }
    }

    fn lookup(map: Option<&'a BTreeMap<String, String>>, key: &str) -> &'a str {
        map.and_then(|m| m.get(key)).map(String::as_str).unwrap_or_default()
    }
}

// =============================================================================
// Template
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
    Label(String),
    Annotation(String),
}

/// A parsed path template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse a template. Anything that is not a well-formed placeholder is
    /// kept as literal text.
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
            literal.push_str(&rest[..start]);
            let after_open = &rest[start + PLACEHOLDER_OPEN.len()..];

            let body_end = after_open
                .find(PLACEHOLDER_CLOSE)
                .filter(|&end| !after_open[..end].contains('\n'));

            match body_end {
                Some(end) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Self::placeholder(&after_open[..end]));
                    rest = &after_open[end + PLACEHOLDER_CLOSE.len_utf8()..];
                }
                None => {
                    literal.push_str(PLACEHOLDER_OPEN);
                    rest = after_open;
                }
            }
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    fn placeholder(body: &str) -> Segment {
        if let Some(key) = body.strip_prefix(LABELS_PREFIX) {
            Segment::Label(key.to_string())
        } else if let Some(key) = body.strip_prefix(ANNOTATIONS_PREFIX) {
            Segment::Annotation(key.to_string())
        } else {
            Segment::Field(body.to_string())
        }
    }

    /// Substitute every placeholder; unknown fields and missing keys render
    /// as the empty string.
    pub fn render(&self, metadata: &ClaimMetadata<'_>) -> String {
        let mut rendered = String::new();
        for segment in &self.segments {
            let value = match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Field(field) => metadata.field(field),
                Segment::Label(key) => ClaimMetadata::lookup(metadata.labels, key),
                Segment::Annotation(key) => ClaimMetadata::lookup(metadata.annotations, key),
            };
            rendered.push_str(value);
        }
        rendered
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves the relative directory for a claim
#[derive(Debug, Clone, Copy, Default)]
pub struct PathTemplateResolver;

impl PathTemplateResolver {
    /// Default directory name: `<namespace>-<name>-<pv_name>`
    pub fn default_path(metadata: &ClaimMetadata<'_>, pv_name: &str) -> String {
        [metadata.namespace, metadata.name, pv_name].join("-")
    }

    /// Render `pattern` and fall back to the default path when there is no
    /// pattern or the rendered value is empty or escapes the export root.
    pub fn resolve(
        &self,
        pattern: Option<&str>,
        metadata: &ClaimMetadata<'_>,
        pv_name: &str,
    ) -> String {
        let custom = pattern.and_then(|pattern| {
            let rendered = PathTemplate::parse(pattern).render(metadata);
            let sanitized = path::sanitize_relative(&rendered);
            if sanitized.is_none() {
                debug!(
                    pattern = pattern,
                    rendered = %rendered,
                    "Path pattern produced an unusable path, using default"
                );
            }
            sanitized
        });

        custom.unwrap_or_else(|| Self::default_path(metadata, pv_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_all_placeholder_shapes() {
        let labels = labels(&[("app", "web")]);
        let annotations = self::labels(&[("team", "alpha")]);
        let meta = ClaimMetadata {
            name: "data",
            namespace: "prod",
            labels: Some(&labels),
            annotations: Some(&annotations),
        };

        let template = PathTemplate::parse(
            "${.PVC.namespace}/${.PVC.annotations.team}/${.PVC.labels.app}-${.PVC.name}",
        );
        assert_eq!(template.render(&meta), "prod/alpha/web-data");
    }

    #[test]
    fn test_missing_keys_render_empty() {
        let meta = ClaimMetadata {
            name: "data",
            namespace: "prod",
            ..Default::default()
        };
        let template = PathTemplate::parse("x${.PVC.labels.missing}y${.PVC.uid}z${.PVC.labels}");
        assert_eq!(template.render(&meta), "xyz");
    }

    #[test]
    fn test_malformed_placeholders_stay_literal() {
        let meta = ClaimMetadata {
            name: "data",
            ..Default::default()
        };
        assert_eq!(PathTemplate::parse("${.PVC.name").render(&meta), "${.PVC.name");
        assert_eq!(PathTemplate::parse("${.Other.name}").render(&meta), "${.Other.name}");
        assert_eq!(PathTemplate::parse("$.PVC.name}").render(&meta), "$.PVC.name}");
        assert_eq!(
            PathTemplate::parse("a${.PVC.na\nme}${.PVC.name}").render(&meta),
            "a${.PVC.na\nme}data"
        );
    }

    #[test]
    fn test_values_are_not_reexpanded() {
        let labels = labels(&[("evil", "${.PVC.name}")]);
        let meta = ClaimMetadata {
            name: "data",
            labels: Some(&labels),
            ..Default::default()
        };
        let template = PathTemplate::parse("${.PVC.labels.evil}/${.PVC.name}");
        assert_eq!(template.render(&meta), "${.PVC.name}/data");
    }

    #[test]
    fn test_resolver_uses_custom_path() {
        let annotations = labels(&[("team", "alpha")]);
        let meta = ClaimMetadata {
            name: "claim",
            namespace: "ns",
            annotations: Some(&annotations),
            ..Default::default()
        };
        let resolved = PathTemplateResolver.resolve(Some("${.PVC.annotations.team}"), &meta, "pv-1");
        assert_eq!(resolved, "alpha");
    }

    #[test]
    fn test_resolver_falls_back_to_default() {
        let labels = labels(&[("dir", "../../etc")]);
        let meta = ClaimMetadata {
            name: "claim",
            namespace: "ns",
            labels: Some(&labels),
            ..Default::default()
        };
        let resolver = PathTemplateResolver;

        assert_eq!(resolver.resolve(None, &meta, "pv-1"), "ns-claim-pv-1");
        assert_eq!(
            resolver.resolve(Some("${.PVC.labels.missing}"), &meta, "pv-1"),
            "ns-claim-pv-1"
        );
        assert_eq!(
            resolver.resolve(Some("${.PVC.labels.dir}"), &meta, "pv-1"),
            "ns-claim-pv-1"
        );
        assert_eq!(resolver.resolve(Some(" / "), &meta, "pv-1"), "ns-claim-pv-1");
    }

    #[test]
    fn test_resolver_forces_relative() {
        let meta = ClaimMetadata {
            name: "claim",
            namespace: "ns",
            ..Default::default()
        };
        let resolved = PathTemplateResolver.resolve(Some("/shared/${.PVC.namespace}/"), &meta, "pv-1");
        assert_eq!(resolved, "shared/ns");
    }
}
