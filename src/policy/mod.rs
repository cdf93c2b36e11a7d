//! Volume Policies
//!
//! Naming and disposition rules for provisioned directories:
//! - [`template`]: `pathPattern` rendering and the default directory name
//! - [`path`]: lexical normalization and export-root containment
//! - [`delete`]: layered delete/retain/archive resolution

pub mod delete;
pub mod path;
pub mod template;

pub use delete::{
    first_present, DeleteAction, DeletePolicyResolver, DispositionPolicy, OnDelete,
    PolicyDefaults, PolicyLayer, ARCHIVE_ON_DELETE_KEY, ON_DELETE_KEY,
};
pub use template::{ClaimMetadata, PathTemplate, PathTemplateResolver};
