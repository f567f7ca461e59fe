//! Controller data model.
//!
//! # Purpose
//! Policy objects (allow rules, role authorizations, roles), apps with their
//! staging status, services, and image metadata as seen by the engine.
mod app;
mod image;
mod policy;

pub use app::{
    AppDefinition, AppImage, AppInstance, AppSpec, AppStaged, AppStatus, Dependency,
    ServiceConsumer, ServiceInstance, Workload, ORIGINAL_IMAGE_ANNOTATION,
};
pub use image::{ImageDetails, NestedImage};
pub use policy::{
    AuthorizationScope, ClusterImageRoleAuthorizationRecord, ImageAllowRule,
    ImageRoleAuthorization, ImageRoleAuthorizationRecord, ImageSelector, Role,
    RoleAuthorizations, RoleKind, RoleRef,
};
