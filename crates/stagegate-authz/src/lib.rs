//! Stagegate permission primitives shared by the signature and controller crates.
//!
//! # Purpose
//! Centralizes the RBAC-style permission model, the covering algebra used to
//! compare requested and granted permissions, and the string matchers used by
//! policy rules and image selectors.
//!
//! # How it fits
//! The controller evaluates image-declared permissions against user grants and
//! policy-authorized sets with [`grants_all`], and stores granted sets in the
//! canonical form produced by [`simplify_set`]. Image selectors use
//! [`glob_match`] and [`ImageReference`] to compare image identities.
//!
//! # Key invariants
//! - Every function here is pure; inputs are never mutated.
//! - Permission sets are compared per service name.
//!
//! # Examples
//! ```rust
//! use stagegate_authz::{simplify_set, PermissionSet, PolicyRule};
//!
//! let sets = vec![
//!     PermissionSet::new("web", vec![PolicyRule::new(&["apps"], &["get"], &["deployments"])]),
//!     PermissionSet::new("web", vec![PolicyRule::new(&["apps"], &["list"], &["deployments"])]),
//! ];
//! let simplified = simplify_set(&sets);
//! assert_eq!(simplified.len(), 1);
//! assert_eq!(simplified[0].rules.len(), 1);
//! ```
//!
//! # Common pitfalls
//! - Authorized sets are keyed by image name; re-tag them with
//!   [`PermissionSet::with_service_name`] before comparing against a service.

mod errors;
mod matcher;
mod permission;
mod policy;
mod reference;

pub use errors::{AuthzError, AuthzResult};
pub use matcher::{glob_match, wildcard_match};
pub use permission::{
    grants, grants_all, group_by_service_name, simplify, simplify_set, PermissionSet,
};
pub use policy::{PolicyRule, ScopeTarget, SCOPE_ACCOUNT, SCOPE_CLUSTER, SCOPE_PROJECT};
pub use reference::{is_digest, is_image_id, validate_digest, ImageReference};
