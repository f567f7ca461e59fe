//! Stagegate controller library crate.
//!
//! # Purpose
//! Decides whether an app's staged image may run and how much privilege its
//! services may hold: allow-rule gating, role-authorization derived
//! permissions, consumer permissions and the staged-to-active promotion
//! protocol across nested app trees.
//!
//! # How it fits
//! An external reconciliation loop calls the handler methods on [`Engine`]
//! for apps and role authorizations. The engine reads policy through
//! [`store::PolicyStore`], image metadata through [`images::ImageCatalog`]
//! and signatures through `stagegate_signature::SignatureSource`, and writes
//! its verdicts onto app status.
//!
//! # Notes
//! The engine keeps no state between calls; generation stamps on app status
//! are the only cache.
pub mod config;
pub mod engine;
pub mod error;
pub mod images;
pub mod model;
pub mod observability;
pub mod reconcile;
pub mod rules;
pub mod store;

pub use config::{EngineConfig, FeatureFlags};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, NoMatchError};
