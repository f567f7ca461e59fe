//! Handlers the reconciliation loop invokes on apps and role authorizations.
mod bump;
mod consumer;
mod image_allowed;
mod image_permissions;
mod tree;

pub use bump::BumpReport;
pub use tree::TreeReport;
