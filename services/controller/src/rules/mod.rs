//! Policy evaluation: selector matching, allow rules, role authorizations and
//! single-key image verification.
mod allow;
mod role_authorizations;
mod selector;
mod signature;

pub use selector::ImageIdentity;
