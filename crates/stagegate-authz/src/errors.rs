use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("invalid image reference {reference:?}: {reason}")]
    InvalidReference { reference: String, reason: String },
    #[error("invalid digest: {0}")]
    InvalidDigest(String),
}

impl AuthzError {
    pub(crate) fn invalid_reference(reference: &str, reason: impl Into<String>) -> Self {
        AuthzError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}

pub type AuthzResult<T> = Result<T, AuthzError>;
