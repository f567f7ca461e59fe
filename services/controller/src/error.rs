use crate::images::ImageError;
use crate::store::StoreError;
use stagegate_signature::SignatureError;
use thiserror::Error;

/// A selector did not apply to an image. Policy data, not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("image {image_name} does not match {field}: {reason}")]
pub struct NoMatchError {
    pub image_name: String,
    pub field: &'static str,
    pub reason: String,
}

impl NoMatchError {
    pub fn new(image_name: impl Into<String>, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    NoMatch(#[from] NoMatchError),
    #[error("image {image} is not allowed to run in project {namespace}")]
    ImageNotAllowed { namespace: String, image: String },
    #[error("invalid policy {object}: {reason}")]
    InvalidPolicy { object: String, reason: String },
    #[error("image {image} resolved to digest {actual} but expected {expected}")]
    DigestMismatch {
        image: String,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

impl EngineError {
    pub(crate) fn invalid_policy(object: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidPolicy {
            object: object.into(),
            reason: reason.to_string(),
        }
    }

    /// Denials are recorded on status and never retried.
    pub fn is_policy_denial(&self) -> bool {
        matches!(self, Self::NoMatch(_) | Self::ImageNotAllowed { .. })
    }

    /// Failures the caller should retry with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::DigestMismatch { .. } => true,
            Self::Store(err) => matches!(err, StoreError::Conflict(_) | StoreError::Unexpected(_)),
            Self::Image(err) => matches!(err, ImageError::Unavailable(_)),
            Self::Signature(err) => err.is_transient(),
            _ => false,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_denials_and_transients() {
        let no_match: EngineError = NoMatchError::new("reg/app:v1", "namePatterns", "no pattern matched").into();
        assert!(no_match.is_policy_denial());
        assert!(!no_match.is_transient());

        let race = EngineError::DigestMismatch {
            image: "reg/app:v1".to_string(),
            expected: "sha256:a".to_string(),
            actual: "sha256:b".to_string(),
        };
        assert!(race.is_transient());
        assert!(!race.is_policy_denial());

        let conflict: EngineError = StoreError::Conflict("app acme/web".to_string()).into();
        assert!(conflict.is_transient());
        let missing: EngineError = StoreError::NotFound("app acme/web".to_string()).into();
        assert!(!missing.is_transient());

        let invalid = EngineError::invalid_policy("ImageAllowRule acme/signed", "bad key");
        assert!(!invalid.is_transient());
        assert!(!invalid.is_policy_denial());
    }

    #[test]
    fn no_match_names_the_field() {
        let err = NoMatchError::new("reg/app:v1", "signatures", "no signatures found");
        assert_eq!(
            err.to_string(),
            "image reg/app:v1 does not match signatures: no signatures found"
        );
    }
}
