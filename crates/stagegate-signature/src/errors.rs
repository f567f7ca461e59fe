use stagegate_authz::AuthzError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("no signatures found for {digest}")]
    NoSignatures { digest: String },
    #[error("no valid signature for {digest} by key {key}")]
    UnmatchedKey { digest: String, key: String },
    #[error("signatures for {digest} by key {key} do not satisfy the annotation requirements")]
    AnnotationsUnmatched { digest: String, key: String },
    #[error("signature was produced for {actual:?}, not {expected:?}")]
    SignedNameMismatch { expected: String, actual: String },
    #[error("reference {reference} names digest {actual}, expected {expected}")]
    DigestMismatch {
        reference: String,
        expected: String,
        actual: String,
    },
    #[error("invalid public key: {0}")]
    InvalidKey(String),
    #[error("invalid annotation selector: {0}")]
    InvalidSelector(String),
    #[error("invalid signature rule: {0}")]
    InvalidRule(String),
    #[error("malformed signature payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error(transparent)]
    Reference(#[from] AuthzError),
    #[error("signature transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

impl SignatureError {
    /// The image is not signed the way the rule requires.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            SignatureError::NoSignatures { .. }
                | SignatureError::UnmatchedKey { .. }
                | SignatureError::AnnotationsUnmatched { .. }
                | SignatureError::SignedNameMismatch { .. }
        )
    }

    /// The rule itself cannot be evaluated.
    pub fn is_invalid_policy(&self) -> bool {
        matches!(
            self,
            SignatureError::InvalidKey(_)
                | SignatureError::InvalidSelector(_)
                | SignatureError::InvalidRule(_)
                | SignatureError::Reference(_)
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SignatureError::Transport(_))
    }
}

pub type SignatureResult<T> = Result<T, SignatureError>;
