//! Single-key image verification.
//!
//! Resolves a reference through the image catalog and checks that the digest
//! it points at carries a signature by one key, with the signed name and
//! annotations constrained by [`VerifyOptions`].
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult, NoMatchError};
use crate::model::AppImage;
use stagegate_signature::VerifyOptions;
use tracing::debug;

impl Engine {
    /// The resolved image when `reference` in `namespace` is signed by `key_pem`.
    ///
    /// A signature that is missing, by another key or for another name is a
    /// [`NoMatchError`]; a malformed key or reference is an invalid policy.
    pub async fn verify_image_signature(
        &self,
        namespace: &str,
        reference: &str,
        key_pem: &str,
        options: &VerifyOptions,
    ) -> EngineResult<AppImage> {
        let image = self.images.resolve(namespace, reference).await?;
        match self
            .verifier
            .verify_image(reference, &image.digest, key_pem, options)
            .await
        {
            Ok(()) => {
                debug!(image = %reference, digest = %image.digest, "image signature verified");
                Ok(image)
            }
            Err(err) if err.is_verification_failure() => {
                Err(NoMatchError::new(reference, "signatures", err.to_string()).into())
            }
            Err(err) if err.is_invalid_policy() => {
                Err(EngineError::invalid_policy("signature key", err))
            }
            Err(err) => Err(err.into()),
        }
    }
}
