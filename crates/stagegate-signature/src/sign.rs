use crate::payload::{SimpleSigningPayload, SIGNED_NAME_ANNOTATION};
use crate::{ImageSignature, SignatureError, SignatureResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signer, SigningKey};
use stagegate_authz::{validate_digest, ImageReference};
use std::collections::BTreeMap;

/// Sign the image at `digest`, recording `reference` as its signed name.
///
/// A digest-qualified `reference` must name `digest`; signing one image's name
/// over another image's content is refused.
pub fn sign_image(
    key: &SigningKey,
    reference: &str,
    digest: &str,
    annotations: &BTreeMap<String, String>,
) -> SignatureResult<ImageSignature> {
    validate_digest(digest)?;
    let parsed = ImageReference::parse(reference)?;
    if let Some(named) = parsed.digest()
        && named != digest
    {
        return Err(SignatureError::DigestMismatch {
            reference: reference.to_string(),
            expected: digest.to_string(),
            actual: named.to_string(),
        });
    }

    let mut optional = annotations.clone();
    optional.insert(SIGNED_NAME_ANNOTATION.to_string(), reference.to_string());
    let payload = serde_json::to_string(&SimpleSigningPayload::new(
        parsed.repository(),
        digest,
        optional,
    ))?;
    let signature = key.sign(payload.as_bytes());

    Ok(ImageSignature {
        payload,
        signature: STANDARD.encode(signature.to_bytes()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_signing_key;

    const DIGEST: &str =
        "sha256:9f2c1ab0d0e7a4f3c0e6b5a4d3c2b1a0f9e8d7c6b5a4f3e2d1c0b9a8f7e6d5c4";

    #[test]
    fn payload_binds_digest_and_signed_name() {
        let key = generate_signing_key();
        let annotations = BTreeMap::from([("tag".to_string(), "ci".to_string())]);
        let signature = sign_image(&key, "reg/test:ci", DIGEST, &annotations).expect("sign");

        let payload: SimpleSigningPayload =
            serde_json::from_str(&signature.payload).expect("payload");
        assert_eq!(payload.digest(), DIGEST);
        assert_eq!(payload.critical.identity.docker_reference, "reg/test");
        assert_eq!(payload.signed_name(), Some("reg/test:ci"));
        assert_eq!(payload.annotations().get("tag").map(String::as_str), Some("ci"));
    }

    #[test]
    fn refuses_reference_naming_other_digest() {
        let key = generate_signing_key();
        let other = "sha256:1111111111111111111111111111111111111111111111111111111111111111";
        let err = sign_image(
            &key,
            &format!("reg/test@{other}"),
            DIGEST,
            &BTreeMap::new(),
        )
        .expect_err("mismatch");
        assert!(matches!(err, SignatureError::DigestMismatch { .. }));
    }

    #[test]
    fn refuses_invalid_digest() {
        let key = generate_signing_key();
        assert!(sign_image(&key, "reg/test:ci", "latest", &BTreeMap::new()).is_err());
    }
}
