//! Signature verification against selector rules.
//!
//! # Purpose
//! Decide whether the signatures attached to an image digest satisfy the
//! `signatures` requirements of an image selector, and verify a single image by
//! name for callers that hold one key.
//!
//! # Key invariants
//! - A signature counts only if it verifies against the key AND its payload
//!   names the digest under evaluation.
//! - Signatures are fetched once per call; rules are checked against that
//!   snapshot.
//! - Malformed keys and selectors fail the call before any signature is
//!   fetched, so they are reported even for unsigned images.
//!
//! # Common pitfalls
//! - Verifying a tag-signed image by digest needs `no_verify_name`; the signed
//!   name recorded at signing time is the tagged reference.
use crate::keys::{key_fingerprint, parse_public_key};
use crate::payload::SimpleSigningPayload;
use crate::{
    AnnotationSelector, ImageSignature, MatchMode, SignatureError, SignatureResult,
    SignatureRules, SignatureSource,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use stagegate_authz::{validate_digest, ImageReference};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Required annotations on the signature.
    pub annotations: AnnotationSelector,
    /// Skip comparing the signed name with the reference being verified.
    pub no_verify_name: bool,
}

struct SignerKey {
    key: VerifyingKey,
    fingerprint: String,
}

impl SignerKey {
    fn parse(pem: &str) -> SignatureResult<Self> {
        let key = parse_public_key(pem)?;
        Ok(Self {
            fingerprint: key_fingerprint(&key),
            key,
        })
    }

    /// Payload of `signature` if it verifies under this key and covers `digest`.
    fn verified_payload(
        &self,
        digest: &str,
        signature: &ImageSignature,
    ) -> Option<SimpleSigningPayload> {
        let raw = STANDARD.decode(&signature.signature).ok()?;
        let parsed = Signature::from_slice(&raw).ok()?;
        self.key.verify(signature.payload.as_bytes(), &parsed).ok()?;
        match serde_json::from_str::<SimpleSigningPayload>(&signature.payload) {
            Ok(payload) if payload.digest() == digest => Some(payload),
            Ok(payload) => {
                debug!(
                    key = %self.fingerprint,
                    signed_digest = %payload.digest(),
                    digest = %digest,
                    "signature covers a different digest"
                );
                None
            }
            Err(err) => {
                debug!(key = %self.fingerprint, error = %err, "skipping malformed signature payload");
                None
            }
        }
    }

    /// Some signature by this key over `digest` passes `accept`.
    fn find_signed<F>(
        &self,
        digest: &str,
        signatures: &[ImageSignature],
        mut accept: F,
    ) -> SignatureResult<()>
    where
        F: FnMut(&SimpleSigningPayload) -> SignatureResult<bool>,
    {
        let mut verified = false;
        for signature in signatures {
            let Some(payload) = self.verified_payload(digest, signature) else {
                continue;
            };
            verified = true;
            if accept(&payload)? {
                return Ok(());
            }
        }
        if verified {
            Err(SignatureError::AnnotationsUnmatched {
                digest: digest.to_string(),
                key: self.fingerprint.clone(),
            })
        } else {
            Err(SignatureError::UnmatchedKey {
                digest: digest.to_string(),
                key: self.fingerprint.clone(),
            })
        }
    }
}

/// A rule with its keys parsed and selector validated.
struct PreparedRule<'a> {
    all_of: Vec<SignerKey>,
    any_of: Vec<SignerKey>,
    annotations: &'a AnnotationSelector,
}

impl<'a> PreparedRule<'a> {
    fn new(rule: &'a SignatureRules) -> SignatureResult<Self> {
        if rule.signed_by.all_of.is_empty() && rule.signed_by.any_of.is_empty() {
            return Err(SignatureError::InvalidRule(
                "signedBy lists no keys".to_string(),
            ));
        }
        rule.annotations.validate()?;
        Ok(Self {
            all_of: parse_keys(&rule.signed_by.all_of)?,
            any_of: parse_keys(&rule.signed_by.any_of)?,
            annotations: &rule.annotations,
        })
    }

    fn check(&self, digest: &str, signatures: &[ImageSignature]) -> SignatureResult<()> {
        let accept = |payload: &SimpleSigningPayload| self.annotations.matches(payload.annotations());
        for signer in &self.all_of {
            signer.find_signed(digest, signatures, accept)?;
        }
        if self.any_of.is_empty() {
            return Ok(());
        }

        let mut first_failure = None;
        for signer in &self.any_of {
            match signer.find_signed(digest, signatures, accept) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    first_failure.get_or_insert(err);
                }
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn parse_keys(pems: &[String]) -> SignatureResult<Vec<SignerKey>> {
    pems.iter().map(|pem| SignerKey::parse(pem)).collect()
}

#[derive(Clone)]
pub struct SignatureVerifier {
    source: Arc<dyn SignatureSource>,
    mode: MatchMode,
}

impl SignatureVerifier {
    pub fn new(source: Arc<dyn SignatureSource>, mode: MatchMode) -> Self {
        Self { source, mode }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    async fn fetch(&self, digest: &str) -> SignatureResult<Vec<ImageSignature>> {
        let signatures = self.source.signatures(digest).await?;
        if signatures.is_empty() {
            return Err(SignatureError::NoSignatures {
                digest: digest.to_string(),
            });
        }
        Ok(signatures)
    }

    /// Check `rules` against the signatures attached to `digest`.
    ///
    /// Returns the index of the deciding rule: the first satisfied rule in
    /// [`MatchMode::Any`], the last rule in [`MatchMode::All`]. `None` means no
    /// rules were given and nothing was required.
    pub async fn verify(
        &self,
        digest: &str,
        rules: &[SignatureRules],
    ) -> SignatureResult<Option<usize>> {
        if rules.is_empty() {
            return Ok(None);
        }
        let prepared = rules
            .iter()
            .map(PreparedRule::new)
            .collect::<SignatureResult<Vec<_>>>()?;
        let signatures = self.fetch(digest).await?;

        match self.mode {
            MatchMode::Any => {
                let mut first_failure = None;
                for (index, rule) in prepared.iter().enumerate() {
                    match rule.check(digest, &signatures) {
                        Ok(()) => {
                            debug!(digest = %digest, rule = index, "signature rule satisfied");
                            return Ok(Some(index));
                        }
                        Err(err) => {
                            debug!(digest = %digest, rule = index, error = %err, "signature rule not satisfied");
                            first_failure.get_or_insert(err);
                        }
                    }
                }
                match first_failure {
                    Some(err) => Err(err),
                    None => Ok(None),
                }
            }
            MatchMode::All => {
                for (index, rule) in prepared.iter().enumerate() {
                    rule.check(digest, &signatures)?;
                    debug!(digest = %digest, rule = index, "signature rule satisfied");
                }
                Ok(Some(prepared.len() - 1))
            }
        }
    }

    /// Verify that `reference` at `digest` carries a signature by `key_pem`.
    pub async fn verify_image(
        &self,
        reference: &str,
        digest: &str,
        key_pem: &str,
        options: &VerifyOptions,
    ) -> SignatureResult<()> {
        ImageReference::parse(reference)?;
        validate_digest(digest)?;
        options.annotations.validate()?;
        let signer = SignerKey::parse(key_pem)?;
        let signatures = self.fetch(digest).await?;

        let mut name_mismatch = None;
        let result = signer.find_signed(digest, &signatures, |payload| {
            if !options.annotations.matches(payload.annotations())? {
                return Ok(false);
            }
            if options.no_verify_name || payload.signed_name() == Some(reference) {
                return Ok(true);
            }
            name_mismatch.get_or_insert_with(|| payload.signed_name().unwrap_or_default().to_string());
            Ok(false)
        });

        match (result, name_mismatch) {
            (Ok(()), _) => Ok(()),
            (Err(SignatureError::AnnotationsUnmatched { .. }), Some(actual)) => {
                Err(SignatureError::SignedNameMismatch {
                    expected: reference.to_string(),
                    actual,
                })
            }
            (Err(err), _) => Err(err),
        }
    }
}
