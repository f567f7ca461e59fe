//! Image selector matching.
//!
//! # Purpose
//! Decides whether an [`ImageSelector`] applies to an image. The name gate
//! compares patterns against every identity the image is known by; the
//! signature gate delegates to the signature verifier for the digest.
//!
//! # Key invariants
//! - A selector with no patterns and no signature rules matches every image.
//! - "Does not apply" is a typed [`NoMatchError`]; malformed selectors and
//!   lookup failures are distinct errors so callers can tell denial from
//!   failure.
//!
//! # Common pitfalls
//! - The local ID is only known after resolving the image, so a selector
//!   naming an ID stops matching once the image is gone everywhere.
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult, NoMatchError};
use crate::model::ImageSelector;
use stagegate_authz::{ImageReference, glob_match};
use tracing::debug;

/// One image as seen by the matcher.
#[derive(Debug, Clone, Copy)]
pub struct ImageIdentity<'a> {
    /// Name as the user wrote it: tag, reference or local ID.
    pub name: &'a str,
    /// Name the image was resolved through, if different.
    pub resolved_name: Option<&'a str>,
    /// Manifest digest; looked up when empty.
    pub digest: &'a str,
}

impl<'a> ImageIdentity<'a> {
    pub fn new(name: &'a str, digest: &'a str) -> Self {
        Self {
            name,
            resolved_name: None,
            digest,
        }
    }

    pub fn resolved_as(mut self, resolved_name: &'a str) -> Self {
        if !resolved_name.is_empty() && resolved_name != self.name {
            self.resolved_name = Some(resolved_name);
        }
        self
    }
}

fn push_unique(candidates: &mut Vec<String>, value: String) {
    if !value.is_empty() && !candidates.contains(&value) {
        candidates.push(value);
    }
}

/// Every identity a name pattern may match: the names, their digest-qualified
/// forms, the bare digest and the local ID.
fn candidate_names(image: &ImageIdentity<'_>, digest: &str, local_id: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    for name in std::iter::once(image.name).chain(image.resolved_name) {
        push_unique(&mut candidates, name.to_string());
        if !digest.is_empty()
            && let Ok(reference) = ImageReference::parse(name)
            && reference.digest().is_none()
        {
            push_unique(&mut candidates, reference.digest_qualified(digest));
        }
    }
    push_unique(&mut candidates, digest.to_string());
    push_unique(&mut candidates, local_id.to_string());
    candidates
}

fn pattern_matches(pattern: &str, candidate: &str) -> bool {
    pattern == candidate || glob_match(pattern, candidate)
}

impl Engine {
    /// `Ok(())` when `selector` applies to `image` in `namespace`.
    pub async fn match_image(
        &self,
        namespace: &str,
        image: &ImageIdentity<'_>,
        selector: &ImageSelector,
    ) -> EngineResult<()> {
        let resolved = self.images.resolve(namespace, image.name).await?;
        let digest = if image.digest.is_empty() {
            resolved.digest.as_str()
        } else {
            image.digest
        };

        if !selector.name_patterns.is_empty() {
            let candidates = candidate_names(image, digest, &resolved.id);
            let matched = selector.name_patterns.iter().find(|pattern| {
                candidates
                    .iter()
                    .any(|candidate| pattern_matches(pattern, candidate))
            });
            match matched {
                Some(pattern) => {
                    debug!(image = %image.name, pattern = %pattern, "name pattern matched");
                }
                None => {
                    return Err(NoMatchError::new(
                        image.name,
                        "namePatterns",
                        format!(
                            "none of {candidates:?} match {:?}",
                            selector.name_patterns
                        ),
                    )
                    .into());
                }
            }
        }

        if !selector.signatures.is_empty() {
            match self.verifier.verify(digest, &selector.signatures).await {
                Ok(rule) => {
                    debug!(image = %image.name, digest = %digest, rule = ?rule, "signature rules satisfied");
                }
                Err(err) if err.is_verification_failure() => {
                    return Err(NoMatchError::new(image.name, "signatures", err.to_string()).into());
                }
                Err(err) if err.is_invalid_policy() => {
                    return Err(EngineError::invalid_policy("imageSelector.signatures", err));
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }
}
