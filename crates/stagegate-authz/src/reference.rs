//! Image reference parsing.
//!
//! References take the form `repository[:tag][@digest]`. No registry or tag
//! defaulting is applied: `alpine` stays `alpine`, so name patterns see exactly
//! what the user wrote.
use crate::{AuthzError, AuthzResult};
use std::fmt;
use std::str::FromStr;

const DIGEST_ALGORITHM: &str = "sha256:";
const HEX_LENGTH: usize = 64;

fn is_lower_hex(value: &str) -> bool {
    value
        .bytes()
        .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte))
}

/// A bare content-addressed image ID (64 lowercase hex characters).
pub fn is_image_id(value: &str) -> bool {
    value.len() == HEX_LENGTH && is_lower_hex(value)
}

/// A `sha256:<hex>` digest.
pub fn is_digest(value: &str) -> bool {
    value
        .strip_prefix(DIGEST_ALGORITHM)
        .is_some_and(is_image_id)
}

pub fn validate_digest(value: &str) -> AuthzResult<()> {
    if is_digest(value) {
        Ok(())
    } else {
        Err(AuthzError::InvalidDigest(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    pub fn parse(reference: &str) -> AuthzResult<Self> {
        if reference.is_empty() {
            return Err(AuthzError::invalid_reference(reference, "empty reference"));
        }
        if reference.chars().any(char::is_whitespace) {
            return Err(AuthzError::invalid_reference(reference, "contains whitespace"));
        }

        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) => {
                validate_digest(digest)?;
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        let last_slash = name.rfind('/');
        let (repository, tag) = match name.rfind(':') {
            Some(colon) if last_slash.is_none_or(|slash| colon > slash) => {
                let tag = &name[colon + 1..];
                if tag.is_empty() {
                    return Err(AuthzError::invalid_reference(reference, "empty tag"));
                }
                (&name[..colon], Some(tag.to_string()))
            }
            _ => (name, None),
        };

        if repository.is_empty() || repository.starts_with('/') || repository.ends_with('/') {
            return Err(AuthzError::invalid_reference(reference, "empty repository"));
        }
        let path = match repository.split_once('/') {
            Some((host, path)) if host.contains(['.', ':']) || host == "localhost" => path,
            _ => repository,
        };
        if path.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(AuthzError::invalid_reference(
                reference,
                "repository must be lowercase",
            ));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// `repository@digest`, the tag-independent form of this image.
    pub fn digest_qualified(&self, digest: &str) -> String {
        format!("{}@{}", self.repository, digest)
    }
}

impl FromStr for ImageReference {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str =
        "sha256:3e1d1d40f2d9bd8bc3a2c6d43d8ec2a7c2e9f4f0a9cb6f38a2d4f10a0c0b1d2e";

    #[test]
    fn parse_tagged_reference() {
        let reference = ImageReference::parse("registry.example.com:5000/team/app:v1").expect("parse");
        assert_eq!(reference.repository(), "registry.example.com:5000/team/app");
        assert_eq!(reference.tag(), Some("v1"));
        assert_eq!(reference.digest(), None);
        assert_eq!(reference.to_string(), "registry.example.com:5000/team/app:v1");
    }

    #[test]
    fn parse_registry_port_without_tag() {
        let reference = ImageReference::parse("localhost:5000/app").expect("parse");
        assert_eq!(reference.repository(), "localhost:5000/app");
        assert_eq!(reference.tag(), None);
    }

    #[test]
    fn parse_digest_reference() {
        let raw = format!("reg/test@{DIGEST}");
        let reference: ImageReference = raw.parse().expect("parse");
        assert_eq!(reference.repository(), "reg/test");
        assert_eq!(reference.digest(), Some(DIGEST));
        assert_eq!(reference.to_string(), raw);
    }

    #[test]
    fn digest_qualified_drops_tag() {
        let reference = ImageReference::parse("reg/test:ci").expect("parse");
        assert_eq!(reference.digest_qualified(DIGEST), format!("reg/test@{DIGEST}"));
    }

    #[test]
    fn rejects_malformed_references() {
        for raw in ["", "reg/test:", "Reg/Test", "reg/test@md5:abc", "reg /test", "/test"] {
            assert!(ImageReference::parse(raw).is_err(), "{raw:?} should fail");
        }
    }

    #[test]
    fn image_id_and_digest_detection() {
        let id = &DIGEST["sha256:".len()..];
        assert!(is_image_id(id));
        assert!(!is_image_id(DIGEST));
        assert!(is_digest(DIGEST));
        assert!(!is_digest(id));
        assert!(ImageReference::parse(id).is_ok());
    }
}
