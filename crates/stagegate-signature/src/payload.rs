//! Simple-signing payload: the document a signature is computed over.
//!
//! The payload binds a manifest digest, never a tag, so a signature stays valid
//! when tags move and cannot be replayed onto different content.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PAYLOAD_TYPE: &str = "cosign container image signature";

/// Annotation recording the reference an image was signed under.
pub const SIGNED_NAME_ANNOTATION: &str = "stagegate.io/signed-name";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleSigningPayload {
    pub critical: Critical,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critical {
    pub identity: Identity,
    pub image: ImageIdentity,
    #[serde(rename = "type")]
    pub payload_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "docker-reference")]
    pub docker_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageIdentity {
    #[serde(rename = "docker-manifest-digest")]
    pub docker_manifest_digest: String,
}

impl SimpleSigningPayload {
    pub fn new(
        repository: impl Into<String>,
        digest: impl Into<String>,
        annotations: BTreeMap<String, String>,
    ) -> Self {
        Self {
            critical: Critical {
                identity: Identity {
                    docker_reference: repository.into(),
                },
                image: ImageIdentity {
                    docker_manifest_digest: digest.into(),
                },
                payload_type: PAYLOAD_TYPE.to_string(),
            },
            optional: annotations,
        }
    }

    pub fn digest(&self) -> &str {
        &self.critical.image.docker_manifest_digest
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.optional
    }

    pub fn signed_name(&self) -> Option<&str> {
        self.optional.get(SIGNED_NAME_ANNOTATION).map(String::as_str)
    }
}
