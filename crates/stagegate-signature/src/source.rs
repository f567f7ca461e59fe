//! Where signatures come from.
//!
//! A registry stores signatures as artifacts attached to a manifest digest. The
//! verifier only needs to enumerate them, so the transport is a single-method
//! trait; [`MemorySignatureStore`] backs tests and single-process deployments.
use crate::SignatureResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A detached signature over a simple-signing payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSignature {
    /// Payload JSON exactly as signed.
    pub payload: String,
    /// Base64 Ed25519 signature over `payload`.
    pub signature: String,
}

#[async_trait]
pub trait SignatureSource: Send + Sync {
    /// Every signature attached to `digest`, in registry order.
    async fn signatures(&self, digest: &str) -> SignatureResult<Vec<ImageSignature>>;
}

#[derive(Clone, Default)]
pub struct MemorySignatureStore {
    /// Signatures keyed by manifest digest.
    signatures: Arc<RwLock<HashMap<String, Vec<ImageSignature>>>>,
}

impl MemorySignatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, digest: &str, signature: ImageSignature) {
        let mut guard = self.signatures.write().await;
        guard.entry(digest.to_string()).or_default().push(signature);
    }
}

#[async_trait]
impl SignatureSource for MemorySignatureStore {
    async fn signatures(&self, digest: &str) -> SignatureResult<Vec<ImageSignature>> {
        let guard = self.signatures.read().await;
        Ok(guard.get(digest).cloned().unwrap_or_default())
    }
}
