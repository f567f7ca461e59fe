use crate::config::EngineConfig;
use crate::images::ImageCatalog;
use crate::store::PolicyStore;
use stagegate_signature::{SignatureSource, SignatureVerifier};
use std::sync::Arc;

/// Evaluation entry points share this handle; it holds no mutable state.
#[derive(Clone)]
pub struct Engine {
    pub(crate) store: Arc<dyn PolicyStore>,
    pub(crate) images: Arc<dyn ImageCatalog>,
    pub(crate) verifier: SignatureVerifier,
    pub(crate) config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        images: Arc<dyn ImageCatalog>,
        signatures: Arc<dyn SignatureSource>,
        config: EngineConfig,
    ) -> Self {
        let verifier = SignatureVerifier::new(signatures, config.signature_match_mode);
        Self {
            store,
            images,
            verifier,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }
}
