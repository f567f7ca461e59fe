#![allow(dead_code)]

use controller::images::InMemoryImageCatalog;
use controller::model::{AppImage, AppInstance, AppSpec, ImageDetails, NestedImage};
use controller::store::memory::InMemoryStore;
use controller::{Engine, EngineConfig, FeatureFlags};
use ed25519_dalek::SigningKey;
use stagegate_authz::{PermissionSet, PolicyRule};
use stagegate_signature::{MemorySignatureStore, sign_image};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const PROJECT: &str = "acme";

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<InMemoryStore>,
    pub images: Arc<InMemoryImageCatalog>,
    pub signatures: Arc<MemorySignatureStore>,
}

pub fn harness(config: EngineConfig) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let images = Arc::new(InMemoryImageCatalog::new());
    let signatures = Arc::new(MemorySignatureStore::new());
    let engine = Engine::new(store.clone(), images.clone(), signatures.clone(), config);
    Harness {
        engine,
        store,
        images,
        signatures,
    }
}

pub fn features(image_allow_rules: bool, image_role_authorizations: bool) -> EngineConfig {
    EngineConfig::default().with_features(FeatureFlags {
        image_allow_rules,
        image_role_authorizations,
    })
}

/// A `sha256:` digest made of one repeated hex byte.
pub fn digest(byte: &str) -> String {
    format!("sha256:{}", byte.repeat(32))
}

/// A 64-character image ID made of one repeated hex byte.
pub fn image_id(byte: &str) -> String {
    byte.repeat(32)
}

pub fn rule(api_group: &str) -> PolicyRule {
    PolicyRule::new(&[api_group], &["get", "list"], &["*"])
}

pub fn image(id_byte: &str, digest_byte: &str, permissions: Vec<PermissionSet>) -> ImageDetails {
    ImageDetails {
        app_image: AppImage {
            id: image_id(id_byte),
            name: String::new(),
            digest: digest(digest_byte),
        },
        permissions,
        nested_images: Vec::new(),
        signature_digest: String::new(),
    }
}

pub fn nested(name: &str, image_name: &str, child: &ImageDetails) -> NestedImage {
    NestedImage {
        name: name.to_string(),
        image_name: image_name.to_string(),
        digest: child.app_image.digest.clone(),
        permissions: child.permissions.clone(),
    }
}

pub fn app(namespace: &str, name: &str, image: &str, permissions: Vec<PermissionSet>) -> AppInstance {
    AppInstance::new(
        namespace,
        name,
        AppSpec {
            image: image.to_string(),
            permissions,
        },
    )
}

impl Harness {
    /// Stores `details` locally in `namespace` and pushes it to `tag`.
    pub async fn publish(&self, namespace: &str, details: &ImageDetails, tag: &str) {
        self.images
            .add_local(namespace, details.clone(), Vec::<String>::new())
            .await;
        self.images
            .push(namespace, &details.app_image.id, tag)
            .await
            .expect("push image");
    }

    pub async fn sign(&self, key: &SigningKey, reference: &str, digest: &str) {
        self.sign_with(key, reference, digest, BTreeMap::new()).await;
    }

    pub async fn sign_with(
        &self,
        key: &SigningKey,
        reference: &str,
        digest: &str,
        annotations: BTreeMap<String, String>,
    ) {
        let signature = sign_image(key, reference, digest, &annotations).expect("sign image");
        self.signatures.attach(digest, signature).await;
    }
}
