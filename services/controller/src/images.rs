//! Image metadata contract.
//!
//! # Purpose
//! The engine learns an image's local ID, digest and self-declared
//! permissions through [`ImageCatalog`]. [`InMemoryImageCatalog`] models a
//! per-namespace local image store in front of a remote registry: lookups go
//! local ID → local tag → remote reference, so an image deleted locally but
//! still pushed keeps resolving by tag.
use crate::model::{AppImage, ImageDetails};
use async_trait::async_trait;
use stagegate_authz::{AuthzError, ImageReference, is_image_id};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    InvalidReference(#[from] AuthzError),
    #[error("image lookup failed: {0}")]
    Unavailable(#[from] anyhow::Error),
}

pub type ImageResult<T> = Result<T, ImageError>;

#[async_trait]
pub trait ImageCatalog: Send + Sync {
    /// Resolves `reference` (local ID, tag or remote reference) as seen from
    /// `namespace`. `AppImage.name` echoes the reference.
    async fn resolve(&self, namespace: &str, reference: &str) -> ImageResult<AppImage>;

    /// Authoritative details of the image `reference` resolves to. Nested
    /// images are only populated when `include_nested` is set.
    async fn image_details(
        &self,
        namespace: &str,
        reference: &str,
        include_nested: bool,
    ) -> ImageResult<ImageDetails>;
}

#[derive(Debug, Clone)]
struct LocalImage {
    details: ImageDetails,
    tags: Vec<String>,
}

#[derive(Clone, Default)]
pub struct InMemoryImageCatalog {
    /// Local images keyed by namespace, then by image ID.
    local: Arc<RwLock<HashMap<String, HashMap<String, LocalImage>>>>,
    /// Remote references (tags and `repo@digest`) to digests.
    remote_refs: Arc<RwLock<HashMap<String, String>>>,
    /// Remote image contents keyed by digest.
    remote_blobs: Arc<RwLock<HashMap<String, ImageDetails>>>,
}

impl InMemoryImageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `details` locally in `namespace` under `details.app_image.id`.
    pub async fn add_local<I, S>(&self, namespace: &str, details: ImageDetails, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = details.app_image.id.clone();
        let tags = tags.into_iter().map(Into::into).collect();
        self.local
            .write()
            .await
            .entry(namespace.to_string())
            .or_default()
            .insert(id, LocalImage { details, tags });
    }

    /// Pushes a local image to `tag` on the remote registry.
    pub async fn push(&self, namespace: &str, id: &str, tag: &str) -> ImageResult<()> {
        let reference = ImageReference::parse(tag)?;
        let details = {
            let local = self.local.read().await;
            local
                .get(namespace)
                .and_then(|images| images.get(id))
                .map(|image| image.details.clone())
                .ok_or_else(|| ImageError::NotFound(format!("{namespace}/{id}")))?
        };
        let digest = details.app_image.digest.clone();
        let mut refs = self.remote_refs.write().await;
        refs.insert(tag.to_string(), digest.clone());
        refs.insert(reference.digest_qualified(&digest), digest.clone());
        drop(refs);
        self.remote_blobs.write().await.insert(digest, details);
        Ok(())
    }

    pub async fn delete_local(&self, namespace: &str, id: &str) -> ImageResult<()> {
        self.local
            .write()
            .await
            .get_mut(namespace)
            .and_then(|images| images.remove(id))
            .map(|_| ())
            .ok_or_else(|| ImageError::NotFound(format!("{namespace}/{id}")))
    }

    /// Removes a digest and every remote reference to it.
    pub async fn delete_remote_digest(&self, digest: &str) {
        self.remote_refs
            .write()
            .await
            .retain(|_, target| target != digest);
        self.remote_blobs.write().await.remove(digest);
    }

    async fn find_local(&self, namespace: &str, reference: &str) -> Option<ImageDetails> {
        let local = self.local.read().await;
        let images = local.get(namespace)?;
        if let Some(image) = images.get(reference) {
            return Some(image.details.clone());
        }
        images
            .values()
            .find(|image| image.tags.iter().any(|tag| tag == reference))
            .map(|image| image.details.clone())
    }

    async fn find_remote(&self, reference: &str) -> ImageResult<Option<ImageDetails>> {
        let digest = if is_image_id(reference) {
            format!("sha256:{reference}")
        } else {
            let parsed = ImageReference::parse(reference)?;
            match parsed.digest() {
                Some(digest) => digest.to_string(),
                None => match self.remote_refs.read().await.get(reference) {
                    Some(digest) => digest.clone(),
                    None => return Ok(None),
                },
            }
        };
        let blobs = self.remote_blobs.read().await;
        Ok(blobs.get(&digest).map(|details| {
            let mut details = details.clone();
            details.app_image.id = digest.trim_start_matches("sha256:").to_string();
            details
        }))
    }

    async fn lookup(&self, namespace: &str, reference: &str) -> ImageResult<ImageDetails> {
        let found = match self.find_local(namespace, reference).await {
            Some(details) => Some(details),
            None => self.find_remote(reference).await?,
        };
        let mut details = found.ok_or_else(|| ImageError::NotFound(reference.to_string()))?;
        details.app_image.name = reference.to_string();
        Ok(details)
    }
}

#[async_trait]
impl ImageCatalog for InMemoryImageCatalog {
    async fn resolve(&self, namespace: &str, reference: &str) -> ImageResult<AppImage> {
        Ok(self.lookup(namespace, reference).await?.app_image)
    }

    async fn image_details(
        &self,
        namespace: &str,
        reference: &str,
        include_nested: bool,
    ) -> ImageResult<ImageDetails> {
        let mut details = self.lookup(namespace, reference).await?;
        if !include_nested {
            details.nested_images.clear();
        }
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NestedImage;

    fn image(id_byte: &str, digest_byte: &str) -> ImageDetails {
        ImageDetails {
            app_image: AppImage {
                id: id_byte.repeat(32),
                name: String::new(),
                digest: format!("sha256:{}", digest_byte.repeat(32)),
            },
            permissions: Vec::new(),
            nested_images: vec![NestedImage {
                name: "child".to_string(),
                image_name: "reg/child:v1".to_string(),
                digest: format!("sha256:{}", "cd".repeat(32)),
                permissions: Vec::new(),
            }],
            signature_digest: String::new(),
        }
    }

    #[tokio::test]
    async fn resolves_by_id_then_tag_then_remote() {
        let catalog = InMemoryImageCatalog::new();
        let details = image("aa", "bb");
        let id = details.app_image.id.clone();
        catalog.add_local("acme", details.clone(), ["app:dev"]).await;
        catalog
            .push("acme", &id, "reg.example.io/test:ci")
            .await
            .expect("push");

        let by_id = catalog.resolve("acme", &id).await.expect("by id");
        assert_eq!(by_id.id, id);
        let by_tag = catalog.resolve("acme", "app:dev").await.expect("by tag");
        assert_eq!(by_tag.digest, details.app_image.digest);
        assert_eq!(by_tag.name, "app:dev");

        let other_namespace = catalog
            .resolve("globex", "reg.example.io/test:ci")
            .await
            .expect("remote");
        assert_eq!(other_namespace.digest, details.app_image.digest);
    }

    #[tokio::test]
    async fn local_delete_falls_through_to_remote() {
        let catalog = InMemoryImageCatalog::new();
        let details = image("aa", "bb");
        let id = details.app_image.id.clone();
        catalog.add_local("acme", details.clone(), Vec::<String>::new()).await;
        catalog
            .push("acme", &id, "reg.example.io/test:ci")
            .await
            .expect("push");
        catalog.delete_local("acme", &id).await.expect("delete");

        let resolved = catalog
            .resolve("acme", "reg.example.io/test:ci")
            .await
            .expect("remote tag");
        assert_eq!(resolved.digest, details.app_image.digest);

        catalog.delete_remote_digest(&details.app_image.digest).await;
        let err = catalog
            .resolve("acme", "reg.example.io/test:ci")
            .await
            .expect_err("gone");
        assert!(matches!(err, ImageError::NotFound(_)));
        let err = catalog.resolve("acme", &id).await.expect_err("gone by id");
        assert!(matches!(err, ImageError::NotFound(_)));
    }

    #[tokio::test]
    async fn nested_images_only_on_request() {
        let catalog = InMemoryImageCatalog::new();
        let details = image("aa", "bb");
        let id = details.app_image.id.clone();
        catalog.add_local("acme", details, Vec::<String>::new()).await;

        let shallow = catalog.image_details("acme", &id, false).await.expect("details");
        assert!(shallow.nested_images.is_empty());
        let deep = catalog.image_details("acme", &id, true).await.expect("details");
        assert_eq!(deep.nested_images.len(), 1);
    }

    #[tokio::test]
    async fn malformed_reference_is_rejected() {
        let catalog = InMemoryImageCatalog::new();
        let err = catalog
            .resolve("acme", "Reg/UPPER:tag")
            .await
            .expect_err("invalid");
        assert!(matches!(err, ImageError::InvalidReference(_)));
    }
}
