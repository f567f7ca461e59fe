use crate::model::{
    AppInstance, ClusterImageRoleAuthorizationRecord, ImageAllowRule,
    ImageRoleAuthorizationRecord, Role, ServiceInstance,
};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;

/// Key of a namespaced object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read access to policy objects and status writes for apps and authorizations.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn list_image_allow_rules(&self, namespace: &str) -> StoreResult<Vec<ImageAllowRule>>;

    async fn list_image_role_authorizations(
        &self,
        namespace: &str,
    ) -> StoreResult<Vec<ImageRoleAuthorizationRecord>>;
    async fn get_image_role_authorization(
        &self,
        key: &ObjectKey,
    ) -> StoreResult<ImageRoleAuthorizationRecord>;
    async fn update_image_role_authorization_status(
        &self,
        key: &ObjectKey,
        observed_generation: i64,
    ) -> StoreResult<()>;

    async fn list_cluster_image_role_authorizations(
        &self,
    ) -> StoreResult<Vec<ClusterImageRoleAuthorizationRecord>>;
    async fn get_cluster_image_role_authorization(
        &self,
        name: &str,
    ) -> StoreResult<ClusterImageRoleAuthorizationRecord>;
    async fn update_cluster_image_role_authorization_status(
        &self,
        name: &str,
        observed_generation: i64,
    ) -> StoreResult<()>;

    async fn get_role(&self, key: &ObjectKey) -> StoreResult<Role>;
    async fn get_cluster_role(&self, name: &str) -> StoreResult<Role>;

    /// Apps in `namespace`, or in every namespace when `None`.
    async fn list_apps(&self, namespace: Option<&str>) -> StoreResult<Vec<AppInstance>>;
    async fn get_app(&self, key: &ObjectKey) -> StoreResult<AppInstance>;
    /// Writes `app.status`; fails with `Conflict` if `app.resource_version` is stale.
    async fn update_app_status(&self, app: &AppInstance) -> StoreResult<AppInstance>;

    async fn get_service(&self, key: &ObjectKey) -> StoreResult<ServiceInstance>;
}
