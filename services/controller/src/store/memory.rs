//! In-memory implementation of the policy store.
//!
//! # Purpose
//! Implements [`PolicyStore`] with `HashMap`s guarded by `tokio::sync::RwLock`
//! for tests and single-process deployments. Seeding methods stand in for the
//! API server writes a controller would normally observe.
//!
//! # Consistency
//! - Every app write bumps `resource_version`; status updates presenting a
//!   stale version fail with `StoreError::Conflict`.
//! - Spec writes (`update_app_spec`, `put_*` on authorizations) bump
//!   `generation`; status writes never do.
//! - Not durable.
use super::{ObjectKey, PolicyStore, StoreError, StoreResult};
use crate::model::{
    AppInstance, AppSpec, ClusterImageRoleAuthorizationRecord, ImageAllowRule,
    ImageRoleAuthorizationRecord, Role, ServiceInstance,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryStore {
    /// Allow rules keyed by `(namespace, name)`.
    allow_rules: Arc<RwLock<HashMap<ObjectKey, ImageAllowRule>>>,
    /// Project role authorizations keyed by `(namespace, name)`.
    role_authorizations: Arc<RwLock<HashMap<ObjectKey, ImageRoleAuthorizationRecord>>>,
    /// Cluster role authorizations keyed by name.
    cluster_role_authorizations: Arc<RwLock<HashMap<String, ClusterImageRoleAuthorizationRecord>>>,
    /// Roles keyed by `(namespace, name)`.
    roles: Arc<RwLock<HashMap<ObjectKey, Role>>>,
    /// Cluster roles keyed by name.
    cluster_roles: Arc<RwLock<HashMap<String, Role>>>,
    /// Apps keyed by `(namespace, name)`.
    apps: Arc<RwLock<HashMap<ObjectKey, AppInstance>>>,
    /// Services keyed by `(namespace, name)`.
    services: Arc<RwLock<HashMap<ObjectKey, ServiceInstance>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_allow_rule(&self, rule: ImageAllowRule) {
        let key = ObjectKey::new(&rule.namespace, &rule.name);
        self.allow_rules.write().await.insert(key, rule);
    }

    pub async fn delete_allow_rule(&self, key: &ObjectKey) -> StoreResult<()> {
        self.allow_rules
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("image allow rule {key}")))
    }

    /// Creates or replaces an authorization, bumping its generation.
    pub async fn put_image_role_authorization(
        &self,
        mut record: ImageRoleAuthorizationRecord,
    ) -> ImageRoleAuthorizationRecord {
        let key = ObjectKey::new(&record.namespace, &record.name);
        let mut records = self.role_authorizations.write().await;
        match records.get(&key) {
            Some(existing) => {
                record.generation = existing.generation + 1;
                record.observed_generation = existing.observed_generation;
            }
            None => {
                record.generation = 1;
                record.observed_generation = 0;
            }
        }
        records.insert(key, record.clone());
        record
    }

    pub async fn delete_image_role_authorization(&self, key: &ObjectKey) -> StoreResult<()> {
        self.role_authorizations
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("image role authorization {key}")))
    }

    /// Creates or replaces a cluster authorization, bumping its generation.
    pub async fn put_cluster_image_role_authorization(
        &self,
        mut record: ClusterImageRoleAuthorizationRecord,
    ) -> ClusterImageRoleAuthorizationRecord {
        let mut records = self.cluster_role_authorizations.write().await;
        match records.get(&record.name) {
            Some(existing) => {
                record.generation = existing.generation + 1;
                record.observed_generation = existing.observed_generation;
            }
            None => {
                record.generation = 1;
                record.observed_generation = 0;
            }
        }
        records.insert(record.name.clone(), record.clone());
        record
    }

    pub async fn put_role(&self, role: Role) {
        let key = ObjectKey::new(&role.namespace, &role.name);
        self.roles.write().await.insert(key, role);
    }

    pub async fn put_cluster_role(&self, role: Role) {
        self.cluster_roles
            .write()
            .await
            .insert(role.name.clone(), role);
    }

    pub async fn create_app(&self, mut app: AppInstance) -> StoreResult<AppInstance> {
        let key = ObjectKey::new(&app.namespace, &app.name);
        let mut apps = self.apps.write().await;
        if apps.contains_key(&key) {
            return Err(StoreError::Conflict(format!("app {key} exists")));
        }
        app.generation = app.generation.max(1);
        app.resource_version = 1;
        apps.insert(key, app.clone());
        Ok(app)
    }

    /// Replaces an app's spec, bumping generation and resource version.
    pub async fn update_app_spec(&self, key: &ObjectKey, spec: AppSpec) -> StoreResult<AppInstance> {
        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(format!("app {key}")))?;
        app.spec = spec;
        app.generation += 1;
        app.resource_version += 1;
        Ok(app.clone())
    }

    pub async fn put_service(&self, service: ServiceInstance) {
        let key = ObjectKey::new(&service.namespace, &service.name);
        self.services.write().await.insert(key, service);
    }
}

#[async_trait]
impl PolicyStore for InMemoryStore {
    async fn list_image_allow_rules(&self, namespace: &str) -> StoreResult<Vec<ImageAllowRule>> {
        let mut rules: Vec<ImageAllowRule> = self
            .allow_rules
            .read()
            .await
            .values()
            .filter(|rule| rule.namespace == namespace)
            .cloned()
            .collect();
        rules.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(rules)
    }

    async fn list_image_role_authorizations(
        &self,
        namespace: &str,
    ) -> StoreResult<Vec<ImageRoleAuthorizationRecord>> {
        let mut records: Vec<ImageRoleAuthorizationRecord> = self
            .role_authorizations
            .read()
            .await
            .values()
            .filter(|record| record.namespace == namespace)
            .cloned()
            .collect();
        records.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(records)
    }

    async fn get_image_role_authorization(
        &self,
        key: &ObjectKey,
    ) -> StoreResult<ImageRoleAuthorizationRecord> {
        self.role_authorizations
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("image role authorization {key}")))
    }

    async fn update_image_role_authorization_status(
        &self,
        key: &ObjectKey,
        observed_generation: i64,
    ) -> StoreResult<()> {
        let mut records = self.role_authorizations.write().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(format!("image role authorization {key}")))?;
        record.observed_generation = observed_generation;
        Ok(())
    }

    async fn list_cluster_image_role_authorizations(
        &self,
    ) -> StoreResult<Vec<ClusterImageRoleAuthorizationRecord>> {
        let mut records: Vec<ClusterImageRoleAuthorizationRecord> = self
            .cluster_role_authorizations
            .read()
            .await
            .values()
            .cloned()
            .collect();
        records.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(records)
    }

    async fn get_cluster_image_role_authorization(
        &self,
        name: &str,
    ) -> StoreResult<ClusterImageRoleAuthorizationRecord> {
        self.cluster_role_authorizations
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| {
                StoreError::NotFound(format!("cluster image role authorization {name}"))
            })
    }

    async fn update_cluster_image_role_authorization_status(
        &self,
        name: &str,
        observed_generation: i64,
    ) -> StoreResult<()> {
        let mut records = self.cluster_role_authorizations.write().await;
        let record = records.get_mut(name).ok_or_else(|| {
            StoreError::NotFound(format!("cluster image role authorization {name}"))
        })?;
        record.observed_generation = observed_generation;
        Ok(())
    }

    async fn get_role(&self, key: &ObjectKey) -> StoreResult<Role> {
        self.roles
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("role {key}")))
    }

    async fn get_cluster_role(&self, name: &str) -> StoreResult<Role> {
        self.cluster_roles
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("cluster role {name}")))
    }

    async fn list_apps(&self, namespace: Option<&str>) -> StoreResult<Vec<AppInstance>> {
        let mut apps: Vec<AppInstance> = self
            .apps
            .read()
            .await
            .values()
            .filter(|app| namespace.is_none_or(|namespace| app.namespace == namespace))
            .cloned()
            .collect();
        apps.sort_by(|left, right| left.key().cmp(&right.key()));
        Ok(apps)
    }

    async fn get_app(&self, key: &ObjectKey) -> StoreResult<AppInstance> {
        self.apps
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("app {key}")))
    }

    async fn update_app_status(&self, app: &AppInstance) -> StoreResult<AppInstance> {
        let key = ObjectKey::new(&app.namespace, &app.name);
        let mut apps = self.apps.write().await;
        let stored = apps
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(format!("app {key}")))?;
        if stored.resource_version != app.resource_version {
            return Err(StoreError::Conflict(format!(
                "app {key} at version {}, update based on {}",
                stored.resource_version, app.resource_version
            )));
        }
        stored.status = app.status.clone();
        stored.resource_version += 1;
        Ok(stored.clone())
    }

    async fn get_service(&self, key: &ObjectKey) -> StoreResult<ServiceInstance> {
        self.services
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("service {key}")))
    }
}
