use crate::engine::Engine;
use crate::error::EngineResult;
use crate::model::{AppInstance, Workload};
use crate::reconcile::image_permissions::retag;
use crate::rules::ImageIdentity;
use crate::store::{ObjectKey, StoreError};
use stagegate_authz::{PermissionSet, grants_all, simplify_set};
use tracing::info;

impl Engine {
    /// Rules `workload_name` needs because of the services it depends on.
    async fn workload_consumer_permissions(
        &self,
        app: &AppInstance,
        workload_name: &str,
        workload: &Workload,
    ) -> EngineResult<PermissionSet> {
        let mut result = PermissionSet::new(workload_name, Vec::new());
        for dependency in &workload.dependencies {
            if dependency.target_name.is_empty() {
                continue;
            }
            let key = ObjectKey::new(&app.status.namespace, &dependency.target_name);
            let service = match self.store.get_service(&key).await {
                Ok(service) => service,
                // Dependency ordering keeps the workload waiting until the service exists.
                Err(StoreError::NotFound(_)) => continue,
                Err(err) => return Err(err.into()),
            };
            if let Some(permissions) = service
                .consumer
                .as_ref()
                .and_then(|consumer| consumer.permissions.as_ref())
            {
                result.rules.extend(permissions.rules.iter().cloned());
            }
        }
        Ok(result)
    }

    /// One set per container, function and job holding the consumer rules of
    /// every service it depends on.
    pub async fn collect_consumer_permissions(
        &self,
        app: &AppInstance,
    ) -> EngineResult<Vec<PermissionSet>> {
        let mut result = Vec::new();
        for (name, workload) in app.status.app_spec.workloads() {
            result.push(self.workload_consumer_permissions(app, name, workload).await?);
        }
        Ok(result)
    }

    /// Consumer rules in `consumed` that policy does not authorize for the
    /// app's active image.
    async fn check_consumer_permissions_authorized(
        &self,
        app: &AppInstance,
        consumed: &[PermissionSet],
    ) -> EngineResult<Vec<PermissionSet>> {
        let image = &app.status.app_image;
        let authorized = if image.is_empty() {
            Vec::new()
        } else {
            let image_name = app.policy_image_name(image);
            let identity = ImageIdentity::new(&image_name, &image.digest);
            self.get_authorized_permissions(&app.namespace, &identity)
                .await?
        };

        let mut denied = Vec::new();
        for set in consumed {
            let (missing, ok) = grants_all(
                &app.status.namespace,
                std::slice::from_ref(set),
                &retag(&authorized, &set.service_name),
            );
            if !ok {
                denied.extend(missing);
            }
        }
        Ok(denied)
    }

    /// Merges newly required consumer permissions into `status.permissions`,
    /// or records them as denied when policy does not authorize them.
    pub async fn consumer_permissions(&self, app: &mut AppInstance) -> EngineResult<()> {
        let required = self.collect_consumer_permissions(app).await?;
        let (new_permissions, ok) = grants_all(&app.namespace, &required, &app.status.permissions);
        if ok {
            app.status.denied_consumer_permissions.clear();
            return Ok(());
        }

        if self.config.features.image_role_authorizations {
            let denied = self
                .check_consumer_permissions_authorized(app, &new_permissions)
                .await?;
            if !denied.is_empty() {
                info!(
                    namespace = %app.namespace,
                    app = %app.name,
                    services = denied.len(),
                    "consumer permissions denied"
                );
                app.status.denied_consumer_permissions = denied;
                return Ok(());
            }
        }

        app.status.denied_consumer_permissions.clear();
        let mut merged = app.status.permissions.clone();
        merged.extend(new_permissions);
        app.status.permissions = simplify_set(&merged);
        Ok(())
    }
}
