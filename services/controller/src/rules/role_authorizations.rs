use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::model::{ImageRoleAuthorization, Role, RoleKind, RoleRef};
use crate::rules::ImageIdentity;
use crate::store::{ObjectKey, StoreError};
use stagegate_authz::{PermissionSet, PolicyRule};
use tracing::{debug, error, warn};

impl Engine {
    /// Project and cluster authorizations visible from `namespace`, merged.
    pub async fn list_role_authorizations(
        &self,
        namespace: &str,
    ) -> EngineResult<Vec<ImageRoleAuthorization>> {
        let mut authorizations: Vec<ImageRoleAuthorization> = self
            .store
            .list_image_role_authorizations(namespace)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        authorizations.extend(
            self.store
                .list_cluster_image_role_authorizations()
                .await?
                .into_iter()
                .map(ImageRoleAuthorization::from),
        );
        Ok(authorizations)
    }

    /// Permission sets that policy authorizes for `image` in `namespace`.
    ///
    /// Every returned set is named after the image; callers re-tag it per
    /// service before comparing. The union is returned unsimplified.
    pub async fn get_authorized_permissions(
        &self,
        namespace: &str,
        image: &ImageIdentity<'_>,
    ) -> EngineResult<Vec<PermissionSet>> {
        let authorizations = self.list_role_authorizations(namespace).await?;
        let mut permissions = Vec::new();

        for authorization in &authorizations {
            match self
                .match_image(namespace, image, &authorization.image_selector)
                .await
            {
                Ok(()) => {
                    debug!(
                        image = %image.name,
                        authorization = %authorization.display_name(),
                        "image role authorization matched"
                    );
                }
                Err(EngineError::NoMatch(no_match)) => {
                    debug!(
                        authorization = %authorization.display_name(),
                        reason = %no_match,
                        "image role authorization does not apply"
                    );
                    continue;
                }
                Err(err) if err.is_transient() => return Err(err),
                Err(err) => {
                    error!(
                        authorization = %authorization.display_name(),
                        image = %image.name,
                        error = %err,
                        "failed to match image role authorization"
                    );
                    continue;
                }
            }

            for role_ref in &authorization.roles.role_refs {
                let Some(role) = self.lookup_role(namespace, role_ref).await? else {
                    warn!(
                        role = %role_ref.name,
                        kind = ?role_ref.kind,
                        namespace = %namespace,
                        "role reference points to a missing role"
                    );
                    continue;
                };
                permissions.push(role_permissions(
                    &role,
                    image.name,
                    &authorization.roles.scopes,
                ));
            }
        }

        Ok(permissions)
    }

    async fn lookup_role(&self, namespace: &str, role_ref: &RoleRef) -> EngineResult<Option<Role>> {
        let found = match role_ref.kind {
            RoleKind::ClusterRole => self.store.get_cluster_role(&role_ref.name).await,
            RoleKind::Role => {
                self.store
                    .get_role(&ObjectKey::new(namespace, &role_ref.name))
                    .await
            }
        };
        match found {
            Ok(role) => Ok(Some(role)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// A role's rules as a set named `service_name`, each rule carrying `scopes`.
fn role_permissions(role: &Role, service_name: &str, scopes: &[String]) -> PermissionSet {
    let rules = role
        .rules
        .iter()
        .map(|rule| PolicyRule {
            scopes: scopes.to_vec(),
            ..rule.clone()
        })
        .collect();
    let name = if service_name.is_empty() {
        role.name.as_str()
    } else {
        service_name
    };
    PermissionSet::new(name, rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_rules_take_authorization_scopes() {
        let role = Role {
            namespace: String::new(),
            name: "admin".to_string(),
            rules: vec![
                PolicyRule::new(&["api.example.io"], &["get"], &["widgets"]).with_scopes(&["project"]),
            ],
        };
        let scopes = vec!["cluster".to_string()];
        let set = role_permissions(&role, "reg/app:v1", &scopes);
        assert_eq!(set.service_name, "reg/app:v1");
        assert_eq!(set.rules[0].scopes, scopes);

        let unnamed = role_permissions(&role, "", &[]);
        assert_eq!(unnamed.service_name, "admin");
        assert!(unnamed.rules[0].scopes.is_empty());
    }
}
