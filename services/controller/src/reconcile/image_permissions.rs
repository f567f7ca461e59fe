//! Staging, permission checks and promotion of app images.
//!
//! # Purpose
//! Moves an app through its staging lifecycle:
//! `Unstaged → Staged(pending) → Staged(checked, missing > 0) |
//! Staged(checked, missing = 0) → Promoted`.
//!
//! # Key invariants
//! - The permission check is skipped while the generation stamp equals the
//!   app generation or the staged digest equals the active digest.
//! - Promotion requires a completed check with nothing missing, no recorded
//!   denial, and an allow decision that is not `false`.
//! - Declared permissions are fetched by the staged image's ID; a different
//!   digest than the staged one is a race and is returned as a transient error.
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::model::{AppInstance, AppStaged, ImageDetails};
use crate::observability::{PERMISSION_CHECKS, PROMOTIONS};
use crate::rules::ImageIdentity;
use stagegate_authz::{PermissionSet, PolicyRule, grants_all, simplify_set};
use stagegate_signature::SignatureRules;
use tracing::{debug, info};

/// One image of a staged tree: the parent or a nested image.
struct DeclaringImage {
    name: String,
    digest: String,
    permissions: Vec<PermissionSet>,
}

fn declaring_images(parent_name: &str, details: &ImageDetails) -> Vec<DeclaringImage> {
    let mut images = vec![DeclaringImage {
        name: parent_name.to_string(),
        digest: details.app_image.digest.clone(),
        permissions: details.permissions.clone(),
    }];
    images.extend(details.nested_images.iter().map(|nested| DeclaringImage {
        name: nested.image_name.clone(),
        digest: nested.digest.clone(),
        permissions: nested.qualified_permissions(),
    }));
    images
}

/// `sets` re-attributed to `service_name`.
pub(crate) fn retag(sets: &[PermissionSet], service_name: &str) -> Vec<PermissionSet> {
    sets.iter()
        .map(|set| set.with_service_name(service_name))
        .collect()
}

/// The rules of `sets` that use `api_group`, per service.
fn rules_using_group(sets: &[PermissionSet], api_group: &str) -> Vec<PermissionSet> {
    sets.iter()
        .filter_map(|set| {
            let rules: Vec<PolicyRule> = set
                .rules
                .iter()
                .filter(|rule| rule.api_groups.iter().any(|group| group == api_group))
                .cloned()
                .collect();
            (!rules.is_empty()).then(|| PermissionSet::new(set.service_name.clone(), rules))
        })
        .collect()
}

impl Engine {
    /// Resolves `spec.image` and resets staging when it names a new digest.
    pub async fn stage_app_image(&self, app: &mut AppInstance) -> EngineResult<()> {
        let resolved = self.images.resolve(&app.namespace, &app.spec.image).await?;
        let staged = &mut app.status.staged;
        if resolved.digest == staged.app_image.digest {
            staged.app_image = resolved;
            return Ok(());
        }

        debug!(
            namespace = %app.namespace,
            app = %app.name,
            digest = %resolved.digest,
            "staging image"
        );
        if resolved.digest == app.status.app_image.digest {
            // Back to the active image, which already passed its checks.
            *staged = AppStaged {
                permissions_checked: true,
                permissions_observed_generation: app.generation,
                ..AppStaged::for_image(resolved)
            };
        } else {
            *staged = AppStaged::for_image(resolved);
        }
        Ok(())
    }

    /// Compares the staged image's declared permissions with what the user
    /// granted and, when enabled, with what policy authorizes.
    pub async fn check_image_permissions(&self, app: &mut AppInstance) -> EngineResult<()> {
        let staged = app.status.staged.app_image.clone();
        if staged.id.is_empty()
            || staged.digest == app.status.app_image.digest
            || app.status.staged.permissions_observed_generation == app.generation
        {
            return Ok(());
        }

        let details = self
            .images
            .image_details(&app.namespace, &staged.id, true)
            .await?;
        if details.app_image.digest != staged.digest {
            return Err(EngineError::DigestMismatch {
                image: staged.id.clone(),
                expected: staged.digest.clone(),
                actual: details.app_image.digest.clone(),
            });
        }

        let parent_name = app.policy_image_name(&staged);
        let images = declaring_images(&parent_name, &details);
        let mut denied = self.restricted_group_violations(&images).await?;
        if self.config.features.image_role_authorizations {
            denied.extend(self.unauthorized_permissions(&app.namespace, &images).await?);
        }

        let (missing, _) = grants_all(
            &app.namespace,
            &details.all_permissions(),
            &app.spec.permissions,
        );
        let outcome = if !missing.is_empty() {
            "missing"
        } else if !denied.is_empty() {
            "denied"
        } else {
            "granted"
        };
        metrics::counter!(PERMISSION_CHECKS, "outcome" => outcome).increment(1);
        info!(
            namespace = %app.namespace,
            app = %app.name,
            image = %parent_name,
            missing = missing.len(),
            denied = denied.len(),
            "image permissions checked"
        );

        let staged_status = &mut app.status.staged;
        staged_status.permissions_observed_generation = app.generation;
        staged_status.permissions_checked = true;
        staged_status.permissions_missing = missing;
        staged_status.image_permissions_denied = simplify_set(&denied);
        Ok(())
    }

    /// Declared permissions of each image not covered by what policy
    /// authorizes for that image's own name and digest.
    async fn unauthorized_permissions(
        &self,
        namespace: &str,
        images: &[DeclaringImage],
    ) -> EngineResult<Vec<PermissionSet>> {
        let mut denied = Vec::new();
        for image in images {
            if image.permissions.is_empty() {
                continue;
            }
            let identity = ImageIdentity::new(&image.name, &image.digest);
            let authorized = self.get_authorized_permissions(namespace, &identity).await?;
            for set in &image.permissions {
                let (missing, ok) = grants_all(
                    namespace,
                    std::slice::from_ref(set),
                    &retag(&authorized, &set.service_name),
                );
                if !ok {
                    debug!(image = %image.name, service = %set.service_name, "permissions not authorized");
                    denied.extend(missing);
                }
            }
        }
        Ok(denied)
    }

    /// Rules using a restricted API group from images not signed by that
    /// group's key. Signed parents vouch for their nested images.
    async fn restricted_group_violations(
        &self,
        images: &[DeclaringImage],
    ) -> EngineResult<Vec<PermissionSet>> {
        let mut violations = Vec::new();
        let Some(parent) = images.first() else {
            return Ok(violations);
        };

        for (api_group, key) in &self.config.restricted_api_groups {
            let users: Vec<(&DeclaringImage, Vec<PermissionSet>)> = images
                .iter()
                .map(|image| (image, rules_using_group(&image.permissions, api_group)))
                .filter(|(_, rules)| !rules.is_empty())
                .collect();
            if users.is_empty() {
                continue;
            }
            if self.signed_by(&parent.digest, api_group, key).await? {
                debug!(api_group = %api_group, image = %parent.name, "parent image signed for restricted group");
                continue;
            }
            for (image, rules) in users {
                if !self.signed_by(&image.digest, api_group, key).await? {
                    info!(api_group = %api_group, image = %image.name, "image not authorized for restricted group");
                    violations.extend(rules);
                }
            }
        }
        Ok(violations)
    }

    async fn signed_by(&self, digest: &str, api_group: &str, key: &str) -> EngineResult<bool> {
        let rules = [SignatureRules::signed_by_all(vec![key.to_string()])];
        match self.verifier.verify(digest, &rules).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_verification_failure() => Ok(false),
            Err(err) if err.is_invalid_policy() => Err(EngineError::invalid_policy(
                format!("restricted API group {api_group}"),
                err,
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// Promotes the staged image to active when its checks passed.
    ///
    /// Returns whether the active image changed.
    pub fn copy_promote_staged_app_image(&self, app: &mut AppInstance) -> bool {
        let staged = &app.status.staged;
        let ready = !staged.app_image.id.is_empty()
            && staged.permissions_checked
            && staged.permissions_missing.is_empty()
            && staged.image_permissions_denied.is_empty()
            && !(self.config.features.image_allow_rules && staged.image_allowed == Some(false));
        if !ready || staged.app_image.digest == app.status.app_image.digest {
            return false;
        }

        app.status.app_image = staged.app_image.clone();
        app.status.permissions = simplify_set(&app.spec.permissions);
        metrics::counter!(PROMOTIONS).increment(1);
        info!(
            namespace = %app.namespace,
            app = %app.name,
            digest = %app.status.app_image.digest,
            "staged image promoted"
        );
        true
    }
}
