//! Re-evaluation of denied apps after a role authorization changes.
//!
//! # Purpose
//! When an authorization is created or updated, apps in its scope that show
//! denied permissions and whose image it now names get their permission
//! generation stamp reset to `-1`, forcing a full re-check (signatures
//! included) on their next evaluation.
//!
//! # Key invariants
//! - Only name patterns decide which apps are bumped; signature state does
//!   not change when policy changes.
//! - Each app's status write is independent. A conflict re-reads and retries
//!   that app alone.
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::model::{
    AppInstance, ClusterImageRoleAuthorizationRecord, ImageRoleAuthorization,
    ImageRoleAuthorizationRecord, ImageSelector,
};
use crate::observability::APPS_BUMPED;
use crate::rules::ImageIdentity;
use crate::store::{ObjectKey, StoreError};
use tracing::{debug, error, info};

/// Outcome of one bump pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BumpReport {
    /// Apps in scope that were looked at.
    pub scanned: usize,
    /// Apps whose generation stamp was reset.
    pub bumped: Vec<ObjectKey>,
}

impl Engine {
    pub async fn bump_image_role_authorizations(
        &self,
        record: &ImageRoleAuthorizationRecord,
    ) -> EngineResult<BumpReport> {
        let authorization = ImageRoleAuthorization::from(record.clone());
        let report = self.bump_apps_for_authorization(&authorization).await?;
        self.store
            .update_image_role_authorization_status(
                &ObjectKey::new(&record.namespace, &record.name),
                record.generation,
            )
            .await?;
        Ok(report)
    }

    pub async fn bump_cluster_image_role_authorizations(
        &self,
        record: &ClusterImageRoleAuthorizationRecord,
    ) -> EngineResult<BumpReport> {
        let authorization = ImageRoleAuthorization::from(record.clone());
        let report = self.bump_apps_for_authorization(&authorization).await?;
        self.store
            .update_cluster_image_role_authorization_status(&record.name, record.generation)
            .await?;
        Ok(report)
    }

    async fn bump_apps_for_authorization(
        &self,
        authorization: &ImageRoleAuthorization,
    ) -> EngineResult<BumpReport> {
        let selector = authorization.image_selector.name_patterns_only();
        let apps = self.store.list_apps(authorization.namespace()).await?;
        let mut report = BumpReport::default();
        let mut first_error = None;

        for app in apps {
            if !app.has_denials() {
                continue;
            }
            report.scanned += 1;
            let key = ObjectKey::new(&app.namespace, &app.name);
            let covered = match self.authorization_names_app(&app, &selector).await {
                Ok(covered) => covered,
                Err(err) => {
                    error!(app = %key, error = %err, "failed to match app against authorization");
                    first_error.get_or_insert(err);
                    continue;
                }
            };
            if !covered {
                continue;
            }
            match self.reset_permissions_generation(app).await {
                Ok(true) => {
                    metrics::counter!(APPS_BUMPED).increment(1);
                    info!(
                        app = %key,
                        authorization = %authorization.display_name(),
                        "app bumped for permission re-evaluation"
                    );
                    report.bumped.push(key);
                }
                Ok(false) => {}
                Err(err) => {
                    error!(app = %key, error = %err, "failed to bump app");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Whether `selector` names the app's active or staged image.
    async fn authorization_names_app(
        &self,
        app: &AppInstance,
        selector: &ImageSelector,
    ) -> EngineResult<bool> {
        let mut images = vec![&app.status.app_image];
        if app.status.staged.app_image.digest != app.status.app_image.digest {
            images.push(&app.status.staged.app_image);
        }
        for image in images.into_iter().filter(|image| !image.is_empty()) {
            let image_name = app.policy_image_name(image);
            let identity = ImageIdentity::new(&image_name, &image.digest);
            match self.match_image(&app.namespace, &identity, selector).await {
                Ok(()) => return Ok(true),
                Err(EngineError::NoMatch(no_match)) => {
                    debug!(app = %app.name, reason = %no_match, "authorization does not name app image");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(false)
    }

    /// Writes `permissionsObservedGeneration = -1`, re-reading on conflict.
    ///
    /// Returns `false` when the app no longer shows denials after a re-read.
    async fn reset_permissions_generation(&self, mut app: AppInstance) -> EngineResult<bool> {
        let key = ObjectKey::new(&app.namespace, &app.name);
        let attempts = self.config.bump_conflict_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            app.status.staged.permissions_observed_generation = -1;
            match self.store.update_app_status(&app).await {
                Ok(_) => return Ok(true),
                Err(StoreError::Conflict(reason)) if attempt < attempts => {
                    debug!(app = %key, attempt, reason = %reason, "status conflict, re-reading app");
                    app = self.store.get_app(&key).await?;
                    if !app.has_denials() {
                        return Ok(false);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
