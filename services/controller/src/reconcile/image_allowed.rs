use crate::engine::Engine;
use crate::error::EngineResult;
use crate::model::AppInstance;
use crate::rules::ImageIdentity;
use tracing::info;

impl Engine {
    /// Records on `app` whether its staged image may run.
    ///
    /// Runs only for a staged image that differs from the active one while
    /// the generation stamp is stale. Denials become `imageAllowed: false`;
    /// lookup failures are returned for the caller to retry.
    pub async fn check_app_image_allowed(&self, app: &mut AppInstance) -> EngineResult<()> {
        let staged = &app.status.staged;
        if staged.app_image.id.is_empty()
            || staged.app_image.digest == app.status.app_image.digest
            || staged.permissions_observed_generation == app.generation
        {
            return Ok(());
        }
        if !self.config.features.image_allow_rules {
            app.status.staged.image_allowed = None;
            return Ok(());
        }

        let image = staged.app_image.clone();
        let image_name = app.policy_image_name(&image);
        let identity = ImageIdentity::new(&image_name, &image.digest).resolved_as(&image.id);
        match self.check_image_allowed(&app.namespace, &identity).await {
            Ok(()) => {
                app.status.staged.image_allowed = Some(true);
                Ok(())
            }
            Err(err) if err.is_policy_denial() => {
                info!(
                    namespace = %app.namespace,
                    app = %app.name,
                    image = %image_name,
                    reason = %err,
                    "staged image not allowed"
                );
                app.status.staged.image_allowed = Some(false);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
