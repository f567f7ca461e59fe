use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::model::ImageAllowRule;
use crate::observability::IMAGE_ALLOW_DECISIONS;
use crate::rules::ImageIdentity;
use tracing::{debug, error};

impl Engine {
    /// Whether `image` may run in `namespace`.
    ///
    /// Succeeds without looking at any rule while the allow-rule feature is
    /// off. Once enabled, a project with no rules denies everything.
    pub async fn check_image_allowed(
        &self,
        namespace: &str,
        image: &ImageIdentity<'_>,
    ) -> EngineResult<()> {
        if !self.config.features.image_allow_rules {
            return Ok(());
        }
        let rules = self.store.list_image_allow_rules(namespace).await?;
        let result = self.check_image_against_rules(namespace, image, &rules).await;
        let decision = match &result {
            Ok(()) => "allowed",
            Err(err) if err.is_policy_denial() => "denied",
            Err(_) => "error",
        };
        metrics::counter!(IMAGE_ALLOW_DECISIONS, "decision" => decision).increment(1);
        result
    }

    /// Allows `image` if any of `rules` selects it.
    pub async fn check_image_against_rules(
        &self,
        namespace: &str,
        image: &ImageIdentity<'_>,
        rules: &[ImageAllowRule],
    ) -> EngineResult<()> {
        let not_allowed = || EngineError::ImageNotAllowed {
            namespace: namespace.to_string(),
            image: image.name.to_string(),
        };
        if rules.is_empty() {
            debug!(namespace = %namespace, image = %image.name, "no image allow rules, denying");
            return Err(not_allowed());
        }

        let mut transient = None;
        for rule in rules {
            match self.match_image(namespace, image, &rule.image_selector).await {
                Ok(()) => {
                    debug!(
                        namespace = %namespace,
                        image = %image.name,
                        rule = %rule.name,
                        "image allowed"
                    );
                    return Ok(());
                }
                Err(EngineError::NoMatch(no_match)) => {
                    debug!(rule = %rule.name, reason = %no_match, "image allow rule does not apply");
                }
                Err(err) => {
                    error!(
                        namespace = %namespace,
                        rule = %rule.name,
                        image = %image.name,
                        error = %err,
                        "failed to evaluate image allow rule"
                    );
                    if err.is_transient() && transient.is_none() {
                        transient = Some(err);
                    }
                }
            }
        }

        match transient {
            Some(err) => Err(err),
            None => Err(not_allowed()),
        }
    }
}
