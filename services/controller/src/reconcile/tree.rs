//! Evaluation of nested app trees.
//!
//! # Purpose
//! Runs the per-app pipeline over an app and everything nested below it.
//! Child apps live in their parent's `status.namespace`.
//!
//! # Key invariants
//! - Traversal uses an explicit worklist; depth is user controlled.
//! - Each app is evaluated at most once per pass, so namespace cycles
//!   terminate.
//! - A failing app is reported and skipped; its siblings still run.
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::model::AppInstance;
use crate::store::ObjectKey;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// Outcome of one tree pass.
#[derive(Debug, Default)]
pub struct TreeReport {
    /// Apps evaluated and written, in visit order.
    pub evaluated: Vec<ObjectKey>,
    /// Apps whose staged image was promoted during the pass.
    pub promoted: Vec<ObjectKey>,
    /// Apps whose evaluation failed; their subtrees were not visited.
    pub failed: Vec<(ObjectKey, EngineError)>,
}

impl TreeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Engine {
    /// Runs staging, allow check, permission check, promotion and consumer
    /// permissions for one app, then writes its status.
    ///
    /// Returns the stored app and whether it was promoted. A status write
    /// conflict is returned for the caller to retry the whole evaluation.
    pub async fn reconcile_app(&self, key: &ObjectKey) -> EngineResult<(AppInstance, bool)> {
        let mut app = self.store.get_app(key).await?;
        self.stage_app_image(&mut app).await?;
        self.check_app_image_allowed(&mut app).await?;
        if app.status.staged.image_allowed != Some(false) {
            self.check_image_permissions(&mut app).await?;
        }
        let promoted = self.copy_promote_staged_app_image(&mut app);
        if !app.status.app_image.is_empty() {
            self.consumer_permissions(&mut app).await?;
        }
        let stored = self.store.update_app_status(&app).await?;
        Ok((stored, promoted))
    }

    /// Evaluates `root` and every app nested below it, breadth first.
    pub async fn evaluate_app_tree(&self, root: &ObjectKey) -> EngineResult<TreeReport> {
        let mut report = TreeReport::default();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([root.clone()]);

        while let Some(key) = queue.pop_front() {
            if !visited.insert(key.clone()) {
                continue;
            }
            let (app, promoted) = match self.reconcile_app(&key).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(app = %key, error = %err, "app evaluation failed");
                    report.failed.push((key, err));
                    continue;
                }
            };
            if promoted {
                report.promoted.push(key.clone());
            }
            report.evaluated.push(key);

            if app.status.namespace.is_empty() {
                continue;
            }
            let children = self.store.list_apps(Some(&app.status.namespace)).await?;
            debug!(
                namespace = %app.status.namespace,
                children = children.len(),
                "queueing nested apps"
            );
            queue.extend(
                children
                    .into_iter()
                    .map(|child| ObjectKey::new(child.namespace, child.name)),
            );
        }

        Ok(report)
    }
}
