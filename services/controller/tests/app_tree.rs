mod common;

use common::{PROJECT, app, features, harness, image, rule};
use controller::EngineError;
use controller::images::ImageError;
use controller::model::{
    AppInstance, ImageRoleAuthorizationRecord, ImageSelector, Role, RoleAuthorizations, RoleRef,
};
use controller::store::{ObjectKey, PolicyStore};
use stagegate_authz::PermissionSet;

const TAG: &str = "reg.example.io/tree:v1";
const CHILD_TAG: &str = "reg.example.io/tree-child:v1";
const CHILD_NAMESPACE: &str = "acme-child";

fn role_authorization(namespace: &str, pattern: &str, role: &str) -> ImageRoleAuthorizationRecord {
    ImageRoleAuthorizationRecord {
        namespace: namespace.to_string(),
        name: format!("{role}-access"),
        generation: 0,
        observed_generation: 0,
        image_selector: ImageSelector::names([pattern]),
        roles: RoleAuthorizations {
            scopes: Vec::new(),
            role_refs: vec![RoleRef::role(role)],
        },
    }
}

fn with_namespace(mut app: AppInstance, namespace: &str) -> AppInstance {
    app.status.namespace = namespace.to_string();
    app
}

#[tokio::test]
async fn tree_is_evaluated_breadth_first_and_survives_failures() {
    let h = harness(features(false, false));
    let details = image("c1", "c2", Vec::new());
    for namespace in [PROJECT, "acme-root", "acme-leaf"] {
        h.publish(namespace, &details, TAG).await;
    }

    h.store
        .create_app(with_namespace(app(PROJECT, "root", TAG, Vec::new()), "acme-root"))
        .await
        .expect("create root");
    h.store
        .create_app(with_namespace(app("acme-root", "a", TAG, Vec::new()), "acme-leaf"))
        .await
        .expect("create child");
    h.store
        .create_app(app("acme-root", "b", "reg.example.io/missing:v1", Vec::new()))
        .await
        .expect("create broken child");
    // Points back at the root's namespace; the pass must still terminate.
    h.store
        .create_app(with_namespace(app("acme-leaf", "leaf", TAG, Vec::new()), "acme-root"))
        .await
        .expect("create leaf");

    let report = h
        .engine
        .evaluate_app_tree(&ObjectKey::new(PROJECT, "root"))
        .await
        .expect("evaluate tree");

    assert_eq!(
        report.evaluated,
        vec![
            ObjectKey::new(PROJECT, "root"),
            ObjectKey::new("acme-root", "a"),
            ObjectKey::new("acme-leaf", "leaf"),
        ]
    );
    assert_eq!(report.promoted, report.evaluated);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, ObjectKey::new("acme-root", "b"));
    assert!(matches!(
        report.failed[0].1,
        EngineError::Image(ImageError::NotFound(_))
    ));
    assert!(!report.is_clean());
}

#[tokio::test]
async fn second_pass_promotes_nothing() {
    let h = harness(features(false, false));
    let details = image("d1", "d2", Vec::new());
    h.publish(PROJECT, &details, TAG).await;
    h.publish("acme-root", &details, TAG).await;
    h.store
        .create_app(with_namespace(app(PROJECT, "root", TAG, Vec::new()), "acme-root"))
        .await
        .expect("create root");
    h.store
        .create_app(app("acme-root", "child", TAG, Vec::new()))
        .await
        .expect("create child");
    let root = ObjectKey::new(PROJECT, "root");

    let first = h.engine.evaluate_app_tree(&root).await.expect("first pass");
    assert_eq!(first.promoted.len(), 2);
    assert!(first.is_clean());

    let second = h.engine.evaluate_app_tree(&root).await.expect("second pass");
    assert_eq!(second.evaluated.len(), 2);
    assert!(second.promoted.is_empty());
}

#[tokio::test]
async fn missing_root_is_reported() {
    let h = harness(features(false, false));
    let report = h
        .engine
        .evaluate_app_tree(&ObjectKey::new(PROJECT, "absent"))
        .await
        .expect("evaluate tree");
    assert!(report.evaluated.is_empty());
    assert_eq!(report.failed.len(), 1);
}

#[tokio::test]
async fn child_app_image_permissions_are_authorized_on_their_own() {
    let h = harness(features(false, true));
    let parent_permissions = vec![PermissionSet::new("api", vec![rule("api.example.io")])];
    let child_permissions = vec![PermissionSet::new("jobs", vec![rule("batch.example.io")])];
    let parent_image = image("b1", "b2", parent_permissions.clone());
    let child_image = image("b3", "b4", child_permissions.clone());
    h.publish(PROJECT, &parent_image, TAG).await;
    h.publish(CHILD_NAMESPACE, &child_image, CHILD_TAG).await;

    h.store
        .put_role(Role {
            namespace: PROJECT.to_string(),
            name: "api-reader".to_string(),
            rules: vec![rule("api.example.io")],
        })
        .await;
    h.store
        .put_image_role_authorization(role_authorization(PROJECT, TAG, "api-reader"))
        .await;
    h.store
        .create_app(with_namespace(
            app(PROJECT, "root", TAG, parent_permissions),
            CHILD_NAMESPACE,
        ))
        .await
        .expect("create root");
    h.store
        .create_app(app(CHILD_NAMESPACE, "jobs", CHILD_TAG, child_permissions))
        .await
        .expect("create child");
    let root = ObjectKey::new(PROJECT, "root");
    let child = ObjectKey::new(CHILD_NAMESPACE, "jobs");

    let first = h.engine.evaluate_app_tree(&root).await.expect("first pass");
    assert_eq!(first.evaluated, vec![root.clone(), child.clone()]);
    assert_eq!(first.promoted, vec![root.clone()]);
    let denied = h.store.get_app(&child).await.expect("get child");
    assert_eq!(denied.status.staged.image_permissions_denied.len(), 1);
    assert_eq!(denied.status.staged.image_permissions_denied[0].service_name, "jobs");
    assert!(denied.status.staged.permissions_missing.is_empty());
    assert!(denied.status.app_image.is_empty());
    let parent = h.store.get_app(&root).await.expect("get root");
    assert!(parent.status.staged.image_permissions_denied.is_empty());

    // The parent's authorization lives in another namespace and never covers the child.
    h.store
        .put_role(Role {
            namespace: CHILD_NAMESPACE.to_string(),
            name: "batch-runner".to_string(),
            rules: vec![rule("batch.example.io")],
        })
        .await;
    let record = h
        .store
        .put_image_role_authorization(role_authorization(
            CHILD_NAMESPACE,
            CHILD_TAG,
            "batch-runner",
        ))
        .await;
    let bumped = h
        .engine
        .bump_image_role_authorizations(&record)
        .await
        .expect("bump");
    assert_eq!(bumped.bumped, vec![child.clone()]);

    let second = h.engine.evaluate_app_tree(&root).await.expect("second pass");
    assert_eq!(second.promoted, vec![child.clone()]);
    let granted = h.store.get_app(&child).await.expect("get child");
    assert!(granted.status.staged.image_permissions_denied.is_empty());
    assert_eq!(granted.status.app_image.digest, child_image.app_image.digest);
}
