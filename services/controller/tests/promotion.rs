mod common;

use common::{PROJECT, app, digest, features, harness, image, nested, rule};
use controller::EngineError;
use controller::model::AppSpec;
use controller::store::{ObjectKey, PolicyStore};
use stagegate_authz::{PermissionSet, PolicyRule};
use stagegate_signature::{generate_signing_key, public_key_pem};

const TAG: &str = "reg.example.io/service:v1";
const NEXT_TAG: &str = "reg.example.io/service:v2";
const IAM_GROUP: &str = "iam.example.io";

fn declared() -> Vec<PermissionSet> {
    vec![PermissionSet::new("svc", vec![rule("api.example.io")])]
}

#[tokio::test]
async fn missing_grants_hold_promotion_until_spec_changes() {
    let h = harness(features(false, false));
    let details = image("5a", "5b", declared());
    h.publish(PROJECT, &details, TAG).await;
    h.store
        .create_app(app(PROJECT, "svc", TAG, Vec::new()))
        .await
        .expect("create app");
    let key = ObjectKey::new(PROJECT, "svc");

    let (held, promoted) = h.engine.reconcile_app(&key).await.expect("reconcile");
    assert!(!promoted);
    assert!(held.status.staged.permissions_checked);
    assert_eq!(held.status.staged.permissions_missing.len(), 1);
    assert_eq!(held.status.staged.permissions_missing[0].service_name, "svc");
    assert!(held.status.app_image.is_empty());

    h.store
        .update_app_spec(
            &key,
            AppSpec {
                image: TAG.to_string(),
                permissions: vec![PermissionSet::new(
                    "svc",
                    vec![PolicyRule::new(&["api.example.io"], &["*"], &["*"])],
                )],
            },
        )
        .await
        .expect("update spec");

    let (active, promoted) = h.engine.reconcile_app(&key).await.expect("reconcile");
    assert!(promoted);
    assert!(active.status.staged.permissions_missing.is_empty());
    assert_eq!(active.status.staged.permissions_observed_generation, 2);
    assert_eq!(active.status.app_image.digest, details.app_image.digest);
    assert_eq!(active.status.permissions.len(), 1);
}

#[tokio::test]
async fn digest_change_between_staging_and_check_is_retried() {
    let h = harness(features(false, false));
    let details = image("6a", "6b", declared());
    h.publish(PROJECT, &details, TAG).await;
    h.store
        .create_app(app(PROJECT, "svc", TAG, declared()))
        .await
        .expect("create app");

    let mut staged = h
        .store
        .get_app(&ObjectKey::new(PROJECT, "svc"))
        .await
        .expect("get app");
    h.engine
        .stage_app_image(&mut staged)
        .await
        .expect("stage");
    assert_eq!(staged.status.staged.app_image.digest, digest("6b"));

    let mut rebuilt = details.clone();
    rebuilt.app_image.digest = digest("6c");
    h.images.add_local(PROJECT, rebuilt, [TAG]).await;

    let err = h
        .engine
        .check_image_permissions(&mut staged)
        .await
        .expect_err("digest race");
    assert!(matches!(err, EngineError::DigestMismatch { .. }));
    assert!(err.is_transient());
    assert!(!staged.status.staged.permissions_checked);
}

#[tokio::test]
async fn restricted_group_requires_signed_image() {
    let key = generate_signing_key();
    let pem = public_key_pem(&key.verifying_key()).expect("pem");
    let h = harness(features(false, false).with_restricted_api_group(IAM_GROUP, pem));
    let iam = vec![PermissionSet::new("svc", vec![rule(IAM_GROUP)])];
    let details = image("7a", "7b", iam.clone());
    h.publish(PROJECT, &details, TAG).await;
    h.store
        .create_app(app(PROJECT, "svc", TAG, iam.clone()))
        .await
        .expect("create app");
    let app_key = ObjectKey::new(PROJECT, "svc");

    let (denied, promoted) = h.engine.reconcile_app(&app_key).await.expect("reconcile");
    assert!(!promoted);
    assert!(denied.status.staged.permissions_missing.is_empty());
    assert_eq!(denied.status.staged.image_permissions_denied.len(), 1);

    h.sign(&key, TAG, &details.app_image.digest).await;
    h.store
        .update_app_spec(
            &app_key,
            AppSpec {
                image: TAG.to_string(),
                permissions: iam,
            },
        )
        .await
        .expect("update spec");

    let (signed, promoted) = h.engine.reconcile_app(&app_key).await.expect("reconcile");
    assert!(promoted);
    assert!(signed.status.staged.image_permissions_denied.is_empty());
}

#[tokio::test]
async fn signed_nested_image_may_use_restricted_group() {
    let key = generate_signing_key();
    let pem = public_key_pem(&key.verifying_key()).expect("pem");
    let h = harness(features(false, false).with_restricted_api_group(IAM_GROUP, pem));

    let child = image("8a", "8a", vec![PermissionSet::new("worker", vec![rule(IAM_GROUP)])]);
    let child_tag = "reg.example.io/worker:v1";
    h.publish(PROJECT, &child, child_tag).await;
    let mut parent = image("8b", "8c", declared());
    parent.nested_images.push(nested("jobs", child_tag, &child));
    h.publish(PROJECT, &parent, TAG).await;

    let granted = vec![
        PermissionSet::new("svc", vec![rule("api.example.io")]),
        PermissionSet::new("jobs.worker", vec![rule(IAM_GROUP)]),
    ];
    h.store
        .create_app(app(PROJECT, "svc", TAG, granted))
        .await
        .expect("create app");
    h.sign(&key, child_tag, &child.app_image.digest).await;

    let (active, promoted) = h
        .engine
        .reconcile_app(&ObjectKey::new(PROJECT, "svc"))
        .await
        .expect("reconcile");
    assert!(promoted);
    assert!(active.status.staged.image_permissions_denied.is_empty());
}

#[tokio::test]
async fn returning_to_active_image_needs_no_recheck() {
    let h = harness(features(false, false));
    let first = image("9a", "9b", Vec::new());
    let second = image("9c", "9d", declared());
    h.publish(PROJECT, &first, TAG).await;
    h.publish(PROJECT, &second, NEXT_TAG).await;
    h.store
        .create_app(app(PROJECT, "svc", TAG, Vec::new()))
        .await
        .expect("create app");
    let key = ObjectKey::new(PROJECT, "svc");

    let (_, promoted) = h.engine.reconcile_app(&key).await.expect("reconcile");
    assert!(promoted);

    let spec_for = |image: &str| AppSpec {
        image: image.to_string(),
        permissions: Vec::new(),
    };
    h.store
        .update_app_spec(&key, spec_for(NEXT_TAG))
        .await
        .expect("update spec");
    let (held, promoted) = h.engine.reconcile_app(&key).await.expect("reconcile");
    assert!(!promoted);
    assert_eq!(held.status.staged.app_image.digest, second.app_image.digest);
    assert_eq!(held.status.app_image.digest, first.app_image.digest);

    h.store
        .update_app_spec(&key, spec_for(TAG))
        .await
        .expect("update spec");
    let (back, promoted) = h.engine.reconcile_app(&key).await.expect("reconcile");
    assert!(!promoted);
    assert!(back.status.staged.permissions_checked);
    assert!(back.status.staged.permissions_missing.is_empty());
    assert_eq!(back.status.staged.app_image.digest, first.app_image.digest);
    assert_eq!(back.status.app_image.digest, first.app_image.digest);
}
