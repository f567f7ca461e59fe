use serde::{Deserialize, Serialize};
use stagegate_authz::PermissionSet;
use std::collections::BTreeMap;

/// Original image name of a nested app whose `AppImage.name` is a bare ID.
pub const ORIGINAL_IMAGE_ANNOTATION: &str = "stagegate.io/original-image";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppImage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub digest: String,
}

impl AppImage {
    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.digest.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    pub image: String,
    /// Permissions granted by the user.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<PermissionSet>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub target_name: String,
}

/// A container, job or function of an app definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

impl Workload {
    pub fn depending_on<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dependencies: targets
                .into_iter()
                .map(|target| Dependency {
                    target_name: target.into(),
                })
                .collect(),
        }
    }
}

/// The parsed definition of the active image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDefinition {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub containers: BTreeMap<String, Workload>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub jobs: BTreeMap<String, Workload>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub functions: BTreeMap<String, Workload>,
}

impl AppDefinition {
    pub fn workloads(&self) -> impl Iterator<Item = (&String, &Workload)> {
        self.containers
            .iter()
            .chain(self.functions.iter())
            .chain(self.jobs.iter())
    }
}

/// Staging state of the next image an app intends to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStaged {
    #[serde(default)]
    pub app_image: AppImage,
    /// App generation the permission check last ran for; `-1` forces a re-check.
    #[serde(default)]
    pub permissions_observed_generation: i64,
    #[serde(default)]
    pub permissions_checked: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions_missing: Vec<PermissionSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_allowed: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_permissions_denied: Vec<PermissionSet>,
}

impl AppStaged {
    /// Fresh staging state for `app_image`; nothing checked yet.
    pub fn for_image(app_image: AppImage) -> Self {
        Self {
            app_image,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    /// Namespace holding this app's services and nested apps.
    #[serde(default)]
    pub namespace: String,
    /// Active image.
    #[serde(default)]
    pub app_image: AppImage,
    #[serde(default)]
    pub app_spec: AppDefinition,
    #[serde(default)]
    pub staged: AppStaged,
    /// Currently granted permissions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<PermissionSet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub denied_consumer_permissions: Vec<PermissionSet>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInstance {
    pub namespace: String,
    pub name: String,
    /// Bumped on every spec change.
    #[serde(default)]
    pub generation: i64,
    /// Bumped on every write; status updates must present the current value.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    pub spec: AppSpec,
    #[serde(default)]
    pub status: AppStatus,
}

impl AppInstance {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: AppSpec) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            generation: 1,
            resource_version: 0,
            annotations: BTreeMap::new(),
            spec,
            status: AppStatus::default(),
        }
    }

    pub fn key(&self) -> (String, String) {
        (self.namespace.clone(), self.name.clone())
    }

    /// Name used for policy matching: the original image annotation when
    /// present, otherwise `image.name`.
    pub fn policy_image_name(&self, image: &AppImage) -> String {
        self.annotations
            .get(ORIGINAL_IMAGE_ANNOTATION)
            .cloned()
            .unwrap_or_else(|| image.name.clone())
    }

    /// Whether the app shows any permission denial.
    pub fn has_denials(&self) -> bool {
        !self.status.staged.image_permissions_denied.is_empty()
            || !self.status.denied_consumer_permissions.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConsumer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionSet>,
}

/// A dependency target; `consumer` lists what its users need to hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<ServiceConsumer>,
}
