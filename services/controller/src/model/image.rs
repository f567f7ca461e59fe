use crate::model::AppImage;
use serde::{Deserialize, Serialize};
use stagegate_authz::PermissionSet;

/// An image packaged inside another image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedImage {
    /// Name of the nested app within its parent.
    pub name: String,
    /// Reference the nested image was built from.
    pub image_name: String,
    pub digest: String,
    /// Declared permissions, keyed by the nested image's own service names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<PermissionSet>,
}

impl NestedImage {
    /// Declared permissions addressed from the parent as `<nested>.<service>`.
    pub fn qualified_permissions(&self) -> Vec<PermissionSet> {
        self.permissions
            .iter()
            .map(|set| set.with_service_name(format!("{}.{}", self.name, set.service_name)))
            .collect()
    }
}

/// Authoritative description of an image and what it declares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDetails {
    pub app_image: AppImage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<PermissionSet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_images: Vec<NestedImage>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature_digest: String,
}

impl ImageDetails {
    /// Declared permissions of this image and every nested image.
    pub fn all_permissions(&self) -> Vec<PermissionSet> {
        let mut permissions = self.permissions.clone();
        for nested in &self.nested_images {
            permissions.extend(nested.qualified_permissions());
        }
        permissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagegate_authz::PolicyRule;

    #[test]
    fn nested_permissions_are_qualified() {
        let details = ImageDetails {
            app_image: AppImage::default(),
            permissions: vec![PermissionSet::new(
                "rootapp",
                vec![PolicyRule::new(&["api.example.io"], &["get"], &["*"])],
            )],
            nested_images: vec![NestedImage {
                name: "foo".to_string(),
                image_name: "reg/child:v1".to_string(),
                digest: "sha256:child".to_string(),
                permissions: vec![PermissionSet::new(
                    "awsapp",
                    vec![PolicyRule::new(&["aws.example.io"], &["get"], &["*"])],
                )],
            }],
            signature_digest: String::new(),
        };

        let names: Vec<String> = details
            .all_permissions()
            .into_iter()
            .map(|set| set.service_name)
            .collect();
        assert_eq!(names, vec!["rootapp".to_string(), "foo.awsapp".to_string()]);
    }
}
