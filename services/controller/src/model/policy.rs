use serde::{Deserialize, Serialize};
use stagegate_authz::PolicyRule;
use stagegate_signature::SignatureRules;

/// Predicate over an image's identities and signatures.
///
/// Empty `name_patterns` matches every image; empty `signatures` requires none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSelector {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<SignatureRules>,
}

impl ImageSelector {
    pub fn names<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name_patterns: patterns.into_iter().map(Into::into).collect(),
            signatures: Vec::new(),
        }
    }

    pub fn with_signatures(mut self, signatures: Vec<SignatureRules>) -> Self {
        self.signatures = signatures;
        self
    }

    /// Same name patterns, signature requirements dropped.
    pub fn name_patterns_only(&self) -> Self {
        Self {
            name_patterns: self.name_patterns.clone(),
            signatures: Vec::new(),
        }
    }
}

/// Project-scoped gate: an image may run only if some rule's selector matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAllowRule {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub image_selector: ImageSelector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleKind {
    Role,
    ClusterRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    pub name: String,
    pub kind: RoleKind,
}

impl RoleRef {
    pub fn role(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RoleKind::Role,
        }
    }

    pub fn cluster_role(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RoleKind::ClusterRole,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAuthorizations {
    /// Scopes stamped onto every rule of the referenced roles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_refs: Vec<RoleRef>,
}

/// Named list of rules; `namespace` is empty for cluster roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

/// Persisted project-scoped authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRoleAuthorizationRecord {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub generation: i64,
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub image_selector: ImageSelector,
    #[serde(default)]
    pub roles: RoleAuthorizations,
}

/// Persisted cluster-scoped authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterImageRoleAuthorizationRecord {
    pub name: String,
    #[serde(default)]
    pub generation: i64,
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub image_selector: ImageSelector,
    #[serde(default)]
    pub roles: RoleAuthorizations,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthorizationScope {
    Project(String),
    Cluster,
}

/// Role authorization with its scope carried as data; both persisted kinds
/// convert into this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRoleAuthorization {
    pub scope: AuthorizationScope,
    pub name: String,
    pub generation: i64,
    pub image_selector: ImageSelector,
    pub roles: RoleAuthorizations,
}

impl ImageRoleAuthorization {
    /// Namespace whose apps this authorization applies to; `None` for all.
    pub fn namespace(&self) -> Option<&str> {
        match &self.scope {
            AuthorizationScope::Project(namespace) => Some(namespace),
            AuthorizationScope::Cluster => None,
        }
    }

    pub fn display_name(&self) -> String {
        match &self.scope {
            AuthorizationScope::Project(namespace) => {
                format!("ImageRoleAuthorization {namespace}/{}", self.name)
            }
            AuthorizationScope::Cluster => format!("ClusterImageRoleAuthorization {}", self.name),
        }
    }
}

impl From<ImageRoleAuthorizationRecord> for ImageRoleAuthorization {
    fn from(record: ImageRoleAuthorizationRecord) -> Self {
        Self {
            scope: AuthorizationScope::Project(record.namespace),
            name: record.name,
            generation: record.generation,
            image_selector: record.image_selector,
            roles: record.roles,
        }
    }
}

impl From<ClusterImageRoleAuthorizationRecord> for ImageRoleAuthorization {
    fn from(record: ClusterImageRoleAuthorizationRecord) -> Self {
        Self {
            scope: AuthorizationScope::Cluster,
            name: record.name,
            generation: record.generation,
            image_selector: record.image_selector,
            roles: record.roles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_kinds_convert_to_one_type() {
        let selector = ImageSelector::names(["reg/app:*"]);
        let project: ImageRoleAuthorization = ImageRoleAuthorizationRecord {
            namespace: "acme".to_string(),
            name: "web".to_string(),
            generation: 2,
            observed_generation: 1,
            image_selector: selector.clone(),
            roles: RoleAuthorizations::default(),
        }
        .into();
        let cluster: ImageRoleAuthorization = ClusterImageRoleAuthorizationRecord {
            name: "web".to_string(),
            generation: 1,
            observed_generation: 0,
            image_selector: selector,
            roles: RoleAuthorizations::default(),
        }
        .into();

        assert_eq!(project.namespace(), Some("acme"));
        assert_eq!(cluster.namespace(), None);
        assert_eq!(project.image_selector, cluster.image_selector);
        assert!(cluster.display_name().starts_with("ClusterImageRoleAuthorization"));
    }

    #[test]
    fn selector_parses_from_yaml() {
        let rule: ImageAllowRule = serde_yaml::from_str(
            r#"
namespace: acme
name: signed-only
imageSelector:
  namePatterns: ["reg/**"]
  signatures:
    - signedBy:
        allOf: ["-----BEGIN PUBLIC KEY-----"]
"#,
        )
        .expect("parse");
        assert_eq!(rule.image_selector.name_patterns, vec!["reg/**".to_string()]);
        assert_eq!(rule.image_selector.signatures.len(), 1);
        assert!(rule.image_selector.name_patterns_only().signatures.is_empty());
    }

    #[test]
    fn role_refs_use_kind_names() {
        let refs: Vec<RoleRef> =
            serde_json::from_str(r#"[{"name":"admin","kind":"ClusterRole"},{"name":"viewer","kind":"Role"}]"#)
                .expect("parse");
        assert_eq!(refs[0], RoleRef::cluster_role("admin"));
        assert_eq!(refs[1], RoleRef::role("viewer"));
    }
}
