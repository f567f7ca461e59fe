//! RBAC-style policy rules and the covering relation between them.
//!
//! # Purpose
//! A [`PolicyRule`] describes cluster-native privilege requested by an image or
//! granted by an operator. This module answers "does granted rule G cover
//! requested rule R" and provides the canonical form used when rule lists are
//! merged.
//!
//! # Key invariants
//! - `"*"` in verbs, API groups, resources and non-resource URLs matches any
//!   value; a trailing `*` matches by prefix.
//! - Empty `resource_names` on a granted rule means every name; a request
//!   without names is covered by any grant whose other dimensions match.
//! - A non-resource grant covers only unscoped URL requests. A grant that
//!   mixes URLs with resources covers nothing.
//! - Scopes resolve to the current namespace (empty or `project`), the whole
//!   cluster (`""`, `cluster`, `account`) or a named namespace
//!   (`namespace:<ns>`, `project:<ns>`). Cluster scope covers every namespace.
//!
//! # Examples
//! ```rust
//! use stagegate_authz::PolicyRule;
//!
//! let granted = PolicyRule::new(&["*"], &["*"], &["*"]);
//! let requested = PolicyRule::new(&["apps"], &["get"], &["deployments"])
//!     .with_resource_names(&["web"]);
//! assert!(granted.grants("payments", &requested));
//! ```
//!
//! # Common pitfalls
//! - A rule scoped to `project` in one namespace does not cover the same rule
//!   evaluated in another namespace; always pass the app's namespace.
use crate::wildcard_match;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const SCOPE_PROJECT: &str = "project";
pub const SCOPE_CLUSTER: &str = "cluster";
pub const SCOPE_ACCOUNT: &str = "account";
const NAMESPACE_PREFIX: &str = "namespace:";
const PROJECT_PREFIX: &str = "project:";

/// Where a rule applies once its scopes are resolved.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScopeTarget {
    Cluster,
    /// The namespace the rule is evaluated in.
    Current,
    Namespace(String),
}

impl ScopeTarget {
    fn bind(&self, current: Option<&str>) -> ScopeTarget {
        match (self, current) {
            (ScopeTarget::Current, Some(namespace)) => ScopeTarget::Namespace(namespace.to_string()),
            (other, _) => other.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verbs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_names: Vec<String>,
    #[serde(default, rename = "nonResourceURLs", skip_serializing_if = "Vec::is_empty")]
    pub non_resource_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn matches_single(allowed: &[String], requested: &str, empty_allowed_is_all: bool) -> bool {
    if requested.is_empty() {
        return true;
    }
    if empty_allowed_is_all && allowed.is_empty() {
        return true;
    }
    allowed.iter().any(|allow| wildcard_match(allow, requested))
}

fn matches_all(allowed: &[String], requested: &[String], empty_allowed_is_all: bool) -> bool {
    requested
        .iter()
        .all(|value| matches_single(allowed, value, empty_allowed_is_all))
}

/// Each value as a single-element list; an empty dimension stays a single empty list.
fn permutation(values: &[String]) -> Vec<Vec<String>> {
    if values.is_empty() {
        return vec![Vec::new()];
    }
    values.iter().map(|value| vec![value.clone()]).collect()
}

fn canonical(values: &[String]) -> Vec<String> {
    let mut values = values.to_vec();
    values.sort();
    values.dedup();
    values
}

fn union(left: &[String], right: &[String]) -> Vec<String> {
    let mut merged = left.to_vec();
    merged.extend_from_slice(right);
    canonical(&merged)
}

impl PolicyRule {
    /// Resource rule over the given API groups, verbs and resources.
    pub fn new(api_groups: &[&str], verbs: &[&str], resources: &[&str]) -> Self {
        Self {
            api_groups: strings(api_groups),
            verbs: strings(verbs),
            resources: strings(resources),
            ..Self::default()
        }
    }

    /// Rule over non-resource URL paths.
    pub fn non_resource(verbs: &[&str], urls: &[&str]) -> Self {
        Self {
            verbs: strings(verbs),
            non_resource_urls: strings(urls),
            ..Self::default()
        }
    }

    pub fn with_resource_names(mut self, names: &[&str]) -> Self {
        self.resource_names = strings(names);
        self
    }

    pub fn with_scopes(mut self, scopes: &[&str]) -> Self {
        self.scopes = strings(scopes);
        self
    }

    pub fn is_project_scoped(&self) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|scope| scope == SCOPE_PROJECT)
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.scopes
            .iter()
            .any(|scope| matches!(scope.as_str(), "" | SCOPE_CLUSTER | SCOPE_ACCOUNT))
    }

    /// Namespaces named explicitly through `namespace:` or `project:` scopes.
    pub fn named_namespaces(&self) -> Vec<String> {
        self.scopes
            .iter()
            .filter_map(|scope| {
                scope
                    .strip_prefix(NAMESPACE_PREFIX)
                    .or_else(|| scope.strip_prefix(PROJECT_PREFIX))
            })
            .map(str::to_string)
            .collect()
    }

    pub fn scope_targets(&self) -> BTreeSet<ScopeTarget> {
        let mut targets = BTreeSet::new();
        if self.is_project_scoped() {
            targets.insert(ScopeTarget::Current);
        }
        if self.is_cluster_scoped() {
            targets.insert(ScopeTarget::Cluster);
        }
        for namespace in self.named_namespaces() {
            targets.insert(ScopeTarget::Namespace(namespace));
        }
        targets
    }

    /// Resolved namespaces for evaluation in `current`. Cluster scope is `""`.
    pub fn resolve_namespaces(&self, current: &str) -> Vec<String> {
        let resolved: BTreeSet<String> = self
            .scope_targets()
            .into_iter()
            .map(|target| match target.bind(Some(current)) {
                ScopeTarget::Cluster => String::new(),
                ScopeTarget::Namespace(namespace) => namespace,
                ScopeTarget::Current => current.to_string(),
            })
            .collect();
        resolved.into_iter().collect()
    }

    /// Split into single-valued rules, one per combination of dimension values.
    pub fn exploded(&self) -> Vec<PolicyRule> {
        let mut result = Vec::new();
        for scopes in permutation(&self.scopes) {
            for verbs in permutation(&self.verbs) {
                for api_groups in permutation(&self.api_groups) {
                    for resources in permutation(&self.resources) {
                        for resource_names in permutation(&self.resource_names) {
                            for non_resource_urls in permutation(&self.non_resource_urls) {
                                result.push(PolicyRule {
                                    verbs: verbs.clone(),
                                    api_groups: api_groups.clone(),
                                    resources: resources.clone(),
                                    resource_names: resource_names.clone(),
                                    non_resource_urls,
                                    scopes: scopes.clone(),
                                });
                            }
                        }
                    }
                }
            }
        }
        result
    }

    /// Whether this granted rule covers `requested` when evaluated in `namespace`.
    ///
    /// A request without resource names is covered by a grant restricted to
    /// names, mirroring how cluster-native RBAC reads an unnamed request.
    pub fn grants(&self, namespace: &str, requested: &PolicyRule) -> bool {
        self.covers(requested, Some(namespace), true)
    }

    /// Whether this rule covers `other` in every namespace.
    ///
    /// Stricter than [`PolicyRule::grants`] on resource names: an unnamed rule
    /// is only subsumed by another unnamed rule, so merging never narrows a set.
    pub fn subsumes(&self, other: &PolicyRule) -> bool {
        self.covers(other, None, false)
    }

    fn covers(
        &self,
        requested: &PolicyRule,
        current: Option<&str>,
        unnamed_allowed: bool,
    ) -> bool {
        if !self.non_resource_urls.is_empty() {
            // A grant mixing URLs with resources covers nothing.
            return self.resources.is_empty()
                && self.scopes.is_empty()
                && requested.scopes.is_empty()
                && requested.api_groups.is_empty()
                && requested.resources.is_empty()
                && requested.resource_names.is_empty()
                && matches_all(&self.verbs, &requested.verbs, false)
                && matches_all(&self.non_resource_urls, &requested.non_resource_urls, false);
        }
        if !requested.non_resource_urls.is_empty() {
            return false;
        }

        let granted_targets: BTreeSet<ScopeTarget> = self
            .scope_targets()
            .iter()
            .map(|target| target.bind(current))
            .collect();
        let scoped = granted_targets.contains(&ScopeTarget::Cluster)
            || requested
                .scope_targets()
                .iter()
                .all(|target| granted_targets.contains(&target.bind(current)));

        scoped
            && matches_all(&self.verbs, &requested.verbs, false)
            && matches_all(&self.api_groups, &requested.api_groups, false)
            && matches_all(&self.resources, &requested.resources, false)
            && self.covers_resource_names(requested, unnamed_allowed)
    }

    fn covers_resource_names(&self, requested: &PolicyRule, unnamed_allowed: bool) -> bool {
        if requested.resource_names.is_empty() && !unnamed_allowed {
            return self.resource_names.is_empty();
        }
        matches_all(&self.resource_names, &requested.resource_names, true)
    }

    /// Sorted, de-duplicated copy of every dimension.
    pub fn normalized(&self) -> PolicyRule {
        PolicyRule {
            verbs: canonical(&self.verbs),
            api_groups: canonical(&self.api_groups),
            resources: canonical(&self.resources),
            resource_names: canonical(&self.resource_names),
            non_resource_urls: canonical(&self.non_resource_urls),
            scopes: canonical(&self.scopes),
        }
    }

    /// Merge two normalized rules that differ in exactly one dimension.
    ///
    /// Returns `None` when they differ in more than one dimension or when the
    /// merge would narrow what either rule covers.
    pub(crate) fn combine(&self, other: &PolicyRule) -> Option<PolicyRule> {
        let differing = [
            self.verbs != other.verbs,
            self.api_groups != other.api_groups,
            self.resources != other.resources,
            self.resource_names != other.resource_names,
            self.non_resource_urls != other.non_resource_urls,
            self.scopes != other.scopes,
        ];
        if differing.iter().filter(|differs| **differs).count() != 1 {
            return None;
        }

        let mut combined = self.clone();
        if self.verbs != other.verbs {
            combined.verbs = union(&self.verbs, &other.verbs);
        } else if self.api_groups != other.api_groups {
            combined.api_groups = union(&self.api_groups, &other.api_groups);
        } else if self.resources != other.resources {
            combined.resources = union(&self.resources, &other.resources);
        } else if self.resource_names != other.resource_names {
            combined.resource_names =
                if self.resource_names.is_empty() || other.resource_names.is_empty() {
                    Vec::new()
                } else {
                    union(&self.resource_names, &other.resource_names)
                };
        } else if self.non_resource_urls != other.non_resource_urls {
            if self.non_resource_urls.is_empty() || other.non_resource_urls.is_empty() {
                return None;
            }
            combined.non_resource_urls = union(&self.non_resource_urls, &other.non_resource_urls);
        } else {
            combined.scopes = union(&effective_scopes(self), &effective_scopes(other));
        }
        Some(combined)
    }
}

fn effective_scopes(rule: &PolicyRule) -> Vec<String> {
    if rule.scopes.is_empty() {
        vec![SCOPE_PROJECT.to_string()]
    } else {
        rule.scopes.clone()
    }
}
