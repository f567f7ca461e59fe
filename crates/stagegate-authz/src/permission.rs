//! Named permission sets and the covering/merging algebra over them.
//!
//! # Purpose
//! A [`PermissionSet`] is the unit exchanged between images (declared
//! requirements), operators (user grants) and policy (authorized sets). This
//! module compares them ([`grants_all`]) and keeps stored sets compact
//! ([`simplify_set`]).
//!
//! # Key invariants
//! - Sets are compared per service name; rules for different services never
//!   cover each other.
//! - All functions are pure and leave their inputs untouched.
//! - `simplify_set` output is canonical: services sorted by name, rules sorted
//!   and de-duplicated, so `simplify_set(simplify_set(x)) == simplify_set(x)`.
//!
//! # Examples
//! ```rust
//! use stagegate_authz::{grants_all, PermissionSet, PolicyRule};
//!
//! let requested = vec![PermissionSet::new(
//!     "web",
//!     vec![PolicyRule::new(&["apps"], &["get"], &["deployments"])],
//! )];
//! let granted = vec![PermissionSet::new("web", vec![PolicyRule::new(&["*"], &["*"], &["*"])])];
//! let (missing, ok) = grants_all("payments", &requested, &granted);
//! assert!(ok);
//! assert!(missing.is_empty());
//! ```
use crate::PolicyRule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rules requested by, or granted to, one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSet {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PolicyRule>,
}

impl PermissionSet {
    pub fn new(service_name: impl Into<String>, rules: Vec<PolicyRule>) -> Self {
        Self {
            service_name: service_name.into(),
            rules,
        }
    }

    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Same rules attributed to another service.
    pub fn with_service_name(&self, service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            rules: self.rules.clone(),
        }
    }

    /// Whether this set grants every single-valued part of `requested` to `service_name`.
    pub fn grants(&self, namespace: &str, service_name: &str, requested: &PolicyRule) -> bool {
        if self.service_name != service_name {
            return false;
        }
        requested.exploded().iter().all(|individual| {
            self.rules
                .iter()
                .any(|granted| granted.grants(namespace, individual))
        })
    }
}

/// Merge sets by service name, concatenating rules.
pub fn group_by_service_name(sets: &[PermissionSet]) -> BTreeMap<String, PermissionSet> {
    let mut by_service: BTreeMap<String, PermissionSet> = BTreeMap::new();
    for set in sets {
        let entry = by_service
            .entry(set.service_name.clone())
            .or_insert_with(|| PermissionSet::new(set.service_name.clone(), Vec::new()));
        entry.rules.extend(set.rules.iter().cloned());
    }
    by_service
}

fn drop_subsumed(rules: &mut Vec<PolicyRule>) -> bool {
    for idx in 0..rules.len() {
        let subsumed = rules
            .iter()
            .enumerate()
            .any(|(other, rule)| other != idx && rule.subsumes(&rules[idx]));
        if subsumed {
            rules.remove(idx);
            return true;
        }
    }
    false
}

fn combine_once(rules: &mut Vec<PolicyRule>) -> bool {
    for left in 0..rules.len() {
        for right in (left + 1)..rules.len() {
            if let Some(combined) = rules[left].combine(&rules[right]) {
                rules[left] = combined;
                rules.remove(right);
                return true;
            }
        }
    }
    false
}

/// Canonical form of one service's rules.
pub fn simplify(set: &PermissionSet) -> PermissionSet {
    let mut rules: Vec<PolicyRule> = set.rules.iter().map(PolicyRule::normalized).collect();
    // Every step removes a rule, so this terminates.
    while drop_subsumed(&mut rules) || combine_once(&mut rules) {}
    rules.sort();
    PermissionSet::new(set.service_name.clone(), rules)
}

/// Group by service and simplify each group; output is sorted by service name.
pub fn simplify_set(sets: &[PermissionSet]) -> Vec<PermissionSet> {
    group_by_service_name(sets)
        .values()
        .map(simplify)
        .collect()
}

/// Rules of `requested` not covered by `granted`, simplified.
pub fn grants(
    namespace: &str,
    requested: &PermissionSet,
    granted: &PermissionSet,
) -> (PermissionSet, bool) {
    let uncovered: Vec<PolicyRule> = requested
        .rules
        .iter()
        .filter(|rule| !granted.grants(namespace, &requested.service_name, rule))
        .cloned()
        .collect();
    let ok = uncovered.is_empty();
    (
        simplify(&PermissionSet::new(requested.service_name.clone(), uncovered)),
        ok,
    )
}

/// Compare every requested service against the granted sets of the same name.
///
/// Returns the uncovered rules per service, sorted by service name, and whether
/// nothing is missing.
pub fn grants_all(
    namespace: &str,
    requested: &[PermissionSet],
    granted: &[PermissionSet],
) -> (Vec<PermissionSet>, bool) {
    let granted_by_service = group_by_service_name(granted);
    let mut missing = Vec::new();

    for (service_name, requested_set) in group_by_service_name(requested) {
        let granted_set = granted_by_service
            .get(&service_name)
            .cloned()
            .unwrap_or_else(|| PermissionSet::new(service_name.clone(), Vec::new()));
        let (service_missing, ok) = grants(namespace, &requested_set, &granted_set);
        if !ok {
            missing.push(service_missing);
        }
    }

    let ok = missing.is_empty();
    (missing, ok)
}
