//! Signature requirements carried by image selectors.
use crate::{SignatureError, SignatureResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the entries of a selector's `signatures` list combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Any one satisfied entry is enough.
    #[default]
    Any,
    /// Every entry must be satisfied.
    All,
}

impl std::str::FromStr for MatchMode {
    type Err = SignatureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(MatchMode::Any),
            "all" => Ok(MatchMode::All),
            other => Err(SignatureError::InvalidRule(format!(
                "unknown signature match mode {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRules {
    #[serde(default)]
    pub signed_by: SignedBy,
    #[serde(default)]
    pub annotations: AnnotationSelector,
}

impl SignatureRules {
    /// Requires a signature by every key in `keys`.
    pub fn signed_by_all(keys: Vec<String>) -> Self {
        Self {
            signed_by: SignedBy {
                all_of: keys,
                any_of: Vec::new(),
            },
            annotations: AnnotationSelector::default(),
        }
    }

    pub fn with_annotations(mut self, annotations: AnnotationSelector) -> Self {
        self.annotations = annotations;
        self
    }
}

/// PEM public keys that must have signed the image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedBy {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<String>,
}

/// Predicate over the annotations recorded in a signature payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationSelector {
    #[serde(default, rename = "match", skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expressions: Vec<AnnotationRequirement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl AnnotationRequirement {
    fn operator(&self) -> SignatureResult<Operator> {
        let operator = match self.operator.as_str() {
            "In" | "in" => Operator::In,
            "NotIn" | "notin" => Operator::NotIn,
            "Exists" | "exists" => Operator::Exists,
            "DoesNotExist" | "!" => Operator::DoesNotExist,
            other => {
                return Err(SignatureError::InvalidSelector(format!(
                    "{other:?} is not a valid selector operator"
                )));
            }
        };
        let needs_values = matches!(operator, Operator::In | Operator::NotIn);
        if self.key.is_empty() {
            return Err(SignatureError::InvalidSelector(
                "expression key must not be empty".to_string(),
            ));
        }
        if needs_values == self.values.is_empty() {
            return Err(SignatureError::InvalidSelector(format!(
                "operator {:?} on key {:?} {} values",
                self.operator,
                self.key,
                if needs_values { "requires" } else { "does not take" }
            )));
        }
        Ok(operator)
    }

    fn matches(&self, annotations: &BTreeMap<String, String>) -> SignatureResult<bool> {
        let value = annotations.get(&self.key);
        Ok(match self.operator()? {
            Operator::In => value.is_some_and(|value| self.values.contains(value)),
            Operator::NotIn => value.is_none_or(|value| !self.values.contains(value)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        })
    }
}

impl AnnotationSelector {
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.expressions.is_empty()
    }

    pub fn validate(&self) -> SignatureResult<()> {
        for expression in &self.expressions {
            expression.operator()?;
        }
        Ok(())
    }

    /// `match` entries must be present with equal values; every expression must hold.
    pub fn matches(&self, annotations: &BTreeMap<String, String>) -> SignatureResult<bool> {
        let labels_match = self
            .match_labels
            .iter()
            .all(|(key, value)| annotations.get(key) == Some(value));
        if !labels_match {
            return Ok(false);
        }
        for expression in &self.expressions {
            if !expression.matches(annotations)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn requirement(key: &str, operator: &str, values: &[&str]) -> AnnotationRequirement {
        AnnotationRequirement {
            key: key.to_string(),
            operator: operator.to_string(),
            values: values.iter().map(|value| value.to_string()).collect(),
        }
    }

    #[test]
    fn empty_selector_matches_anything() {
        let selector = AnnotationSelector::default();
        assert!(selector.is_empty());
        assert!(selector.matches(&BTreeMap::new()).expect("match"));
    }

    #[test]
    fn match_labels_require_superset() {
        let selector = AnnotationSelector {
            match_labels: annotations(&[("tag", "ci")]),
            expressions: Vec::new(),
        };
        assert!(selector
            .matches(&annotations(&[("tag", "ci"), ("team", "a")]))
            .expect("match"));
        assert!(!selector.matches(&annotations(&[("tag", "prod")])).expect("match"));
        assert!(!selector.matches(&BTreeMap::new()).expect("match"));
    }

    #[test]
    fn expressions() {
        let signed = annotations(&[("env", "prod"), ("team", "payments")]);
        let cases = [
            (requirement("env", "In", &["prod", "staging"]), true),
            (requirement("env", "NotIn", &["prod"]), false),
            (requirement("missing", "NotIn", &["prod"]), true),
            (requirement("team", "Exists", &[]), true),
            (requirement("team", "DoesNotExist", &[]), false),
        ];
        for (expression, expected) in cases {
            let selector = AnnotationSelector {
                match_labels: BTreeMap::new(),
                expressions: vec![expression.clone()],
            };
            assert_eq!(selector.matches(&signed).expect("match"), expected, "{expression:?}");
        }
    }

    #[test]
    fn invalid_operator_is_rejected() {
        let selector = AnnotationSelector {
            match_labels: BTreeMap::new(),
            expressions: vec![requirement("env", "Near", &["prod"])],
        };
        let err = selector.validate().expect_err("invalid operator");
        assert!(err.is_invalid_policy());

        let missing_values = AnnotationSelector {
            match_labels: BTreeMap::new(),
            expressions: vec![requirement("env", "In", &[])],
        };
        assert!(missing_values.validate().is_err());
    }

    #[test]
    fn rules_deserialize_from_policy_documents() {
        let rules: SignatureRules = serde_yaml::from_str(
            r#"
signedBy:
  allOf: ["key-a"]
  anyOf: ["key-b", "key-c"]
annotations:
  match:
    tag: ci
  expressions:
    - key: env
      operator: In
      values: [prod]
"#,
        )
        .expect("parse");
        assert_eq!(rules.signed_by.all_of, vec!["key-a".to_string()]);
        assert_eq!(rules.signed_by.any_of.len(), 2);
        assert_eq!(rules.annotations.match_labels.get("tag").map(String::as_str), Some("ci"));
        assert_eq!(rules.annotations.expressions[0].operator, "In");
    }

    #[test]
    fn match_mode_parses() {
        assert_eq!("any".parse::<MatchMode>().expect("any"), MatchMode::Any);
        assert_eq!(" ALL ".parse::<MatchMode>().expect("all"), MatchMode::All);
        assert!("some".parse::<MatchMode>().is_err());
    }
}
