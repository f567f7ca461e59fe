use anyhow::{Context, Result};
use serde::Deserialize;
use stagegate_signature::MatchMode;
use std::collections::BTreeMap;
use std::fs;

/// Operator-controlled enforcement switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Gate staged images on project allow rules.
    pub image_allow_rules: bool,
    /// Require image-declared permissions to be authorized by role authorizations.
    pub image_role_authorizations: bool,
}

// Engine configuration sourced from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub features: FeatureFlags,
    /// How the `signatures` entries of one selector combine.
    pub signature_match_mode: MatchMode,
    /// API group → PEM public key that must have signed any image using it.
    pub restricted_api_groups: BTreeMap<String, String>,
    /// Status write attempts per app during a bump before giving up.
    pub bump_conflict_retries: u32,
}

#[derive(Debug, Deserialize)]
struct EngineConfigOverride {
    image_allow_rules: Option<bool>,
    image_role_authorizations: Option<bool>,
    signature_match_mode: Option<String>,
    restricted_api_groups: Option<BTreeMap<String, String>>,
    bump_conflict_retries: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            features: FeatureFlags::default(),
            signature_match_mode: MatchMode::Any,
            restricted_api_groups: BTreeMap::new(),
            bump_conflict_retries: 3,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let image_allow_rules = std::env::var("STAGEGATE_FEATURE_IMAGE_ALLOW_RULES")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .with_context(|| "parse STAGEGATE_FEATURE_IMAGE_ALLOW_RULES")?;
        let image_role_authorizations =
            std::env::var("STAGEGATE_FEATURE_IMAGE_ROLE_AUTHORIZATIONS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .with_context(|| "parse STAGEGATE_FEATURE_IMAGE_ROLE_AUTHORIZATIONS")?;
        let signature_match_mode = std::env::var("STAGEGATE_SIGNATURE_MATCH_MODE")
            .unwrap_or_else(|_| "any".to_string())
            .parse()
            .with_context(|| "parse STAGEGATE_SIGNATURE_MATCH_MODE")?;
        let bump_conflict_retries = std::env::var("STAGEGATE_BUMP_CONFLICT_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .with_context(|| "parse STAGEGATE_BUMP_CONFLICT_RETRIES")?;
        Ok(Self {
            features: FeatureFlags {
                image_allow_rules,
                image_role_authorizations,
            },
            signature_match_mode,
            restricted_api_groups: BTreeMap::new(),
            bump_conflict_retries,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("STAGEGATE_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read STAGEGATE_CONFIG: {path}"))?;
            let override_cfg: EngineConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse engine config yaml")?;
            if let Some(value) = override_cfg.image_allow_rules {
                config.features.image_allow_rules = value;
            }
            if let Some(value) = override_cfg.image_role_authorizations {
                config.features.image_role_authorizations = value;
            }
            if let Some(value) = override_cfg.signature_match_mode {
                config.signature_match_mode = value
                    .parse()
                    .with_context(|| "parse signature_match_mode")?;
            }
            if let Some(value) = override_cfg.restricted_api_groups {
                config.restricted_api_groups = value;
            }
            if let Some(value) = override_cfg.bump_conflict_retries {
                config.bump_conflict_retries = value;
            }
        }
        Ok(config)
    }

    pub fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn with_restricted_api_group(
        mut self,
        api_group: impl Into<String>,
        public_key_pem: impl Into<String>,
    ) -> Self {
        self.restricted_api_groups
            .insert(api_group.into(), public_key_pem.into());
        self
    }
}
