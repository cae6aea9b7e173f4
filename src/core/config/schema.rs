//! core::config::schema
//!
//! Mapping configuration schema types.
//!
//! # Example
//!
//! ```toml
//! set_missing_required_to_default = true
//! fill_undefaultable_with_unknown = false
//! include_root_id = true
//!
//! [ehr_id]
//! maps_to = ["/patient/id"]
//! value = "{{maps_to.[0]}}"
//!
//! [paths."test/context/status"]
//! maps_to = ["/status"]
//! suffixes = { "" = "{{maps_to.[0]}}" }
//! value_map = { "A" = "active" }
//! absence = { value = "unknown", code = "253", terminology = "openehr" }
//!
//! [paths."ctx/language"]
//! value = "en"
//! ```
//!
//! # Validation
//!
//! Values are validated after parsing: addresses must parse, every value
//! pattern must compile and name only existing `maps_to` entries (see
//! [`crate::core::pattern`]), and mapped paths may not use wildcards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::{Address, ALL_REQUIRED_PREFIX, CTX_PREFIX};
use crate::core::value::Absence;
use crate::core::pattern::Renderer;

/// Marker value producing a random ehr id.
pub const RANDOM_EHR_ID: &str = "{random}";

/// Top-level mapping configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MappingConfig {
    /// Run the default populator after all facts are consumed
    pub set_missing_required_to_default: Option<bool>,

    /// Mark un-defaultable required leaves as "unknown"
    pub fill_undefaultable_with_unknown: Option<bool>,

    /// Prefix flat keys with the template root id
    pub include_root_id: Option<bool>,

    /// How the ehr id is derived
    pub ehr_id: Option<EhrIdConfig>,

    /// Composition address -> rule
    pub paths: BTreeMap<String, PathSpec>,
}

impl MappingConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let renderer = Renderer::new();
        if let Some(ehr_id) = &self.ehr_id {
            ehr_id.check(&renderer)?;
        }
        for (address, spec) in &self.paths {
            spec.validate(address, &renderer)?;
        }
        Ok(())
    }

    /// Defaults to `true` if not configured.
    pub fn set_missing_required_to_default(&self) -> bool {
        self.set_missing_required_to_default.unwrap_or(true)
    }

    /// Defaults to `false` if not configured.
    pub fn fill_undefaultable_with_unknown(&self) -> bool {
        self.fill_undefaultable_with_unknown.unwrap_or(false)
    }

    /// Defaults to `true` if not configured.
    pub fn include_root_id(&self) -> bool {
        self.include_root_id.unwrap_or(true)
    }

    /// Normalized rules in address order.
    pub fn rules(&self) -> Vec<PathRule> {
        self.paths
            .iter()
            .map(|(address, spec)| spec.to_rule(address))
            .collect()
    }

    /// Every source key referenced by a path or by the ehr id, deduplicated,
    /// in first-seen order.
    pub fn source_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        let ehr_keys = self.ehr_id.iter().flat_map(|e| e.maps_to.iter());
        let path_keys = self.paths.values().flat_map(|s| s.maps_to().iter());
        for key in ehr_keys.chain(path_keys) {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }
}

/// Ehr id derivation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EhrIdConfig {
    /// Source keys, in `maps_to.[N]` order
    pub maps_to: Vec<String>,

    /// Pattern, or `{random}` for a UUID v4
    pub value: String,
}

impl Default for EhrIdConfig {
    fn default() -> Self {
        Self {
            maps_to: Vec::new(),
            value: "{{maps_to.[0]}}".to_string(),
        }
    }
}

impl EhrIdConfig {
    /// Whether this config asks for a random id.
    pub fn is_random(&self) -> bool {
        self.value.trim() == RANDOM_EHR_ID
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check(&Renderer::new())
    }

    fn check(&self, renderer: &Renderer) -> Result<(), ConfigError> {
        if self.is_random() {
            return Ok(());
        }
        check_pattern(renderer, "ehr_id", &self.value, self.maps_to.len())
    }
}

/// One `[paths."..."]` entry: a bare fixed value or a full mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PathSpec {
    Fixed(String),
    Mapped(PathMapping),
}

impl PathSpec {
    pub fn maps_to(&self) -> &[String] {
        match self {
            Self::Fixed(_) => &[],
            Self::Mapped(mapping) => &mapping.maps_to,
        }
    }

    fn validate(&self, address: &str, renderer: &Renderer) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::InvalidValue(format!(
                "path '{address}': {reason}"
            )))
        };

        let trimmed = address.trim_matches('/');
        let target = trimmed
            .strip_prefix(ALL_REQUIRED_PREFIX)
            .unwrap_or(trimmed);
        let parsed = match Address::parse(target) {
            Ok(parsed) => parsed,
            Err(e) => return invalid(&e.to_string()),
        };

        let Self::Mapped(mapping) = self else {
            return Ok(());
        };

        if mapping.value.is_some() && !mapping.suffixes.is_empty() {
            return invalid("set either 'value' or 'suffixes', not both");
        }
        if mapping.maps_to.is_empty() {
            if mapping.value.is_none() && mapping.suffixes.is_empty() && mapping.absence.is_none() {
                return invalid("nothing to set: add 'maps_to', 'value', 'suffixes' or 'absence'");
            }
        } else {
            if parsed.has_wildcard() || trimmed.starts_with(ALL_REQUIRED_PREFIX) {
                return invalid("mapped paths cannot use wildcards");
            }
            if trimmed.starts_with(CTX_PREFIX) && mapping.suffixes.is_empty() && mapping.value.is_none() {
                return invalid("context paths cannot start repetitions");
            }
        }

        let suffixes = mapping.value.iter().chain(mapping.suffixes.values());
        for pattern in suffixes {
            check_pattern(renderer, address, pattern, mapping.maps_to.len())?;
        }
        Ok(())
    }

    fn to_rule(&self, address: &str) -> PathRule {
        match self {
            Self::Fixed(value) => PathRule {
                address: address.to_string(),
                maps_to: Vec::new(),
                suffixes: BTreeMap::from([(String::new(), value.clone())]),
                value_map: BTreeMap::new(),
                absence: None,
            },
            Self::Mapped(mapping) => {
                let suffixes = match &mapping.value {
                    Some(value) => BTreeMap::from([(String::new(), value.clone())]),
                    None => mapping.suffixes.clone(),
                };
                PathRule {
                    address: address.to_string(),
                    maps_to: mapping.maps_to.clone(),
                    suffixes,
                    value_map: mapping.value_map.clone(),
                    absence: mapping.absence.clone(),
                }
            }
        }
    }
}

/// Full form of a path entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PathMapping {
    /// Source keys, in `maps_to.[N]` order
    pub maps_to: Vec<String>,

    /// Flat suffix -> pattern; `""` is the bare key
    pub suffixes: BTreeMap<String, String>,

    /// Shorthand for `suffixes = { "" = value }`
    pub value: Option<String>,

    /// Source value -> replacement, applied before rendering
    pub value_map: BTreeMap<String, String>,

    /// Marker used when the mapping never completes
    pub absence: Option<Absence>,
}

/// A path entry with its shorthands expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRule {
    pub address: String,
    pub maps_to: Vec<String>,
    pub suffixes: BTreeMap<String, String>,
    pub value_map: BTreeMap<String, String>,
    pub absence: Option<Absence>,
}

impl PathRule {
    /// Rules without source keys are applied unconditionally.
    pub fn is_fixed(&self) -> bool {
        self.maps_to.is_empty()
    }

    pub fn is_ctx(&self) -> bool {
        self.address.trim_start_matches('/').starts_with(CTX_PREFIX)
    }

    pub fn has_wildcard(&self) -> bool {
        self.address.contains(":*") || self.address.starts_with(ALL_REQUIRED_PREFIX)
    }

    /// Each matching fact starts a new repetition.
    pub fn starts_repetition(&self) -> bool {
        self.suffixes.is_empty() && !self.maps_to.is_empty()
    }
}

fn check_pattern(
    renderer: &Renderer,
    owner: &str,
    pattern: &str,
    available: usize,
) -> Result<(), ConfigError> {
    renderer
        .check(pattern, available)
        .map_err(|e| ConfigError::InvalidValue(format!("path '{owner}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> MappingConfig {
        toml::from_str(text).unwrap()
    }

    mod mapping_config {
        use super::*;

        #[test]
        fn defaults() {
            let config = MappingConfig::default();
            assert!(config.set_missing_required_to_default());
            assert!(!config.fill_undefaultable_with_unknown());
            assert!(config.include_root_id());
            assert!(config.paths.is_empty());
        }

        #[test]
        fn fixed_shorthands() {
            let config = parse(
                r#"
                [paths]
                "ctx/territory" = "DE"

                [paths."ctx/language"]
                value = "en"
                "#,
            );
            assert!(config.validate().is_ok());
            let rules = config.rules();
            assert_eq!(rules.len(), 2);
            assert!(rules.iter().all(PathRule::is_fixed));
            assert!(rules.iter().all(PathRule::is_ctx));
            assert_eq!(rules[0].suffixes[""], "en");
            assert_eq!(rules[1].suffixes[""], "DE");
        }

        #[test]
        fn mapped_rule() {
            let config = parse(
                r#"
                [paths."test/event/test_name"]
                maps_to = ["/a", "/b"]
                suffixes = { "" = "{{maps_to.[0]}} {{maps_to.[1]}}" }
                value_map = { "x" = "y" }
                absence = { value = "unknown", code = "253", terminology = "openehr" }
                "#,
            );
            assert!(config.validate().is_ok());
            let rule = &config.rules()[0];
            assert_eq!(rule.maps_to, vec!["/a", "/b"]);
            assert_eq!(rule.absence, Some(Absence::unknown()));
            assert!(!rule.starts_repetition());
        }

        #[test]
        fn repetition_rule() {
            let config = parse(
                r#"
                [paths."test/event"]
                maps_to = ["/events/*"]
                "#,
            );
            assert!(config.validate().is_ok());
            assert!(config.rules()[0].starts_repetition());
        }

        #[test]
        fn source_keys_are_deduplicated() {
            let config = parse(
                r#"
                [ehr_id]
                maps_to = ["/id"]

                [paths."a"]
                maps_to = ["/x", "/id"]
                suffixes = { "" = "{{maps_to.[0]}}" }

                [paths."b"]
                maps_to = ["/x"]
                suffixes = { "" = "{{maps_to.[0]}}" }
                "#,
            );
            assert_eq!(config.source_keys(), vec!["/id", "/x"]);
        }

        #[test]
        fn reject_unknown_fields() {
            let result: Result<MappingConfig, _> = toml::from_str("unknown_field = true");
            assert!(result.is_err());
        }

        #[test]
        fn roundtrip() {
            let config = parse(
                r#"
                include_root_id = false

                [ehr_id]
                value = "{random}"

                [paths."a/b"]
                maps_to = ["/x"]
                suffixes = { code = "{{maps_to.[0]}}", terminology = "local" }
                "#,
            );
            let text = toml::to_string_pretty(&config).unwrap();
            let parsed: MappingConfig = toml::from_str(&text).unwrap();
            assert_eq!(config, parsed);
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn placeholder_out_of_range() {
            let config = parse(
                r#"
                [paths."a"]
                maps_to = ["/x"]
                suffixes = { "" = "{{maps_to.[1]}}" }
                "#,
            );
            assert!(config.validate().is_err());
        }

        #[test]
        fn unknown_variable_rejected() {
            let config = parse(
                r#"
                [paths."a"]
                maps_to = ["/x"]
                suffixes = { "" = "{{ status }}" }
                "#,
            );
            assert!(config.validate().is_err());
        }

        #[test]
        fn unclosed_expression_rejected() {
            let config = parse(
                r#"
                [paths."a"]
                maps_to = ["/x"]
                suffixes = { "" = "{{ maps_to.[0] " }
                "#,
            );
            assert!(config.validate().is_err());
        }

        #[test]
        fn date_helper_accepted() {
            let config = parse(
                r#"
                [paths."a"]
                maps_to = ["/x"]
                suffixes = { "" = "{{date_isoformat maps_to.[0]}}" }
                "#,
            );
            assert!(config.validate().is_ok());
        }

        #[test]
        fn placeholder_without_maps_to() {
            let config = parse(
                r#"
                [paths."a"]
                value = "{{maps_to.[0]}}"
                "#,
            );
            assert!(config.validate().is_err());
        }

        #[test]
        fn mapped_wildcard_rejected() {
            let config = parse(
                r#"
                [paths."a:*/b"]
                maps_to = ["/x"]
                suffixes = { "" = "{{maps_to.[0]}}" }
                "#,
            );
            assert!(config.validate().is_err());
        }

        #[test]
        fn fixed_wildcard_allowed() {
            let config = parse(
                r#"
                [paths]
                "a:*/b" = "x"
                "**/name" = "y"
                "#,
            );
            assert!(config.validate().is_ok());
            assert!(config.rules().iter().all(PathRule::has_wildcard));
        }

        #[test]
        fn value_and_suffixes_conflict() {
            let config = parse(
                r#"
                [paths."a"]
                value = "x"
                suffixes = { code = "y" }
                "#,
            );
            assert!(config.validate().is_err());
        }

        #[test]
        fn empty_mapping_rejected() {
            let config = parse(
                r#"
                [paths."a"]
                value_map = { "x" = "y" }
                "#,
            );
            assert!(config.validate().is_err());
        }

        #[test]
        fn malformed_address_rejected() {
            let config = parse(
                r#"
                [paths]
                "a:x/b" = "v"
                "#,
            );
            assert!(config.validate().is_err());
        }

        #[test]
        fn ehr_id_placeholder_checked() {
            let ok = EhrIdConfig {
                maps_to: vec!["/id".into()],
                value: "{{maps_to.[0]}}".into(),
            };
            assert!(ok.validate().is_ok());
            let bad = EhrIdConfig {
                maps_to: Vec::new(),
                value: "{{maps_to.[0]}}".into(),
            };
            assert!(bad.validate().is_err());
            let random = EhrIdConfig {
                maps_to: Vec::new(),
                value: "{random}".into(),
            };
            assert!(random.validate().is_ok());
        }
    }
}
