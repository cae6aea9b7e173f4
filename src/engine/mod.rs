//! engine
//!
//! Builds compositions from source facts according to a mapping config.
//!
//! # Pipeline
//!
//! ```text
//! Fixed paths -> Facts (in order) -> Absences -> Defaults -> Ehr id
//! ```
//!
//! 1. **Fixed**: rules without `maps_to` are applied before any fact
//!    (wildcard rules are held back until the facts are in, so they can see
//!    every repetition)
//! 2. **Facts**: a rule without `suffixes` starts a new repetition for each
//!    matching fact; any other rule binds its target leaves on the first
//!    contributing fact and assigns them once every `maps_to` key has a
//!    non-empty value
//! 3. **Absences**: rules that never completed get their configured absence
//! 4. **Defaults**: the default populator fills remaining required leaves
//! 5. **Ehr id**: rendered from its own `maps_to` facts, or random
//!
//! # Modules
//!
//! - [`convert`] - Suffix maps to typed values

pub mod convert;

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::composition::{
    Composition, CompositionError, DefaultsReport, FlatComposition, FlattenError, FlattenOptions,
    NodeId,
};
use crate::core::config::{ConfigError, MappingConfig, PathRule};
use crate::core::pattern::{PatternError, Renderer};
use crate::core::template::Template;
use crate::core::types::ALL_REQUIRED_PREFIX;
use crate::core::value::{Absence, Value};
use crate::source::{Fact, FactSource, SourceError};

use convert::ConvertError;

/// Errors from the build pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("path '{address}': {source}")]
    Composition {
        address: String,
        #[source]
        source: CompositionError,
    },

    #[error("path '{address}': {source}")]
    Render {
        address: String,
        #[source]
        source: PatternError,
    },

    #[error("path '{address}': {source}")]
    Convert {
        address: String,
        #[source]
        source: ConvertError,
    },

    #[error(transparent)]
    Flatten(#[from] FlattenError),

    #[error("ehr id source '{0}' produced no value")]
    MissingEhrId(String),
}

impl BuildError {
    fn composition(address: &str) -> impl FnOnce(CompositionError) -> Self + '_ {
        move |source| Self::Composition {
            address: address.to_string(),
            source,
        }
    }

    fn render(address: &str) -> impl FnOnce(PatternError) -> Self + '_ {
        move |source| Self::Render {
            address: address.to_string(),
            source,
        }
    }
}

/// Result of one build.
#[derive(Debug)]
pub struct BuildOutput<'t> {
    pub composition: Composition<'t>,
    pub ehr_id: Option<String>,
    /// Present when the default populator ran.
    pub defaults: Option<DefaultsReport>,
    /// Addresses of rules whose `maps_to` keys never all arrived.
    pub incomplete: Vec<String>,
    options: FlattenOptions,
}

impl<'t> BuildOutput<'t> {
    /// Flatten with the key style the config asked for.
    pub fn flatten(&self) -> Result<FlatComposition, BuildError> {
        Ok(self.composition.flatten_with(self.options)?)
    }
}

/// Where a binding's value goes.
#[derive(Debug)]
enum Target {
    Nodes(Vec<NodeId>),
    Ctx(String),
}

/// A rule instance waiting for its source values.
#[derive(Debug)]
struct Binding {
    rule: usize,
    target: Target,
    values: HashMap<String, String>,
    done: bool,
}

/// Composition builder for one template and config.
#[derive(Debug)]
pub struct Builder<'a> {
    template: &'a Template,
    config: &'a MappingConfig,
    rules: Vec<PathRule>,
    renderer: Renderer,
}

impl<'a> Builder<'a> {
    /// Validate `config` and prepare its rules.
    pub fn new(template: &'a Template, config: &'a MappingConfig) -> Result<Self, BuildError> {
        config.validate()?;
        Ok(Self {
            template,
            config,
            rules: config.rules(),
            renderer: Renderer::new(),
        })
    }

    /// Source keys this builder consumes.
    pub fn source_keys(&self) -> Vec<String> {
        self.config.source_keys()
    }

    /// Pull facts from `source` and build.
    pub fn build_from<S: FactSource + ?Sized>(&self, source: &S) -> Result<BuildOutput<'a>, BuildError> {
        let facts = source.facts(&self.source_keys())?;
        self.build(facts)
    }

    /// Build a composition from ordered facts.
    pub fn build<I>(&self, facts: I) -> Result<BuildOutput<'a>, BuildError>
    where
        I: IntoIterator<Item = Fact>,
    {
        let mut composition = Composition::new(self.template);

        for rule in self.rules.iter().filter(|r| r.is_fixed() && !r.has_wildcard()) {
            self.apply_fixed(&mut composition, rule)?;
        }

        let mut by_key: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, rule) in self.rules.iter().enumerate() {
            for key in &rule.maps_to {
                by_key.entry(key.as_str()).or_default().push(index);
            }
        }
        let ehr_keys: HashSet<&str> = self
            .config
            .ehr_id
            .iter()
            .flat_map(|e| e.maps_to.iter().map(String::as_str))
            .collect();

        let mut ehr_values: HashMap<String, String> = HashMap::new();
        let mut bindings: Vec<Binding> = Vec::new();
        let mut pending: HashMap<(String, usize), Vec<usize>> = HashMap::new();
        let mut consumed: HashSet<usize> = HashSet::new();
        let mut fact_count = 0usize;

        for fact in facts {
            fact_count += 1;
            if ehr_keys.contains(fact.key.as_str()) {
                if let Some(value) = fact.non_empty() {
                    ehr_values
                        .entry(fact.key.clone())
                        .or_insert_with(|| value.to_string());
                }
            }

            let Some(rules) = by_key.get(fact.key.as_str()) else {
                continue;
            };
            for &index in rules {
                let rule = &self.rules[index];
                consumed.insert(index);

                if rule.starts_repetition() {
                    let address = composition
                        .add(&rule.address)
                        .map_err(BuildError::composition(&rule.address))?;
                    debug!(source = %fact.key, %address, "started repetition");
                    continue;
                }

                let ids = match pending.remove(&(fact.key.clone(), index)) {
                    Some(ids) => ids,
                    None => {
                        let binding = bindings.len();
                        bindings.push(Binding {
                            rule: index,
                            target: self.bind(&mut composition, rule)?,
                            values: HashMap::new(),
                            done: false,
                        });
                        for key in rule.maps_to.iter().filter(|k| **k != fact.key) {
                            pending
                                .entry((key.clone(), index))
                                .or_default()
                                .push(binding);
                        }
                        vec![binding]
                    }
                };

                let Some(value) = fact.non_empty() else {
                    continue;
                };
                for id in ids {
                    let binding = &mut bindings[id];
                    binding.values.insert(fact.key.clone(), value.to_string());
                    if !binding.done && binding.values.len() == rule.maps_to.len() {
                        binding.done = true;
                        let values = self.source_values(rule, &binding.values);
                        assign(&self.renderer, &mut composition, rule, &binding.target, &values)?;
                    }
                }
            }
        }

        for rule in self.rules.iter().filter(|r| r.is_fixed() && r.has_wildcard()) {
            self.apply_fixed(&mut composition, rule)?;
        }

        let mut incomplete = Vec::new();
        for binding in bindings.iter().filter(|b| !b.done) {
            let rule = &self.rules[binding.rule];
            match &rule.absence {
                Some(absence) => mark_absent(&mut composition, rule, &binding.target, absence)?,
                None => {
                    warn!(path = %rule.address, "mapping never received all its source values");
                    incomplete.push(rule.address.clone());
                }
            }
        }
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.is_fixed() || consumed.contains(&index) {
                continue;
            }
            if let Some(absence) = &rule.absence {
                composition
                    .set_absent(&rule.address, absence.clone())
                    .map_err(BuildError::composition(&rule.address))?;
            }
        }

        let defaults = self.config.set_missing_required_to_default().then(|| {
            let fallback = self
                .config
                .fill_undefaultable_with_unknown()
                .then(Absence::unknown);
            composition.populate_defaults_with(fallback.as_ref())
        });

        let ehr_id = self.ehr_id(&ehr_values)?;

        info!(
            facts = fact_count,
            bindings = bindings.len(),
            incomplete = incomplete.len(),
            nodes = composition.len(),
            "built composition"
        );

        Ok(BuildOutput {
            composition,
            ehr_id,
            defaults,
            incomplete,
            options: FlattenOptions {
                include_root: self.config.include_root_id(),
            },
        })
    }

    /// Resolve where a new binding of `rule` writes.
    fn bind(&self, composition: &mut Composition<'a>, rule: &PathRule) -> Result<Target, BuildError> {
        if rule.is_ctx() {
            return Ok(Target::Ctx(rule.address.clone()));
        }
        composition
            .bind_leaves(&rule.address)
            .map(Target::Nodes)
            .map_err(BuildError::composition(&rule.address))
    }

    /// Source values in `maps_to` order, with the value map applied.
    fn source_values(&self, rule: &PathRule, values: &HashMap<String, String>) -> Vec<String> {
        rule.maps_to
            .iter()
            .map(|key| {
                let raw = values.get(key).map(String::as_str).unwrap_or_default();
                rule.value_map
                    .get(raw)
                    .cloned()
                    .unwrap_or_else(|| raw.to_string())
            })
            .collect()
    }

    fn apply_fixed(&self, composition: &mut Composition<'a>, rule: &PathRule) -> Result<(), BuildError> {
        if rule.suffixes.is_empty() {
            if let Some(absence) = &rule.absence {
                composition
                    .set_absent(&rule.address, absence.clone())
                    .map_err(BuildError::composition(&rule.address))?;
            }
            return Ok(());
        }

        if let Some(basename) = rule.address.strip_prefix(ALL_REQUIRED_PREFIX) {
            let fields = render_suffixes(&self.renderer, rule, &[])?;
            let value = match self.template.find(basename).first() {
                Some(path) => convert::to_value(path.node(), &fields).map_err(|source| {
                    BuildError::Convert {
                        address: rule.address.clone(),
                        source,
                    }
                })?,
                None => convert::to_ctx_value(&fields),
            };
            let count = composition.set_all_required(basename, value);
            debug!(path = %rule.address, count, "applied fixed value to all required leaves");
            return Ok(());
        }

        let target = self.bind(composition, rule)?;
        assign(&self.renderer, composition, rule, &target, &[])
    }

    fn ehr_id(&self, values: &HashMap<String, String>) -> Result<Option<String>, BuildError> {
        let Some(config) = &self.config.ehr_id else {
            return Ok(None);
        };
        if config.is_random() {
            return Ok(Some(Uuid::new_v4().to_string()));
        }

        let values = config
            .maps_to
            .iter()
            .map(|key| {
                values
                    .get(key)
                    .cloned()
                    .ok_or_else(|| BuildError::MissingEhrId(key.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let id = self
            .renderer
            .render(&config.value, &values)
            .map_err(BuildError::render("ehr_id"))?;
        Ok(Some(id))
    }
}

/// Render every suffix pattern of `rule`.
fn render_suffixes(
    renderer: &Renderer,
    rule: &PathRule,
    values: &[String],
) -> Result<std::collections::BTreeMap<String, String>, BuildError> {
    rule.suffixes
        .iter()
        .map(|(suffix, pattern)| {
            let rendered = renderer
                .render(pattern, values)
                .map_err(BuildError::render(&rule.address))?;
            Ok((suffix.clone(), rendered))
        })
        .collect()
}

fn assign(
    renderer: &Renderer,
    composition: &mut Composition<'_>,
    rule: &PathRule,
    target: &Target,
    values: &[String],
) -> Result<(), BuildError> {
    let fields = render_suffixes(renderer, rule, values)?;
    match target {
        Target::Ctx(address) => {
            composition
                .set(address, convert::to_ctx_value(&fields))
                .map_err(BuildError::composition(address))?;
        }
        Target::Nodes(ids) => {
            for &id in ids {
                let value: Value = convert::to_value(composition.node(id).template(), &fields)
                    .map_err(|source| BuildError::Convert {
                        address: rule.address.clone(),
                        source,
                    })?;
                composition.set_value(id, value);
            }
        }
    }
    Ok(())
}

fn mark_absent(
    composition: &mut Composition<'_>,
    rule: &PathRule,
    target: &Target,
    absence: &Absence,
) -> Result<(), BuildError> {
    match target {
        Target::Ctx(address) => {
            composition
                .set_absent(address, absence.clone())
                .map_err(BuildError::composition(address))?;
        }
        Target::Nodes(ids) => {
            debug!(path = %rule.address, count = ids.len(), "marking incomplete mapping absent");
            for &id in ids {
                composition.set_absence(id, absence.clone());
            }
        }
    }
    Ok(())
}
