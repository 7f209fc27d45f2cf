// Typed engine configuration (run.toml, schemes.toml, positions.toml,
// adjustments.toml) parsed from TOML text and validated with field paths.

use crate::error::FitError;
use crate::model::player::DerivedColumn;
use crate::model::position::Position;
use crate::model::scheme::Scheme;
use crate::model::team::TendencyRatio;
use crate::scoring::adjust::AdjustmentRule;
use crate::scoring::formula::{PositionModel, WEIGHT_TOLERANCE};
use crate::scoring::normalize::ScaleRange;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse {file}: {source}")]
    Parse {
        file: String,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    Validation { field: String, message: String },
}

impl From<ConfigError> for FitError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Parse { file, source } => FitError::configuration(file, source.to_string()),
            ConfigError::Validation { field, message } => FitError::configuration(field, message),
        }
    }
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// run.toml
// ---------------------------------------------------------------------------

/// Engine-level run settings. `[data]` and `[output]` belong to the driver
/// and are ignored here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    /// Season the recency penalty measures from. When absent the caller
    /// picks one (latest loaded season, else the calendar year).
    #[serde(default)]
    pub current_season: Option<i32>,
    #[serde(default)]
    pub normalizer: ScaleRange,
    /// Deterministic lower bound on final fits. Off unless set.
    #[serde(default)]
    pub fit_floor: Option<f64>,
    #[serde(default)]
    pub team_ranks: TeamRankConfig,
}

/// Box-score columns ranked across the league before any fit is scored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamRankConfig {
    #[serde(default)]
    pub higher_is_better: Vec<String>,
    #[serde(default)]
    pub lower_is_better: Vec<String>,
}

/// The resolved per-run values every fit needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    pub current_season: i32,
    pub fit_floor: Option<f64>,
}

// ---------------------------------------------------------------------------
// schemes.toml
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RubricTerm {
    pub metric: String,
    pub target: f64,
    pub tolerance: f64,
    pub weight: f64,
    /// Blend the season value with the weekly mean.
    #[serde(default)]
    pub blend: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemesFile {
    #[serde(default = "default_blend_alpha")]
    blend_alpha: f64,
    #[serde(default)]
    derived: Vec<TendencyRatio>,
    rubrics: BTreeMap<String, Vec<RubricTerm>>,
    #[serde(default)]
    overrides: BTreeMap<String, Scheme>,
}

fn default_blend_alpha() -> f64 {
    0.2
}

#[derive(Debug, Clone)]
pub struct SchemeConfig {
    /// Season share of a blended observation; the weekly mean gets the rest.
    pub blend_alpha: f64,
    pub derived: Vec<TendencyRatio>,
    pub rubrics: BTreeMap<Scheme, Vec<RubricTerm>>,
    /// Forced predicted labels keyed by upper-cased team abbreviation.
    pub overrides: BTreeMap<String, Scheme>,
}

impl SchemeConfig {
    pub fn override_for(&self, team: &str) -> Option<Scheme> {
        self.overrides.get(&team.trim().to_ascii_uppercase()).copied()
    }

    fn from_file(file: SchemesFile) -> Result<Self, ConfigError> {
        let mut rubrics = BTreeMap::new();
        for (key, terms) in file.rubrics {
            let scheme = Scheme::from_str_scheme(&key)
                .ok_or_else(|| invalid(format!("schemes.rubrics.{key}"), "unknown scheme"))?;
            rubrics.insert(scheme, terms);
        }
        let overrides = file
            .overrides
            .into_iter()
            .map(|(team, scheme)| (team.trim().to_ascii_uppercase(), scheme))
            .collect();
        let config = SchemeConfig {
            blend_alpha: file.blend_alpha,
            derived: file.derived,
            rubrics,
            overrides,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.blend_alpha) {
            return Err(invalid(
                "schemes.blend_alpha",
                format!("must be between 0.0 and 1.0 inclusive, got {}", self.blend_alpha),
            ));
        }
        for (i, ratio) in self.derived.iter().enumerate() {
            if ratio.floor <= 0.0 {
                return Err(invalid(
                    format!("schemes.derived[{i}].floor"),
                    format!("must be > 0, got {}", ratio.floor),
                ));
            }
        }
        for scheme in Scheme::ALL {
            let field = format!("schemes.rubrics.{}", scheme.key());
            let terms = self
                .rubrics
                .get(&scheme)
                .ok_or_else(|| invalid(field.clone(), "missing rubric for scheme"))?;
            if terms.is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
            for (i, term) in terms.iter().enumerate() {
                if term.tolerance <= 0.0 {
                    return Err(invalid(
                        format!("{field}[{i}].tolerance"),
                        format!("must be > 0, got {}", term.tolerance),
                    ));
                }
                if term.weight < 0.0 {
                    return Err(invalid(
                        format!("{field}[{i}].weight"),
                        format!("must be >= 0, got {}", term.weight),
                    ));
                }
            }
            let total: f64 = terms.iter().map(|t| t.weight).sum();
            if (total - 1.0).abs() > WEIGHT_TOLERANCE {
                return Err(invalid(field, format!("weights must sum to 1, got {total}")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// positions.toml
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TermConfig {
    pub column: String,
    pub weight: f64,
    /// Use `1 - scaled` (lower raw value is better).
    #[serde(default)]
    pub complement: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemeFormulaConfig {
    pub production_weight: f64,
    pub efficiency_weight: f64,
    pub efficiency: Vec<TermConfig>,
    #[serde(default)]
    pub penalties: Vec<TermConfig>,
    #[serde(default)]
    pub extra: Vec<TermConfig>,
}

/// A display metric ranked across the whole population.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RankingMetric {
    pub metric: String,
    #[serde(default)]
    pub complement: bool,
}

impl RankingMetric {
    pub fn label(&self) -> String {
        if self.complement {
            format!("{}_inv", self.metric)
        } else {
            self.metric.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PositionFile {
    #[serde(default)]
    derived: Vec<DerivedColumn>,
    features: Vec<String>,
    production: Vec<TermConfig>,
    schemes: BTreeMap<String, SchemeFormulaConfig>,
    #[serde(default)]
    ranking: Vec<RankingMetric>,
}

#[derive(Debug, Clone)]
pub struct PositionConfig {
    pub derived: Vec<DerivedColumn>,
    pub features: Vec<String>,
    pub production: Vec<TermConfig>,
    pub schemes: BTreeMap<Scheme, SchemeFormulaConfig>,
    pub ranking: Vec<RankingMetric>,
}

impl PositionConfig {
    fn from_file(key: &str, file: PositionFile) -> Result<Self, ConfigError> {
        let mut schemes = BTreeMap::new();
        for (scheme_key, formula) in file.schemes {
            let scheme = Scheme::from_str_scheme(&scheme_key).ok_or_else(|| {
                invalid(format!("positions.{key}.schemes.{scheme_key}"), "unknown scheme")
            })?;
            schemes.insert(scheme, formula);
        }
        Ok(PositionConfig {
            derived: file.derived,
            features: file.features,
            production: file.production,
            schemes,
            ranking: file.ranking,
        })
    }

    /// Columns the population ranking normalizes, in declaration order.
    pub fn ranking_columns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.ranking
            .iter()
            .filter(|m| seen.insert(m.metric.as_str()))
            .map(|m| m.metric.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Assembled engine configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub run: RunConfig,
    pub schemes: SchemeConfig,
    pub positions: BTreeMap<Position, PositionConfig>,
    /// Ordered adjustment rules per position.
    pub adjustments: BTreeMap<Position, Vec<AdjustmentRule>>,
}

impl EngineConfig {
    /// Parse and validate the four configuration documents.
    pub fn from_toml_strs(
        run: &str,
        schemes: &str,
        positions: &str,
        adjustments: &str,
    ) -> Result<Self, ConfigError> {
        let run: RunConfig = parse("run.toml", run)?;
        let schemes_file: SchemesFile = parse("schemes.toml", schemes)?;
        let positions_file: BTreeMap<String, PositionFile> = parse("positions.toml", positions)?;
        let adjustments_file: BTreeMap<String, Vec<AdjustmentRule>> =
            parse("adjustments.toml", adjustments)?;

        let schemes = SchemeConfig::from_file(schemes_file)?;

        let mut position_configs = BTreeMap::new();
        for (key, file) in positions_file {
            let position = Position::from_str_pos(&key)
                .ok_or_else(|| invalid(format!("positions.{key}"), "unknown position"))?;
            position_configs.insert(position, PositionConfig::from_file(&key, file)?);
        }

        let mut adjustment_rules = BTreeMap::new();
        for (key, rules) in adjustments_file {
            let position = Position::from_str_pos(&key)
                .ok_or_else(|| invalid(format!("adjustments.{key}"), "unknown position"))?;
            adjustment_rules.insert(position, rules);
        }

        let config = EngineConfig {
            run,
            schemes,
            positions: position_configs,
            adjustments: adjustment_rules,
        };
        config.validate()?;
        Ok(config)
    }

    /// The configuration shipped in `defaults/`.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml_strs(
            include_str!("../../../defaults/run.toml"),
            include_str!("../../../defaults/schemes.toml"),
            include_str!("../../../defaults/positions.toml"),
            include_str!("../../../defaults/adjustments.toml"),
        )
    }

    pub fn adjustments_for(&self, position: Position) -> &[AdjustmentRule] {
        self.adjustments
            .get(&position)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let range = self.run.normalizer;
        if range.lo <= 0.0 {
            return Err(invalid(
                "run.normalizer.lo",
                format!("must be > 0, got {}", range.lo),
            ));
        }
        if range.hi <= range.lo {
            return Err(invalid(
                "run.normalizer.hi",
                format!("must be > lo ({}), got {}", range.lo, range.hi),
            ));
        }
        if let Some(floor) = self.run.fit_floor {
            if !floor.is_finite() {
                return Err(invalid("run.fit_floor", format!("must be finite, got {floor}")));
            }
        }

        for (position, config) in &self.positions {
            PositionModel::compile(*position, config)?;
        }

        for (position, rules) in &self.adjustments {
            let config = self.positions.get(position).ok_or_else(|| {
                invalid(
                    format!("adjustments.{}", position.key()),
                    "no position model is configured for this position",
                )
            })?;
            for (i, rule) in rules.iter().enumerate() {
                rule.validate(&config.features, &format!("adjustments.{}[{i}]", position.key()))?;
            }
        }
        Ok(())
    }
}

fn parse<T: serde::de::DeserializeOwned>(file: &str, text: &str) -> Result<T, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::Parse {
        file: file.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
