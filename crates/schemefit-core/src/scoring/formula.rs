// Position fit formulas: production score plus per-scheme efficiency blends.
//
// A formula is declared in configuration by column name and compiled here
// into column indices against the position's feature list, so every term is
// known to exist before any row is scored.

use crate::config::{ConfigError, PositionConfig, SchemeFormulaConfig, TermConfig};
use crate::error::FitError;
use crate::model::position::Position;
use crate::model::scheme::{Scheme, SchemeScores};
use crate::scoring::normalize::NormalizedFeatureRow;
use std::collections::HashSet;
use std::ops::RangeInclusive;

/// Weight sums must match 1.0 within this tolerance.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Allowed number of production terms.
pub const PRODUCTION_TERMS: RangeInclusive<usize> = 2..=5;

// ---------------------------------------------------------------------------
// Compiled terms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct Term {
    index: usize,
    weight: f64,
    complement: bool,
}

impl Term {
    fn value(&self, row: &NormalizedFeatureRow) -> Option<f64> {
        let v = row.scaled(self.index)?;
        Some(if self.complement { 1.0 - v } else { v })
    }
}

fn blend(terms: &[Term], row: &NormalizedFeatureRow) -> Option<f64> {
    terms
        .iter()
        .try_fold(0.0, |acc, t| Some(acc + t.weight * t.value(row)?))
}

#[derive(Debug, Clone, PartialEq)]
struct SchemeFormula {
    production_weight: f64,
    efficiency_weight: f64,
    efficiency: Vec<Term>,
    penalties: Vec<Term>,
    extra: Vec<Term>,
}

// ---------------------------------------------------------------------------
// Position model
// ---------------------------------------------------------------------------

/// A position's compiled fit formulas.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionModel {
    position: Position,
    features: Vec<String>,
    production: Vec<Term>,
    /// One formula per scheme, indexed by `Scheme::index`.
    schemes: Vec<SchemeFormula>,
}

impl PositionModel {
    /// Validate a position's configuration and compile it.
    pub fn compile(position: Position, config: &PositionConfig) -> Result<Self, ConfigError> {
        let prefix = format!("positions.{}", position.key());

        if config.features.is_empty() {
            return Err(invalid(format!("{prefix}.features"), "must not be empty"));
        }
        let mut seen = HashSet::new();
        for feature in &config.features {
            if !seen.insert(feature.as_str()) {
                return Err(invalid(
                    format!("{prefix}.features"),
                    format!("duplicate feature `{feature}`"),
                ));
            }
        }

        let n = config.production.len();
        if !PRODUCTION_TERMS.contains(&n) {
            return Err(invalid(
                format!("{prefix}.production"),
                format!(
                    "must have between {} and {} terms, got {n}",
                    PRODUCTION_TERMS.start(),
                    PRODUCTION_TERMS.end()
                ),
            ));
        }
        let production = compile_terms(&config.features, &config.production, &format!("{prefix}.production"))?;
        check_sum(
            config.production.iter().map(|t| t.weight).sum(),
            &format!("{prefix}.production"),
        )?;

        let mut schemes = Vec::with_capacity(Scheme::COUNT);
        for scheme in Scheme::ALL {
            let field = format!("{prefix}.schemes.{}", scheme.key());
            let formula = config
                .schemes
                .get(&scheme)
                .ok_or_else(|| invalid(field.clone(), "missing formula for scheme"))?;
            schemes.push(compile_scheme(&config.features, formula, &field)?);
        }

        Ok(PositionModel {
            position,
            features: config.features.clone(),
            production,
            schemes,
        })
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Columns the Normalizer must produce for this model, in index order.
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Weighted blend of the per-game counting stats.
    pub fn production_score(&self, row: &NormalizedFeatureRow) -> Result<f64, FitError> {
        blend(&self.production, row).ok_or_else(|| self.missing_feature(row))
    }

    /// Scheme-specific efficiency blend with the turnover penalty subtracted.
    pub fn efficiency_score(&self, scheme: Scheme, row: &NormalizedFeatureRow) -> Result<f64, FitError> {
        let formula = &self.schemes[scheme.index()];
        let gain = blend(&formula.efficiency, row).ok_or_else(|| self.missing_feature(row))?;
        let penalty = blend(&formula.penalties, row).ok_or_else(|| self.missing_feature(row))?;
        Ok(gain - penalty)
    }

    /// `w_prod * production + w_eff * efficiency (+ extra terms)` for one scheme.
    pub fn raw_fit(&self, scheme: Scheme, row: &NormalizedFeatureRow) -> Result<f64, FitError> {
        let production = self.production_score(row)?;
        self.raw_fit_with(scheme, production, row)
    }

    /// Raw fit under every scheme.
    pub fn raw_fits(&self, row: &NormalizedFeatureRow) -> Result<SchemeScores, FitError> {
        let production = self.production_score(row)?;
        let mut fits = SchemeScores::new();
        for scheme in Scheme::ALL {
            fits.set(scheme, self.raw_fit_with(scheme, production, row)?);
        }
        Ok(fits)
    }

    fn raw_fit_with(
        &self,
        scheme: Scheme,
        production: f64,
        row: &NormalizedFeatureRow,
    ) -> Result<f64, FitError> {
        let formula = &self.schemes[scheme.index()];
        let efficiency = self.efficiency_score(scheme, row)?;
        let extra = blend(&formula.extra, row).ok_or_else(|| self.missing_feature(row))?;
        Ok(formula.production_weight * production + formula.efficiency_weight * efficiency + extra)
    }

    fn missing_feature(&self, row: &NormalizedFeatureRow) -> FitError {
        FitError::configuration(
            format!("positions.{}.features", self.position.key()),
            format!(
                "row for {} was not normalized against this model's features",
                row.player_name
            ),
        )
    }
}

// ---------------------------------------------------------------------------
// Compilation helpers
// ---------------------------------------------------------------------------

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        message: message.into(),
    }
}

fn check_sum(total: f64, field: &str) -> Result<(), ConfigError> {
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(invalid(field, format!("weights must sum to 1, got {total}")));
    }
    Ok(())
}

fn compile_terms(features: &[String], terms: &[TermConfig], field: &str) -> Result<Vec<Term>, ConfigError> {
    terms
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let index = features.iter().position(|f| *f == t.column).ok_or_else(|| {
                invalid(
                    format!("{field}[{i}].column"),
                    format!("`{}` is not a declared feature", t.column),
                )
            })?;
            if !t.weight.is_finite() || t.weight < 0.0 {
                return Err(invalid(
                    format!("{field}[{i}].weight"),
                    format!("must be >= 0, got {}", t.weight),
                ));
            }
            Ok(Term {
                index,
                weight: t.weight,
                complement: t.complement,
            })
        })
        .collect()
}

fn compile_scheme(
    features: &[String],
    config: &SchemeFormulaConfig,
    field: &str,
) -> Result<SchemeFormula, ConfigError> {
    for (name, w) in [
        ("production_weight", config.production_weight),
        ("efficiency_weight", config.efficiency_weight),
    ] {
        if !w.is_finite() || w < 0.0 {
            return Err(invalid(format!("{field}.{name}"), format!("must be >= 0, got {w}")));
        }
    }
    if config.efficiency.is_empty() {
        return Err(invalid(format!("{field}.efficiency"), "must not be empty"));
    }
    let extra_weight: f64 = config.extra.iter().map(|t| t.weight).sum();
    let split = config.production_weight + config.efficiency_weight + extra_weight;
    if (split - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(invalid(
            format!("{field}.production_weight"),
            format!("production, efficiency and extra weights must sum to 1, got {split}"),
        ));
    }

    Ok(SchemeFormula {
        production_weight: config.production_weight,
        efficiency_weight: config.efficiency_weight,
        efficiency: compile_terms(features, &config.efficiency, &format!("{field}.efficiency"))?,
        penalties: compile_terms(features, &config.penalties, &format!("{field}.penalties"))?,
        extra: compile_terms(features, &config.extra, &format!("{field}.extra"))?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
