// Team scheme classification from play-calling tendencies.
//
// Every scheme is an additive rubric of tent terms. A tent term is 1 when a
// tendency sits exactly on the scheme's target and falls linearly to 0 at the
// tolerance distance.

use crate::config::{RubricTerm, SchemeConfig};
use crate::error::{ensure_finite, Batch, FitError};
use crate::model::scheme::{Scheme, SchemeScores};
use crate::model::team::{TeamTendencyRecord, TendencyTable};
use serde::Serialize;
use tracing::{debug, info, warn};

/// `max(0, 1 - |value - target| / tolerance)`.
pub fn tent(value: f64, target: f64, tolerance: f64) -> f64 {
    (1.0 - (value - target).abs() / tolerance).max(0.0)
}

/// `alpha * season + (1 - alpha) * weekly`.
pub fn blend_observations(season: f64, weekly: f64, alpha: f64) -> f64 {
    alpha * season + (1.0 - alpha) * weekly
}

// ---------------------------------------------------------------------------
// Scheme score
// ---------------------------------------------------------------------------

/// One team's scores under all seven schemes plus its display label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemeScore {
    pub team: String,
    pub team_name: String,
    pub scores: SchemeScores,
    /// Highest-scoring scheme (ties by declaration order).
    pub computed: Scheme,
    /// `computed`, unless an override names a different scheme.
    pub predicted: Scheme,
    pub overridden: bool,
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

pub struct TendencyScorer<'a> {
    config: &'a SchemeConfig,
}

impl<'a> TendencyScorer<'a> {
    pub fn new(config: &'a SchemeConfig) -> Self {
        TendencyScorer { config }
    }

    /// Every rubric metric must be a column of the tendency table.
    pub fn check_schema(&self, table: &TendencyTable) -> Result<(), FitError> {
        for (scheme, terms) in &self.config.rubrics {
            for (i, term) in terms.iter().enumerate() {
                if !table.has_column(&term.metric) {
                    return Err(FitError::configuration(
                        format!("schemes.rubrics.{}[{i}].metric", scheme.key()),
                        format!("tendency column `{}` is absent from the team table", term.metric),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Score one team against every scheme.
    pub fn score_team(&self, team: &TeamTendencyRecord) -> Result<SchemeScore, FitError> {
        let mut scores = SchemeScores::new();
        for scheme in Scheme::ALL {
            let terms = self.config.rubrics.get(&scheme).ok_or_else(|| {
                FitError::configuration(
                    format!("schemes.rubrics.{}", scheme.key()),
                    "missing rubric for scheme",
                )
            })?;
            let mut total = 0.0;
            for term in terms {
                let value = self.observe(team, term)?;
                total += term.weight * tent(value, term.target, term.tolerance);
            }
            let total = ensure_finite(total, &team.team, &format!("{} score", scheme.display_name()))?;
            scores.set(scheme, total);
        }

        let computed = scores.best();
        let (predicted, overridden) = match self.config.override_for(&team.team) {
            Some(forced) => (forced, true),
            None => (computed, false),
        };
        debug!(
            team = %team.team,
            %computed,
            %predicted,
            "scored scheme tendencies"
        );

        Ok(SchemeScore {
            team: team.team.clone(),
            team_name: team.team_name.clone(),
            scores,
            computed,
            predicted,
            overridden,
        })
    }

    /// The value a rubric term reads: the season value, blended with the
    /// weekly mean when the term asks for it and one exists.
    fn observe(&self, team: &TeamTendencyRecord, term: &RubricTerm) -> Result<f64, FitError> {
        let season = team.season_value(&term.metric).ok_or_else(|| {
            FitError::data_quality(
                &team.team,
                format!("tendency `{}` is null", term.metric),
            )
        })?;
        if !term.blend {
            return Ok(season);
        }
        Ok(match team.weekly_value(&term.metric) {
            Some(weekly) => blend_observations(season, weekly, self.config.blend_alpha),
            None => season,
        })
    }
}

/// Classify every team in the table.
///
/// A rubric metric missing from the table schema aborts the run; a team with
/// a null tendency is reported and skipped.
pub fn compute_team_schemes(
    table: &TendencyTable,
    config: &SchemeConfig,
) -> Result<Batch<SchemeScore>, FitError> {
    let scorer = TendencyScorer::new(config);
    scorer.check_schema(table)?;

    let mut batch = Batch::new();
    for team in table.teams() {
        let result = scorer.score_team(team);
        if let Err(e) = &result {
            warn!("skipping team {}: {e}", team.team);
        }
        batch.record(result)?;
    }
    info!(
        "Classified {} teams ({} skipped)",
        batch.items.len(),
        batch.failures.len()
    );
    Ok(batch)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
