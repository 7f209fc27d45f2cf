// Top-3 scheme weight selection.

use crate::error::{checked_div, ensure_finite, FitError};
use crate::model::scheme::Scheme;
use crate::scoring::tendency::SchemeScore;
use serde::Serialize;
use std::cmp::Ordering;

/// Number of schemes that contribute to a team's fit weighting.
pub const TOP_SCHEMES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SchemeWeight {
    pub scheme: Scheme,
    pub weight: f64,
}

/// A team's contributing schemes, highest score first. Weights sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemeWeightSet {
    entries: Vec<SchemeWeight>,
}

impl SchemeWeightSet {
    pub fn entries(&self) -> &[SchemeWeight] {
        &self.entries
    }

    pub fn weight(&self, scheme: Scheme) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.scheme == scheme)
            .map(|e| e.weight)
    }

    pub fn contains(&self, scheme: Scheme) -> bool {
        self.weight(scheme).is_some()
    }

    pub fn contains_any(&self, schemes: &[Scheme]) -> bool {
        schemes.iter().any(|s| self.contains(*s))
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }
}

/// Pick the team's three best schemes and turn their scores into weights.
///
/// Ties rank by declaration order. Only positive scores participate, so a
/// team with fewer than three positive schemes gets fewer weights. A team
/// whose selected scores total zero cannot be weighted.
pub fn select_weights(score: &SchemeScore) -> Result<SchemeWeightSet, FitError> {
    let mut ranked: Vec<(Scheme, f64)> = Vec::with_capacity(Scheme::COUNT);
    for (scheme, value) in score.scores.iter() {
        let value = ensure_finite(value, &score.team, &format!("{} score", scheme.display_name()))?;
        ranked.push((scheme, value));
    }
    // stable sort keeps declaration order among equal scores
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let top: Vec<(Scheme, f64)> = ranked
        .into_iter()
        .take(TOP_SCHEMES)
        .filter(|(_, v)| *v > 0.0)
        .collect();
    let total: f64 = top.iter().map(|(_, v)| v).sum();
    if top.is_empty() || total <= 0.0 {
        return Err(FitError::data_quality(
            &score.team,
            "total of the top scheme scores is zero; no scheme weighting possible",
        ));
    }

    let entries = top
        .into_iter()
        .map(|(scheme, v)| {
            Ok(SchemeWeight {
                scheme,
                weight: checked_div(v, total, &score.team, "scheme weight")?,
            })
        })
        .collect::<Result<Vec<_>, FitError>>()?;
    Ok(SchemeWeightSet { entries })
}
