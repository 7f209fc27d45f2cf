// Scheme-weighted combination of raw fits into one final fit per
// (team, player) pair.

use crate::config::RunSettings;
use crate::error::{checked_div, ensure_finite, Batch, FitError};
use crate::model::position::Position;
use crate::model::scheme::{Scheme, SchemeScores};
use crate::model::team::TeamTendencyRecord;
use crate::scoring::adjust::{apply_adjustments, AdjustmentContext, AdjustmentRule, AppliedAdjustment};
use crate::scoring::formula::PositionModel;
use crate::scoring::normalize::{NormalizedFeatureRow, NormalizedTable};
use crate::scoring::tendency::SchemeScore;
use crate::scoring::weights::{select_weights, SchemeWeightSet};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Name under which the fit floor is reported when it lifts a score.
pub const FIT_FLOOR_ADJUSTMENT: &str = "fit_floor";

// ---------------------------------------------------------------------------
// Team profile
// ---------------------------------------------------------------------------

/// Everything about a team that the fit pass reads: its scheme scores, the
/// weights derived from them, and its league box-score ranks.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamProfile {
    pub scheme: SchemeScore,
    pub weights: SchemeWeightSet,
    /// `<column>_Rank` values from the team record.
    pub ranks: BTreeMap<String, f64>,
}

impl TeamProfile {
    pub fn new(scheme: SchemeScore, record: &TeamTendencyRecord) -> Result<Self, FitError> {
        let weights = select_weights(&scheme)?;
        let ranks = record
            .season
            .iter()
            .filter(|(column, value)| column.ends_with("_Rank") && value.is_finite())
            .map(|(column, value)| (column.clone(), *value))
            .collect();
        Ok(TeamProfile {
            scheme,
            weights,
            ranks,
        })
    }

    pub fn team(&self) -> &str {
        &self.scheme.team
    }

    pub fn team_name(&self) -> &str {
        &self.scheme.team_name
    }

    pub fn rank(&self, column: &str) -> Option<f64> {
        self.ranks.get(column).copied()
    }
}

// ---------------------------------------------------------------------------
// Fit result
// ---------------------------------------------------------------------------

/// One scheme's share of a player's base fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SchemeContribution {
    pub scheme: Scheme,
    pub weight: f64,
    pub raw_fit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub team: String,
    pub team_name: String,
    pub player_id: String,
    pub player_name: String,
    pub position: Position,
    pub season: i32,
    pub games: u32,
    pub age: Option<f64>,
    pub prev_team: Option<String>,
    pub market_value: Option<f64>,
    pub production_score: f64,
    /// Raw fit under all seven schemes, not only the contributing ones.
    pub raw_fits: SchemeScores,
    pub contributions: Vec<SchemeContribution>,
    pub base_fit: f64,
    pub adjustments: Vec<AppliedAdjustment>,
    pub final_fit: f64,
}

impl FitResult {
    pub fn adjustment(&self, name: &str) -> Option<f64> {
        self.adjustments
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.amount)
    }
}

// ---------------------------------------------------------------------------
// Combination
// ---------------------------------------------------------------------------

/// `Σ w·raw / Σ w` over the contributing schemes whose raw fit is finite.
/// No finite contribution at all is a data quality error against `entity`.
pub fn weighted_base(contributions: &[SchemeContribution], entity: &str) -> Result<f64, FitError> {
    let (sum, weight) = contributions
        .iter()
        .filter(|c| c.raw_fit.is_finite())
        .fold((0.0, 0.0), |(sum, weight), c| {
            (sum + c.weight * c.raw_fit, weight + c.weight)
        });
    checked_div(sum, weight, entity, "weight of contributing schemes with a finite raw fit")
}

/// Score one player for one team.
pub fn fit_player(
    table: &NormalizedTable,
    row: &NormalizedFeatureRow,
    team: &TeamProfile,
    model: &PositionModel,
    rules: &[AdjustmentRule],
    settings: &RunSettings,
) -> Result<FitResult, FitError> {
    let production_score = model.production_score(row)?;
    let raw_fits = model.raw_fits(row)?;
    let contributions: Vec<SchemeContribution> = team
        .weights
        .entries()
        .iter()
        .map(|w| SchemeContribution {
            scheme: w.scheme,
            weight: w.weight,
            raw_fit: raw_fits.get(w.scheme),
        })
        .collect();

    let base_fit = weighted_base(&contributions, &row.player_name)?;

    let ctx = AdjustmentContext {
        table,
        row,
        team,
        settings,
    };
    let (total, mut adjustments) = apply_adjustments(rules, &ctx)?;
    let mut final_fit = base_fit + total;

    if let Some(floor) = settings.fit_floor {
        if final_fit < floor {
            adjustments.push(AppliedAdjustment {
                name: FIT_FLOOR_ADJUSTMENT.to_string(),
                amount: floor - final_fit,
            });
            final_fit = floor;
        }
    }

    let final_fit = ensure_finite(final_fit, &row.player_name, &format!("final fit for {}", team.team()))?;

    Ok(FitResult {
        team: team.team().to_string(),
        team_name: team.team_name().to_string(),
        player_id: row.player_id.clone(),
        player_name: row.player_name.clone(),
        position: model.position(),
        season: row.season,
        games: row.games,
        age: row.age,
        prev_team: row.prev_team.clone(),
        market_value: row.market_value,
        production_score,
        raw_fits,
        contributions,
        base_fit,
        adjustments,
        final_fit,
    })
}

/// Fit every player in `table` for one team, best fit first.
///
/// A player whose fit cannot be computed is recorded as a failure; a
/// configuration problem aborts.
pub fn compute_fits(
    table: &NormalizedTable,
    team: &TeamProfile,
    model: &PositionModel,
    rules: &[AdjustmentRule],
    settings: &RunSettings,
) -> Result<Batch<FitResult>, FitError> {
    if table.position() != model.position() {
        return Err(FitError::configuration(
            format!("positions.{}", model.position().key()),
            format!(
                "{} table cannot be scored with the {} model",
                table.position(),
                model.position()
            ),
        ));
    }

    let mut batch = Batch::new();
    for row in table.rows() {
        let result = fit_player(table, row, team, model, rules, settings);
        if let Err(e) = &result {
            warn!("skipping {} for {}: {e}", row.player_name, team.team());
        }
        batch.record(result)?;
    }
    // stable: equal fits keep input order
    batch
        .items
        .sort_by(|a, b| b.final_fit.partial_cmp(&a.final_fit).unwrap_or(Ordering::Equal));
    debug!(
        team = team.team(),
        position = %model.position(),
        fits = batch.items.len(),
        failures = batch.failures.len(),
        "computed fits"
    );
    Ok(batch)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PositionConfig, SchemeFormulaConfig, TermConfig};
    use crate::model::player::{PlayerSeasonRecord, PlayerTable};
    use crate::scoring::adjust::AdjustmentKind;
    use crate::scoring::normalize::Normalizer;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    fn term(column: &str, weight: f64) -> TermConfig {
        TermConfig {
            column: column.into(),
            weight,
            complement: false,
        }
    }

    /// Production = 0.5 a + 0.5 b everywhere. Air Raid efficiency reads `a`,
    /// every other scheme reads `b`. Split 0.5 / 0.5.
    fn test_model() -> PositionModel {
        let formula = |column: &str| SchemeFormulaConfig {
            production_weight: 0.5,
            efficiency_weight: 0.5,
            efficiency: vec![term(column, 1.0)],
            penalties: vec![],
            extra: vec![],
        };
        let schemes = Scheme::ALL
            .into_iter()
            .map(|s| (s, formula(if s == Scheme::AirRaid { "a" } else { "b" })))
            .collect();
        let config = PositionConfig {
            derived: vec![],
            features: vec!["a".into(), "b".into()],
            production: vec![term("a", 0.5), term("b", 0.5)],
            schemes,
            ranking: vec![],
        };
        PositionModel::compile(Position::WideReceiver, &config).unwrap()
    }

    fn make_row(id: &str, games: u32, a: f64, b: f64) -> PlayerSeasonRecord {
        PlayerSeasonRecord::new(id, format!("Player {id}"), Position::WideReceiver, 2024, games)
            .with_stat("a", a)
            .with_stat("b", b)
    }

    fn test_table(records: Vec<PlayerSeasonRecord>) -> NormalizedTable {
        let cols = vec!["a".to_string(), "b".to_string()];
        let table = PlayerTable::new(Position::WideReceiver, cols.clone(), records);
        Normalizer::default().normalize(&table, &cols).unwrap()
    }

    fn team(schemes: &[(Scheme, f64)]) -> TeamProfile {
        let scores: SchemeScores = schemes.iter().copied().collect();
        let score = SchemeScore {
            team: "NYJ".into(),
            team_name: "New York Jets".into(),
            scores,
            computed: scores.best(),
            predicted: scores.best(),
            overridden: false,
        };
        let record = TeamTendencyRecord::new("NYJ", "New York Jets")
            .with_season("PassingYds_Rank", 30.0)
            .with_season("pass_to_run", 0.6);
        TeamProfile::new(score, &record).unwrap()
    }

    fn settings() -> RunSettings {
        RunSettings {
            current_season: 2024,
            fit_floor: None,
        }
    }

    #[test]
    fn profile_keeps_only_rank_columns() {
        let t = team(&[(Scheme::AirRaid, 1.0)]);
        assert_eq!(t.rank("PassingYds_Rank"), Some(30.0));
        assert_eq!(t.ranks.len(), 1);
    }

    #[test]
    fn base_fit_is_weighted_by_scheme_share() {
        let table = test_table(vec![make_row("lo", 17, 0.0, 0.0), make_row("x", 17, 10.0, 0.0), make_row("hi", 17, 10.0, 10.0)]);
        let t = team(&[(Scheme::AirRaid, 0.6), (Scheme::WestCoast, 0.4)]);
        let batch = compute_fits(&table, &t, &test_model(), &[], &settings()).unwrap();
        let x = batch.items.iter().find(|f| f.player_id == "x").unwrap();
        // x: scaled a = 1.0, b = 0.2 -> production 0.6
        // air raid 0.5 * 0.6 + 0.5 * 1.0 = 0.8, west coast 0.5 * 0.6 + 0.5 * 0.2 = 0.4
        // base = 0.6 * 0.8 + 0.4 * 0.4 = 0.64
        assert!(approx_eq(x.production_score, 0.6, 1e-12));
        assert!(approx_eq(x.raw_fits.get(Scheme::AirRaid), 0.8, 1e-12));
        assert!(approx_eq(x.base_fit, 0.64, 1e-12));
        assert!(approx_eq(x.final_fit, 0.64, 1e-12));
        assert_eq!(x.contributions.len(), 2);
        assert_eq!(x.team_name, "New York Jets");
    }

    #[test]
    fn results_sorted_best_first_with_stable_ties() {
        let table = test_table(vec![
            make_row("first", 17, 5.0, 5.0),
            make_row("best", 17, 10.0, 10.0),
            make_row("second", 17, 5.0, 5.0),
            make_row("worst", 17, 0.0, 0.0),
        ]);
        let t = team(&[(Scheme::RunPower, 1.0)]);
        let batch = compute_fits(&table, &t, &test_model(), &[], &settings()).unwrap();
        let order: Vec<&str> = batch.items.iter().map(|f| f.player_id.as_str()).collect();
        assert_eq!(order, vec!["best", "first", "second", "worst"]);
    }

    #[test]
    fn weighted_base_skips_non_finite_raw_fits() {
        let contributions = [
            SchemeContribution { scheme: Scheme::AirRaid, weight: 0.5, raw_fit: f64::NAN },
            SchemeContribution { scheme: Scheme::WestCoast, weight: 0.3, raw_fit: 0.6 },
            SchemeContribution { scheme: Scheme::RunPower, weight: 0.2, raw_fit: 0.1 },
        ];
        // (0.3 * 0.6 + 0.2 * 0.1) / 0.5 = 0.4
        assert!(approx_eq(weighted_base(&contributions, "p").unwrap(), 0.4, 1e-12));

        let all_bad = [SchemeContribution { scheme: Scheme::AirRaid, weight: 1.0, raw_fit: f64::INFINITY }];
        match weighted_base(&all_bad, "p") {
            Err(FitError::DataQuality { entity, .. }) => assert_eq!(entity, "p"),
            other => panic!("expected DataQuality, got: {other:?}"),
        }
    }

    #[test]
    fn adjustments_apply_after_combination() {
        let table = test_table(vec![make_row("short", 4, 5.0, 5.0), make_row("full", 12, 5.0, 5.0)]);
        let t = team(&[(Scheme::WestCoast, 1.0)]);
        let rules = [AdjustmentRule {
            name: "low_sample".into(),
            when_schemes: vec![],
            kind: AdjustmentKind::LowSample { min_games: 9, penalty: 0.10 },
        }];
        let batch = compute_fits(&table, &t, &test_model(), &rules, &settings()).unwrap();
        let short = batch.items.iter().find(|f| f.player_id == "short").unwrap();
        let full = batch.items.iter().find(|f| f.player_id == "full").unwrap();
        assert!(approx_eq(short.base_fit, full.base_fit, 1e-12));
        assert!(approx_eq(full.final_fit - short.final_fit, 0.10, 1e-12));
        assert_eq!(short.adjustment("low_sample"), Some(-0.10));
        assert_eq!(full.adjustment("low_sample"), Some(0.0));
    }

    #[test]
    fn fit_floor_lifts_low_scores_and_is_reported() {
        let table = test_table(vec![make_row("lo", 17, 0.0, 0.0), make_row("hi", 17, 10.0, 10.0)]);
        let t = team(&[(Scheme::WestCoast, 1.0)]);
        let floored = RunSettings {
            current_season: 2024,
            fit_floor: Some(0.5),
        };
        let batch = compute_fits(&table, &t, &test_model(), &[], &floored).unwrap();
        let lo = batch.items.iter().find(|f| f.player_id == "lo").unwrap();
        // lo: production 0.2, efficiency 0.2 -> 0.2, floored to 0.5
        assert!(approx_eq(lo.base_fit, 0.2, 1e-12));
        assert!(approx_eq(lo.final_fit, 0.5, 1e-12));
        assert!(approx_eq(lo.adjustment(FIT_FLOOR_ADJUSTMENT).unwrap(), 0.3, 1e-12));
        let hi = batch.items.iter().find(|f| f.player_id == "hi").unwrap();
        assert_eq!(hi.adjustment(FIT_FLOOR_ADJUSTMENT), None);
    }

    #[test]
    fn position_mismatch_is_configuration_error() {
        let cols = vec!["a".to_string(), "b".to_string()];
        let table = PlayerTable::new(Position::TightEnd, cols.clone(), vec![]);
        let normalized = Normalizer::default().normalize(&table, &cols).unwrap();
        let t = team(&[(Scheme::WestCoast, 1.0)]);
        let err = compute_fits(&normalized, &t, &test_model(), &[], &settings()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        let table = test_table(vec![make_row("a", 10, 3.0, 7.0), make_row("b", 6, 8.0, 1.0)]);
        let t = team(&[(Scheme::AirRaid, 0.5), (Scheme::SpreadOption, 0.3), (Scheme::RunPower, 0.2)]);
        let first = compute_fits(&table, &t, &test_model(), &[], &settings()).unwrap();
        let second = compute_fits(&table, &t, &test_model(), &[], &settings()).unwrap();
        assert_eq!(first.items, second.items);
    }
}
