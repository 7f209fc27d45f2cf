// Per-run context: the season snapshot after every team-level and
// position-level derivation, shared read-only by all fit passes.

use crate::config::{EngineConfig, RunSettings};
use crate::error::{Batch, FitError};
use crate::model::player::PlayerTable;
use crate::model::position::Position;
use crate::model::team::TendencyTable;
use crate::scoring::adjust::{AdjustmentKind, AdjustmentRule};
use crate::scoring::combine::{compute_fits, FitResult, TeamProfile};
use crate::scoring::formula::PositionModel;
use crate::scoring::normalize::{NormalizedTable, Normalizer};
use crate::scoring::ranking::{rank_box_scores, rank_population, PopulationRanking};
use crate::scoring::tendency::{compute_team_schemes, SchemeScore};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A position's compiled model, normalized free-agent table and rules.
#[derive(Debug, Clone)]
pub struct PositionData {
    pub model: PositionModel,
    pub table: NormalizedTable,
    pub rules: Vec<AdjustmentRule>,
}

pub struct RunContext {
    settings: RunSettings,
    teams: Vec<TeamProfile>,
    positions: BTreeMap<Position, PositionData>,
    /// Positions whose table could not be prepared, with the reason.
    skipped: BTreeMap<Position, FitError>,
    failures: Vec<FitError>,
}

impl RunContext {
    /// Derive everything the fit passes share.
    ///
    /// Team side: box-score ranks, ratio tendencies, scheme scores, weights.
    /// Player side: derived columns, then normalization against the model's
    /// features. Teams that cannot be scored, and position tables that fail
    /// on data quality, are kept in `failures()`; the rest of the run goes on.
    pub fn build(
        config: &EngineConfig,
        settings: RunSettings,
        tendencies: TendencyTable,
        players: Vec<PlayerTable>,
    ) -> Result<Self, FitError> {
        let normalizer = Normalizer::new(config.run.normalizer);

        let mut tendencies = tendencies;
        rank_box_scores(&mut tendencies, &config.run.team_ranks);
        let tendencies = tendencies.with_ratios(&config.schemes.derived);

        let scored = compute_team_schemes(&tendencies, &config.schemes)?;
        let mut failures = scored.failures;
        let mut teams = Vec::with_capacity(scored.items.len());
        for score in scored.items {
            let profile = match tendencies.find(&score.team) {
                Some(record) => TeamProfile::new(score, record),
                None => Err(FitError::not_found(format!("team {}", score.team))),
            };
            match profile {
                Ok(p) => teams.push(p),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => failures.push(e),
            }
        }

        let mut positions = BTreeMap::new();
        let mut skipped = BTreeMap::new();
        for table in players {
            let position = table.position();
            let Some(position_config) = config.positions.get(&position) else {
                return Err(FitError::configuration(
                    format!("positions.{}", position.key()),
                    "player table supplied for a position with no model",
                ));
            };
            let model = PositionModel::compile(position, position_config)?;
            let rules = config.adjustments_for(position).to_vec();
            check_rank_columns(&rules, &tendencies, position)?;

            let prepared = table
                .with_derived(&position_config.derived)
                .and_then(|derived| normalizer.normalize(&derived, model.features()));
            let normalized = match prepared {
                Ok(normalized) => normalized,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("{position} players skipped: {e}");
                    failures.push(e.clone());
                    skipped.insert(position, e);
                    continue;
                }
            };
            info!(
                "Prepared {} {} players ({} features, {} rules)",
                normalized.len(),
                position,
                model.features().len(),
                rules.len()
            );
            positions.insert(
                position,
                PositionData {
                    model,
                    table: normalized,
                    rules,
                },
            );
        }

        info!(
            "Run context ready: {} teams, {} positions, {} failures, season {}",
            teams.len(),
            positions.len(),
            failures.len(),
            settings.current_season
        );

        Ok(RunContext {
            settings,
            teams,
            positions,
            skipped,
            failures,
        })
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn teams(&self) -> &[TeamProfile] {
        &self.teams
    }

    pub fn team_schemes(&self) -> Vec<&SchemeScore> {
        self.teams.iter().map(|t| &t.scheme).collect()
    }

    /// Teams that could not be classified or weighted, and position tables
    /// that could not be normalized.
    pub fn failures(&self) -> &[FitError] {
        &self.failures
    }

    pub fn position(&self, position: Position) -> Option<&PositionData> {
        self.positions.get(&position)
    }

    /// Look up a team by abbreviation (exact) or name (substring).
    pub fn team(&self, query: &str) -> Result<&TeamProfile, FitError> {
        let query = query.trim();
        self.teams
            .iter()
            .find(|t| t.team().eq_ignore_ascii_case(query))
            .or_else(|| {
                if query.is_empty() {
                    return None;
                }
                let lowered = query.to_lowercase();
                self.teams
                    .iter()
                    .find(|t| t.team_name().to_lowercase().contains(&lowered))
            })
            .ok_or_else(|| FitError::not_found(format!("team matching `{query}`")))
    }

    fn position_data(&self, position: Position) -> Result<&PositionData, FitError> {
        self.positions.get(&position).ok_or_else(|| {
            FitError::configuration(
                format!("positions.{}", position.key()),
                format!("no {position} player table was loaded"),
            )
        })
    }

    /// A position skipped at build time yields its failure and no fits.
    fn skipped_batch(&self, position: Position) -> Option<Batch<FitResult>> {
        self.skipped.get(&position).map(|e| Batch {
            items: Vec::new(),
            failures: vec![e.clone()],
        })
    }

    /// Fits for one team. An unknown team yields an empty batch.
    pub fn fits_for_team(&self, query: &str, position: Position) -> Result<Batch<FitResult>, FitError> {
        if let Some(batch) = self.skipped_batch(position) {
            return Ok(batch);
        }
        let data = self.position_data(position)?;
        let team = match self.team(query) {
            Ok(team) => team,
            Err(FitError::NotFound { what }) => {
                info!("No fits: {what} not found");
                return Ok(Batch::new());
            }
            Err(e) => return Err(e),
        };
        compute_fits(&data.table, team, &data.model, &data.rules, &self.settings)
    }

    /// Fits for every team, computed in parallel. Results keep team order.
    pub fn fits_for_all_teams(&self, position: Position) -> Result<Batch<FitResult>, FitError> {
        if let Some(batch) = self.skipped_batch(position) {
            return Ok(batch);
        }
        let data = self.position_data(position)?;
        let per_team: Vec<Result<Batch<FitResult>, FitError>> = self
            .teams
            .par_iter()
            .map(|team| compute_fits(&data.table, team, &data.model, &data.rules, &self.settings))
            .collect();

        let mut batch = Batch::new();
        for result in per_team {
            batch.extend(result?);
        }
        info!(
            "Computed {} {position} fits across {} teams ({} failures)",
            batch.items.len(),
            self.teams.len(),
            batch.failures.len()
        );
        Ok(batch)
    }
}

/// Rank a population table on the position's display metrics. Needs only the
/// position model and the normalizer range, not the team tables.
pub fn rank_position(
    config: &EngineConfig,
    position: Position,
    population: &PlayerTable,
) -> Result<PopulationRanking, FitError> {
    let position_config = config.positions.get(&position).ok_or_else(|| {
        FitError::configuration(
            format!("positions.{}", position.key()),
            "no position model is configured",
        )
    })?;
    let derived = population.with_derived(&position_config.derived)?;
    rank_population(&derived, &position_config.ranking, &Normalizer::new(config.run.normalizer))
}

/// Every rank column a team-need rule reads must exist after box-score
/// ranking, or the rule could never be evaluated.
fn check_rank_columns(
    rules: &[AdjustmentRule],
    tendencies: &TendencyTable,
    position: Position,
) -> Result<(), FitError> {
    for (i, rule) in rules.iter().enumerate() {
        if let AdjustmentKind::TeamNeed(need) = &rule.kind {
            for column in &need.rank_columns {
                if !tendencies.has_column(column) {
                    return Err(FitError::configuration(
                        format!("adjustments.{}[{i}].rank_columns", position.key()),
                        format!("team table has no `{column}` column"),
                    ));
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::player::PlayerSeasonRecord;
    use crate::model::scheme::Scheme;
    use crate::model::team::TeamTendencyRecord;

    fn team(abbr: &str, name: &str, pass_to_run: f64, shotgun: f64, points: f64) -> TeamTendencyRecord {
        TeamTendencyRecord::new(abbr, name)
            .with_season("pass_to_run", pass_to_run)
            .with_season("shotgun_freq", shotgun)
            .with_season("no_huddle_freq", 0.1)
            .with_season("short_passes_freq", 0.8)
            .with_season("deep_passes_freq", 0.2)
            .with_season("first_down_rush_pct", 0.5)
            .with_season("yac", 6.0)
            .with_season("inside_run_pct", 0.7)
            .with_season("outside_run_pct", 0.3)
            .with_season("PointsScored", points)
            .with_season("TotalYds", points * 15.0)
            .with_season("TotalTO", 20.0)
            .with_season("PassingYds", points * 9.0)
            .with_season("PassingTD", points / 16.0)
            .with_season("Passing1stD", points / 2.0)
            .with_season("Int", 10.0)
            .with_season("RushingYds", 1900.0)
            .with_season("RushingTD", 14.0)
    }

    fn tendencies() -> TendencyTable {
        TendencyTable::from_records(vec![
            team("KC", "Kansas City Chiefs", 0.62, 0.7, 400.0),
            team("NYJ", "New York Jets", 0.58, 0.6, 280.0),
            team("LGAVG", "League Average", 0.6, 0.65, 350.0),
        ])
    }

    fn te(name: &str, games: u32, yards: f64) -> PlayerSeasonRecord {
        PlayerSeasonRecord::new(name, name, Position::TightEnd, 2024, games)
            .with_stat("receiving_yards", yards)
            .with_stat("receiving_tds", yards / 120.0)
            .with_stat("receptions", yards / 11.0)
            .with_stat("receiving_first_downs", yards / 25.0)
            .with_stat("receiving_epa", yards / 50.0)
            .with_stat("ngs_avg_yac", 4.5)
            .with_stat("ngs_catch_percentage", 70.0)
            .with_stat("ngs_avg_separation", 3.0)
            .with_age(29.0)
    }

    fn context() -> RunContext {
        let config = EngineConfig::builtin().unwrap();
        let settings = RunSettings {
            current_season: 2024,
            fit_floor: None,
        };
        let tes = PlayerTable::from_records(
            Position::TightEnd,
            vec![te("Ace", 17, 900.0), te("Bee", 12, 450.0), te("Cee", 5, 200.0)],
        );
        RunContext::build(&config, settings, tendencies(), vec![tes]).unwrap()
    }

    #[test]
    fn build_scores_teams_and_drops_league_average() {
        let ctx = context();
        assert_eq!(ctx.teams().len(), 2);
        assert!(ctx.failures().is_empty());
        let kc = ctx.team("kc").unwrap();
        assert!((kc.weights.total() - 1.0).abs() < 1e-9);
        assert_eq!(kc.rank("PointsScored_Rank"), Some(1.0));
        assert_eq!(ctx.team("jets").unwrap().team(), "NYJ");
    }

    #[test]
    fn unknown_team_yields_empty_result() {
        let ctx = context();
        let batch = ctx.fits_for_team("Springfield Atoms", Position::TightEnd).unwrap();
        assert!(batch.is_empty());
        assert!(matches!(ctx.team("Springfield Atoms"), Err(FitError::NotFound { .. })));
    }

    #[test]
    fn missing_position_table_is_configuration_error() {
        let ctx = context();
        let err = ctx.fits_for_team("KC", Position::Quarterback).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn all_team_fits_match_single_team_fits_in_order() {
        let ctx = context();
        let all = ctx.fits_for_all_teams(Position::TightEnd).unwrap();
        assert_eq!(all.items.len(), 6);
        let kc = ctx.fits_for_team("KC", Position::TightEnd).unwrap();
        let nyj = ctx.fits_for_team("NYJ", Position::TightEnd).unwrap();
        let sequential: Vec<FitResult> = kc.items.into_iter().chain(nyj.items).collect();
        assert_eq!(all.items, sequential);
    }

    #[test]
    fn parallel_runs_are_idempotent() {
        let ctx = context();
        let first = ctx.fits_for_all_teams(Position::TightEnd).unwrap();
        let second = ctx.fits_for_all_teams(Position::TightEnd).unwrap();
        assert_eq!(first.items, second.items);
    }

    #[test]
    fn team_schemes_expose_predicted_labels() {
        let ctx = context();
        let labels: Vec<Scheme> = ctx.team_schemes().iter().map(|s| s.predicted).collect();
        assert_eq!(labels.len(), 2);
    }

    fn guard(name: &str, snaps: f64, grade: f64) -> PlayerSeasonRecord {
        PlayerSeasonRecord::new(name, name, Position::OffensiveLine, 2024, 17)
            .with_stat("depth", 1.0)
            .with_stat("team_snap_pct", snaps)
            .with_stat("grade", grade)
            .with_stat("starts", 17.0 * snaps)
            .with_age(27.0)
    }

    #[test]
    fn null_feature_column_skips_only_that_position() {
        let config = EngineConfig::builtin().unwrap();
        let settings = RunSettings {
            current_season: 2024,
            fit_floor: None,
        };
        // NaN reads as null: the separation column has nothing to impute from
        let tes = PlayerTable::from_records(
            Position::TightEnd,
            vec![
                te("Ace", 17, 900.0).with_stat("ngs_avg_separation", f64::NAN),
                te("Bee", 12, 450.0).with_stat("ngs_avg_separation", f64::NAN),
            ],
        );
        let line = PlayerTable::from_records(
            Position::OffensiveLine,
            vec![guard("Dee", 0.95, 78.0), guard("Eff", 0.6, 64.0)],
        );
        let ctx = RunContext::build(&config, settings, tendencies(), vec![tes, line]).unwrap();

        assert_eq!(ctx.teams().len(), 2);
        assert_eq!(ctx.failures().len(), 1);
        assert!(matches!(&ctx.failures()[0], FitError::DataQuality { entity, .. } if entity.contains("TE")));
        assert!(ctx.position(Position::TightEnd).is_none());

        let te_fits = ctx.fits_for_team("KC", Position::TightEnd).unwrap();
        assert!(te_fits.items.is_empty());
        assert_eq!(te_fits.failures, ctx.failures().to_vec());
        let te_all = ctx.fits_for_all_teams(Position::TightEnd).unwrap();
        assert!(te_all.items.is_empty());
        assert_eq!(te_all.failures.len(), 1);

        let ol_fits = ctx.fits_for_all_teams(Position::OffensiveLine).unwrap();
        assert_eq!(ol_fits.items.len(), 4);
        assert!(ol_fits.failures.is_empty());
    }

    #[test]
    fn position_ranking_needs_no_team_tables() {
        let config = EngineConfig::builtin().unwrap();
        let population = PlayerTable::from_records(
            Position::OffensiveLine,
            vec![guard("Dee", 0.95, 78.0), guard("Eff", 0.6, 64.0), guard("Gee", 0.6, 64.0)],
        );
        let ranking = rank_position(&config, Position::OffensiveLine, &population).unwrap();
        assert_eq!(ranking.len(), 3);
        let grade = |p: &str| ranking.ranks_for(p).unwrap()["grade"];
        assert_eq!(grade("Dee"), Some(1));
        assert_eq!(grade("Eff"), Some(2));
        assert_eq!(grade("Gee"), Some(2));
    }

    #[test]
    fn need_rule_on_absent_rank_column_fails_build() {
        let config = EngineConfig::builtin().unwrap();
        let settings = RunSettings {
            current_season: 2024,
            fit_floor: None,
        };
        let sparse = TendencyTable::from_records(vec![TeamTendencyRecord::new("KC", "Kansas City Chiefs")
            .with_season("pass_to_run", 0.6)
            .with_season("shotgun_freq", 0.6)
            .with_season("no_huddle_freq", 0.1)
            .with_season("short_passes_freq", 0.8)
            .with_season("deep_passes_freq", 0.2)
            .with_season("first_down_rush_pct", 0.5)
            .with_season("yac", 6.0)
            .with_season("inside_run_pct", 0.7)
            .with_season("outside_run_pct", 0.3)]);
        let tes = PlayerTable::from_records(Position::TightEnd, vec![te("Ace", 17, 900.0)]);
        let err = RunContext::build(&config, settings, sparse, vec![tes]).err().unwrap();
        match err {
            FitError::Configuration { field, .. } => assert!(field.starts_with("adjustments.te"), "{field}"),
            other => panic!("expected Configuration, got: {other}"),
        }
    }
}
