// Batch commands: classify teams, score fits, rank populations.
//
// Each command loads only the tables it needs and writes its output tables
// under the configured output directory. `schemes` and `fits` build a
// RunContext from the team files; `rankings` reads only the population table.

use crate::config::AppConfig;
use crate::data;
use crate::output::{self, FitRun};
use anyhow::{bail, Context};
use chrono::Datelike;
use clap::{Parser, Subcommand};
use schemefit_core::model::player::PlayerTable;
use schemefit_core::model::position::Position;
use schemefit_core::scoring::ranking::{attach_rankings, PopulationRanking, RankedFit};
use schemefit_core::{rank_position, FitError, RunContext, RunSettings};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Parser)]
#[command(name = "schemefit", author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Project directory holding defaults/, config/ and the data files
    #[arg(long, global = true, default_value = ".")]
    pub base_dir: PathBuf,
    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Mode {
    /// Classify every team's offensive scheme
    Schemes,
    /// Score free agents against one team or every team
    Fits {
        /// qb, rb, wr, te or ol
        #[arg(long, value_parser = parse_position)]
        position: Position,
        /// Team abbreviation or part of the team name
        #[arg(long)]
        team: Option<String>,
    },
    /// Rank the position's population on its display metrics
    Rankings {
        #[arg(long, value_parser = parse_position)]
        position: Position,
    },
}

fn parse_position(s: &str) -> Result<Position, String> {
    Position::from_str_pos(s).ok_or_else(|| format!("unknown position `{s}` (expected qb, rb, wr, te or ol)"))
}

pub fn run(args: &CommandArgs) -> anyhow::Result<()> {
    let config = crate::config::load_config(&args.base_dir).context("failed to load configuration")?;
    info!("Config loaded from {}", args.base_dir.display());

    match &args.mode {
        Mode::Schemes => {
            let report = schemes(&config)?;
            print_schemes(&report.context);
            println!("wrote {}", report.path.display());
        }
        Mode::Fits { position, team } => {
            let report = fits(&config, *position, team.as_deref())?;
            print_fits(&report);
        }
        Mode::Rankings { position } => {
            let (ranking, path) = rankings(&config, *position)?;
            println!("ranked {} {position} players; wrote {}", ranking.len(), path.display());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Context assembly
// ---------------------------------------------------------------------------

/// The configured season, else the latest loaded season, else this year.
pub fn resolve_season(config: &AppConfig, tables: &[PlayerTable]) -> i32 {
    config
        .engine
        .run
        .current_season
        .or_else(|| tables.iter().filter_map(PlayerTable::latest_season).max())
        .unwrap_or_else(|| chrono::Utc::now().year())
}

fn load_free_agents(config: &AppConfig, position: Position) -> anyhow::Result<PlayerTable> {
    let Some(paths) = config.player_paths(position) else {
        bail!("no data.players.{} entry in run.toml", position.key());
    };
    let path = config.resolve(&paths.free_agents);
    data::load_player_table(&path, position)
        .with_context(|| format!("failed to load {position} free agents"))
}

/// Load the team tables and the given player tables, then derive the run
/// context.
pub fn build_context(config: &AppConfig, players: Vec<PlayerTable>) -> anyhow::Result<RunContext> {
    let seasonal = config.resolve(&config.data.team_seasonal);
    let weekly = config.data.team_weekly.as_deref().map(|p| config.resolve(p));
    let tendencies =
        data::load_tendencies(&seasonal, weekly.as_deref()).context("failed to load team tendencies")?;

    let settings = RunSettings {
        current_season: resolve_season(config, &players),
        fit_floor: config.engine.run.fit_floor,
    };
    let context = RunContext::build(&config.engine, settings, tendencies, players)
        .context("failed to build run context")?;
    for failure in context.failures() {
        warn!("skipped: {failure}");
    }
    Ok(context)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub struct SchemesReport {
    pub context: RunContext,
    pub path: PathBuf,
}

pub fn schemes(config: &AppConfig) -> anyhow::Result<SchemesReport> {
    let context = build_context(config, vec![])?;
    let path = output::write_team_schemes(&config.output_dir(), context.teams())
        .context("failed to write team schemes")?;
    Ok(SchemesReport { context, path })
}

pub struct FitsReport {
    pub position: Position,
    pub fits: Vec<RankedFit>,
    pub failures: Vec<FitError>,
    pub csv_path: PathBuf,
    pub json_path: PathBuf,
}

pub fn fits(config: &AppConfig, position: Position, team: Option<&str>) -> anyhow::Result<FitsReport> {
    let free_agents = load_free_agents(config, position)?;
    let context = build_context(config, vec![free_agents])?;

    let batch = match team {
        Some(query) => context.fits_for_team(query, position),
        None => context.fits_for_all_teams(position),
    }
    .with_context(|| format!("failed to compute {position} fits"))?;

    // an unusable population table leaves the fits unranked
    let ranking = population_ranking(config, position).unwrap_or_else(|e| {
        warn!("{position} fits written without population ranks: {e:#}");
        None
    });
    let ranked = match ranking {
        Some(ranking) => attach_rankings(batch.items, &ranking),
        None => batch
            .items
            .into_iter()
            .map(|fit| RankedFit {
                fit,
                ranks: BTreeMap::new(),
            })
            .collect(),
    };

    let (csv_path, json_path) = output::write_fits(
        &config.output_dir(),
        &FitRun {
            position,
            season: context.settings().current_season,
            team,
            fits: &ranked,
            failures: &batch.failures,
        },
    )
    .context("failed to write fits")?;

    Ok(FitsReport {
        position,
        fits: ranked,
        failures: batch.failures,
        csv_path,
        json_path,
    })
}

fn population_ranking(config: &AppConfig, position: Position) -> anyhow::Result<Option<PopulationRanking>> {
    let Some(path) = config
        .player_paths(position)
        .and_then(|p| p.population.as_deref())
    else {
        return Ok(None);
    };
    let population = data::load_player_table(&config.resolve(path), position)
        .with_context(|| format!("failed to load {position} population"))?;
    let ranking = rank_position(&config.engine, position, &population)
        .with_context(|| format!("failed to rank {position} population"))?;
    Ok(Some(ranking))
}

/// Population ranking reads only the position table, never the team files.
pub fn rankings(config: &AppConfig, position: Position) -> anyhow::Result<(PopulationRanking, PathBuf)> {
    let Some(ranking) = population_ranking(config, position)? else {
        bail!("no data.players.{}.population table in run.toml", position.key());
    };
    let path = output::write_rankings(&config.output_dir(), position, &ranking)
        .context("failed to write rankings")?;
    Ok((ranking, path))
}

// ---------------------------------------------------------------------------
// Console summaries
// ---------------------------------------------------------------------------

fn print_schemes(context: &RunContext) {
    for team in context.teams() {
        let scheme = &team.scheme;
        let note = if scheme.overridden {
            format!(" (computed {})", scheme.computed)
        } else {
            String::new()
        };
        println!("{:<5} {:<28} {}{note}", team.team(), team.team_name(), scheme.predicted);
    }
}

fn print_fits(report: &FitsReport) {
    for ranked in report.fits.iter().take(10) {
        let f = &ranked.fit;
        println!("{:<5} {:<28} {:>7.3}", f.team, f.player_name, f.final_fit);
    }
    if !report.failures.is_empty() {
        println!("{} {} fits skipped", report.failures.len(), report.position);
    }
    println!("wrote {} and {}", report.csv_path.display(), report.json_path.display());
}
