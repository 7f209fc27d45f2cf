// Output tables: team scheme classification, fit tables (CSV + JSON) and
// population rankings.

use chrono::{DateTime, Utc};
use schemefit_core::model::position::Position;
use schemefit_core::model::scheme::Scheme;
use schemefit_core::scoring::ranking::{PopulationRanking, RankedFit};
use schemefit_core::{FitError, TeamProfile};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error writing {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("JSON error writing {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Cell formatting
// ---------------------------------------------------------------------------

fn float(v: f64) -> String {
    format!("{v:.4}")
}

fn opt_float(v: Option<f64>) -> String {
    v.map(float).unwrap_or_default()
}

fn opt_rank(v: Option<u32>) -> String {
    v.map(|r| r.to_string()).unwrap_or_default()
}

fn write_csv(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<(), OutputError> {
    let csv_err = |source| OutputError::Csv {
        path: path.display().to_string(),
        source,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| OutputError::Io {
            path: dir.display().to_string(),
            source,
        })?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(header).map_err(csv_err)?;
    for row in rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| OutputError::Io {
        path: path.display().to_string(),
        source,
    })?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Team schemes
// ---------------------------------------------------------------------------

fn team_scheme_table(teams: &[TeamProfile]) -> (Vec<String>, Vec<Vec<String>>) {
    let mut header: Vec<String> = vec!["team".into(), "team_name".into()];
    header.extend(Scheme::ALL.iter().map(|s| s.display_name().to_string()));
    header.extend(["computed_scheme", "predicted_scheme", "overridden"].map(String::from));
    for i in 1..=3 {
        header.push(format!("scheme_{i}"));
        header.push(format!("weight_{i}"));
    }

    let rows = teams
        .iter()
        .map(|t| {
            let mut row = vec![t.team().to_string(), t.team_name().to_string()];
            row.extend(t.scheme.scores.iter().map(|(_, v)| float(v)));
            row.push(t.scheme.computed.display_name().to_string());
            row.push(t.scheme.predicted.display_name().to_string());
            row.push(t.scheme.overridden.to_string());
            for i in 0..3 {
                match t.weights.entries().get(i) {
                    Some(w) => {
                        row.push(w.scheme.display_name().to_string());
                        row.push(float(w.weight));
                    }
                    None => {
                        row.push(String::new());
                        row.push(String::new());
                    }
                }
            }
            row
        })
        .collect();
    (header, rows)
}

pub fn write_team_schemes(dir: &Path, teams: &[TeamProfile]) -> Result<PathBuf, OutputError> {
    let path = dir.join("team_schemes.csv");
    let (header, rows) = team_scheme_table(teams);
    write_csv(&path, &header, &rows)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Fits
// ---------------------------------------------------------------------------

/// Adjustment names across all fits, in first-seen order.
fn adjustment_columns(fits: &[RankedFit]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for fit in fits {
        for a in &fit.fit.adjustments {
            if !names.contains(&a.name) {
                names.push(a.name.clone());
            }
        }
    }
    names
}

fn fit_table(fits: &[RankedFit]) -> (Vec<String>, Vec<Vec<String>>) {
    let adjustments = adjustment_columns(fits);
    let rank_columns: Vec<String> = fits
        .first()
        .map(|f| f.ranks.keys().cloned().collect())
        .unwrap_or_default();

    let mut header: Vec<String> = [
        "team",
        "team_name",
        "player_id",
        "player_name",
        "season",
        "games",
        "age",
        "prev_team",
        "aav",
        "production_score",
    ]
    .map(String::from)
    .to_vec();
    header.extend(Scheme::ALL.iter().map(|s| format!("fit_{}", s.key())));
    header.push("base_fit".into());
    header.extend(adjustments.iter().map(|a| format!("adj_{a}")));
    header.push("final_fit".into());
    header.extend(rank_columns.iter().map(|m| format!("{m}_rank")));

    let rows = fits
        .iter()
        .map(|ranked| {
            let f = &ranked.fit;
            let mut row = vec![
                f.team.clone(),
                f.team_name.clone(),
                f.player_id.clone(),
                f.player_name.clone(),
                f.season.to_string(),
                f.games.to_string(),
                opt_float(f.age),
                f.prev_team.clone().unwrap_or_default(),
                opt_float(f.market_value),
                float(f.production_score),
            ];
            row.extend(f.raw_fits.iter().map(|(_, v)| float(v)));
            row.push(float(f.base_fit));
            row.extend(adjustments.iter().map(|a| opt_float(f.adjustment(a))));
            row.push(float(f.final_fit));
            row.extend(
                rank_columns
                    .iter()
                    .map(|m| opt_rank(ranked.ranks.get(m).copied().flatten())),
            );
            row
        })
        .collect();
    (header, rows)
}

/// JSON document wrapping a fit run.
#[derive(Debug, Serialize)]
struct FitDocument<'a> {
    generated_at: DateTime<Utc>,
    position: Position,
    season: i32,
    team: Option<&'a str>,
    fits: &'a [RankedFit],
    failures: Vec<String>,
}

pub struct FitRun<'a> {
    pub position: Position,
    pub season: i32,
    pub team: Option<&'a str>,
    pub fits: &'a [RankedFit],
    pub failures: &'a [FitError],
}

/// Write `<pos>_fits.csv` and `<pos>_fits.json`, returning both paths.
pub fn write_fits(dir: &Path, run: &FitRun<'_>) -> Result<(PathBuf, PathBuf), OutputError> {
    let stem = format!("{}_fits", run.position.key());
    let csv_path = dir.join(format!("{stem}.csv"));
    let json_path = dir.join(format!("{stem}.json"));

    let (header, rows) = fit_table(run.fits);
    write_csv(&csv_path, &header, &rows)?;

    let doc = FitDocument {
        generated_at: Utc::now(),
        position: run.position,
        season: run.season,
        team: run.team,
        fits: run.fits,
        failures: run.failures.iter().map(ToString::to_string).collect(),
    };
    let file = std::fs::File::create(&json_path).map_err(|source| OutputError::Io {
        path: json_path.display().to_string(),
        source,
    })?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &doc).map_err(|source| OutputError::Json {
        path: json_path.display().to_string(),
        source,
    })?;
    info!("Wrote {} fits to {}", run.fits.len(), json_path.display());

    Ok((csv_path, json_path))
}

// ---------------------------------------------------------------------------
// Rankings
// ---------------------------------------------------------------------------

fn ranking_table(ranking: &PopulationRanking) -> (Vec<String>, Vec<Vec<String>>) {
    let mut header = vec!["player_name".to_string()];
    header.extend(ranking.metrics().iter().map(|m| format!("{m}_rank")));
    let rows = ranking
        .players()
        .iter()
        .filter_map(|player| {
            let ranks = ranking.ranks_for(player)?;
            let mut row = vec![player.clone()];
            row.extend(
                ranking
                    .metrics()
                    .iter()
                    .map(|m| opt_rank(ranks.get(m).copied().flatten())),
            );
            Some(row)
        })
        .collect();
    (header, rows)
}

pub fn write_rankings(dir: &Path, position: Position, ranking: &PopulationRanking) -> Result<PathBuf, OutputError> {
    let path = dir.join(format!("{}_rankings.csv", position.key()));
    let (header, rows) = ranking_table(ranking);
    write_csv(&path, &header, &rows)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
