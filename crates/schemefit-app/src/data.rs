// Season snapshot loading: per-position player tables and the team
// seasonal/weekly tendency tables, all from CSV.
//
// Player and team CSVs have open schemas (every non-identity column is a
// numeric stat), so rows are read as raw `StringRecord`s against the header
// rather than deserialized into fixed structs.

use schemefit_core::model::player::{PlayerSeasonRecord, PlayerTable};
use schemefit_core::model::position::Position;
use schemefit_core::model::team::{average_weekly, TeamTendencyRecord, TendencyTable, WeeklyObservation};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("{path}: missing required column `{column}`")]
    MissingColumn { path: String, column: String },

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Column layout
// ---------------------------------------------------------------------------

/// Identity and pass-through columns; everything else is a stat.
const PLAYER_ID: &str = "player_id";
const PLAYER_NAME: &str = "player_name";
const SEASON: &str = "season";
const GAMES: &str = "games";
const POSITION: &str = "position";
const AGE: [&str; 2] = ["age", "Age"];
const PREV_TEAM: [&str; 2] = ["prev_team", "Prev Team"];
const MARKET_VALUE: [&str; 2] = ["aav", "AAV"];

const TEAM: &str = "posteam";
const TEAM_NAME: &str = "team_name";
const WEEK: &str = "week";

/// Header positions resolved once per file.
struct Header {
    names: Vec<String>,
}

impl Header {
    fn new(record: &csv::StringRecord) -> Self {
        Header {
            names: record.iter().map(|h| h.trim().to_string()).collect(),
        }
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|h| h == name)
    }

    fn find_any(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|n| self.find(n))
    }

    fn require(&self, name: &str, path: &str) -> Result<usize, DataError> {
        self.find(name).ok_or_else(|| DataError::MissingColumn {
            path: path.to_string(),
            column: name.to_string(),
        })
    }

    /// `(index, name)` for every column not in `reserved`.
    fn stat_columns(&self, reserved: &[Option<usize>]) -> Vec<(usize, String)> {
        self.names
            .iter()
            .enumerate()
            .filter(|(i, name)| !name.is_empty() && !reserved.contains(&Some(*i)))
            .map(|(i, name)| (i, name.clone()))
            .collect()
    }
}

fn cell(record: &csv::StringRecord, index: usize) -> Option<&str> {
    record.get(index).map(str::trim).filter(|s| !s.is_empty())
}

/// Parse a numeric cell. Empty cells and `NA` read as null.
fn numeric(raw: &str) -> Option<f64> {
    if raw.eq_ignore_ascii_case("na") || raw.eq_ignore_ascii_case("nan") {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Money cells may carry `$` and thousands separators.
fn money(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
    numeric(&cleaned)
}

/// Counts non-numeric cells per stat column so each is reported once.
#[derive(Default)]
struct BadCells(BTreeMap<String, usize>);

impl BadCells {
    fn note(&mut self, column: &str) {
        *self.0.entry(column.to_string()).or_default() += 1;
    }

    fn report(&self, path: &str) {
        for (column, count) in &self.0 {
            debug!("{path}: column `{column}` has {count} non-numeric cells, read as null");
        }
    }
}

/// Read a stat cell into `stats`, leaving nulls absent.
fn read_stat(
    record: &csv::StringRecord,
    index: usize,
    column: &str,
    stats: &mut BTreeMap<String, f64>,
    bad: &mut BadCells,
) {
    if let Some(raw) = cell(record, index) {
        match numeric(raw) {
            Some(v) => {
                stats.insert(column.to_string(), v);
            }
            None => bad.note(column),
        }
    }
}

// ---------------------------------------------------------------------------
// Reader-based loaders (private, enable testing without temp files)
// ---------------------------------------------------------------------------

fn load_players_from_reader<R: Read>(
    rdr: R,
    position: Position,
    path: &str,
) -> Result<PlayerTable, DataError> {
    let csv_err = |source| DataError::Csv {
        path: path.to_string(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    let header = Header::new(reader.headers().map_err(csv_err)?);

    let id_col = header.require(PLAYER_ID, path)?;
    let name_col = header.require(PLAYER_NAME, path)?;
    let season_col = header.require(SEASON, path)?;
    let games_col = header.require(GAMES, path)?;
    let position_col = header.find(POSITION);
    let age_col = header.find_any(&AGE);
    let prev_team_col = header.find_any(&PREV_TEAM);
    let value_col = header.find_any(&MARKET_VALUE);

    let stat_cols = header.stat_columns(&[
        Some(id_col),
        Some(name_col),
        Some(season_col),
        Some(games_col),
        position_col,
        age_col,
        prev_team_col,
        value_col,
    ]);

    let mut records = Vec::new();
    let mut bad = BadCells::default();
    let mut other_positions = 0usize;

    for (line, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("{path}: skipping malformed row {}: {e}", line + 2);
                continue;
            }
        };

        let (Some(id), Some(name)) = (cell(&record, id_col), cell(&record, name_col)) else {
            warn!("{path}: skipping row {} with no player id or name", line + 2);
            continue;
        };
        let Some(season) = cell(&record, season_col).and_then(numeric).map(|s| s as i32) else {
            warn!("{path}: skipping '{name}': unparseable season");
            continue;
        };
        let Some(games) = cell(&record, games_col)
            .and_then(numeric)
            .filter(|g| *g >= 0.0)
            .map(|g| g.round() as u32)
        else {
            warn!("{path}: skipping '{name}': unparseable games");
            continue;
        };
        if let Some(raw) = position_col.and_then(|i| cell(&record, i)) {
            if Position::from_str_pos(raw) != Some(position) {
                other_positions += 1;
                continue;
            }
        }

        let mut player = PlayerSeasonRecord::new(id, name, position, season, games);
        player.age = age_col.and_then(|i| cell(&record, i)).and_then(numeric);
        player.prev_team = prev_team_col
            .and_then(|i| cell(&record, i))
            .map(str::to_string);
        player.market_value = value_col.and_then(|i| cell(&record, i)).and_then(money);
        for (i, column) in &stat_cols {
            read_stat(&record, *i, column, &mut player.stats, &mut bad);
        }
        records.push(player);
    }

    bad.report(path);
    if other_positions > 0 {
        debug!("{path}: ignored {other_positions} rows for other positions");
    }

    Ok(PlayerTable::new(
        position,
        stat_cols.into_iter().map(|(_, name)| name),
        records,
    ))
}

fn load_team_seasonal_from_reader<R: Read>(rdr: R, path: &str) -> Result<Vec<TeamTendencyRecord>, DataError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    let header = Header::new(reader.headers().map_err(|source| DataError::Csv {
        path: path.to_string(),
        source,
    })?);

    let team_col = header.require(TEAM, path)?;
    let name_col = header.find(TEAM_NAME);
    let stat_cols = header.stat_columns(&[Some(team_col), name_col]);

    let mut teams = Vec::new();
    let mut seen = BTreeSet::new();
    let mut bad = BadCells::default();

    for (line, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("{path}: skipping malformed row {}: {e}", line + 2);
                continue;
            }
        };
        let Some(abbr) = cell(&record, team_col) else {
            warn!("{path}: skipping row {} with no team", line + 2);
            continue;
        };
        if !seen.insert(abbr.to_ascii_uppercase()) {
            warn!("{path}: duplicate team '{abbr}', keeping the first row");
            continue;
        }
        let name = name_col
            .and_then(|i| cell(&record, i))
            .unwrap_or(abbr);
        let mut team = TeamTendencyRecord::new(abbr, name);
        for (i, column) in &stat_cols {
            read_stat(&record, *i, column, &mut team.season, &mut bad);
        }
        teams.push(team);
    }

    bad.report(path);
    Ok(teams)
}

fn load_team_weekly_from_reader<R: Read>(rdr: R, path: &str) -> Result<Vec<WeeklyObservation>, DataError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    let header = Header::new(reader.headers().map_err(|source| DataError::Csv {
        path: path.to_string(),
        source,
    })?);

    let team_col = header.require(TEAM, path)?;
    let week_col = header.require(WEEK, path)?;
    let stat_cols = header.stat_columns(&[Some(team_col), Some(week_col), header.find(TEAM_NAME)]);

    let mut rows = Vec::new();
    let mut bad = BadCells::default();

    for (line, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("{path}: skipping malformed row {}: {e}", line + 2);
                continue;
            }
        };
        let Some(team) = cell(&record, team_col) else {
            continue;
        };
        let Some(week) = cell(&record, week_col).and_then(numeric).map(|w| w as u32) else {
            warn!("{path}: skipping {team} row {} with no week", line + 2);
            continue;
        };
        let mut values = BTreeMap::new();
        for (i, column) in &stat_cols {
            read_stat(&record, *i, column, &mut values, &mut bad);
        }
        rows.push(WeeklyObservation {
            team: team.to_ascii_uppercase(),
            week,
            values,
        });
    }

    bad.report(path);
    Ok(rows)
}

/// Attach weekly means to the seasonal records, matching on abbreviation.
fn merge_weekly(teams: &mut [TeamTendencyRecord], weekly: &[WeeklyObservation]) {
    let mut means = average_weekly(weekly);
    for team in teams.iter_mut() {
        if let Some(values) = means.remove(&team.team.to_ascii_uppercase()) {
            team.weekly = values;
        }
    }
    for orphan in means.keys() {
        debug!("weekly rows for '{orphan}' have no seasonal record");
    }
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

fn open(path: &Path) -> Result<std::fs::File, DataError> {
    std::fs::File::open(path).map_err(|e| DataError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load one position's player table.
pub fn load_player_table(path: &Path, position: Position) -> Result<PlayerTable, DataError> {
    let table = load_players_from_reader(open(path)?, position, &path.display().to_string())?;
    if table.is_empty() {
        return Err(DataError::Validation(format!(
            "{} produced zero valid {position} rows",
            path.display()
        )));
    }
    info!("Loaded {} {position} rows from {}", table.len(), path.display());
    Ok(table)
}

/// Load the seasonal tendency table, merging weekly means when a weekly
/// table is given.
pub fn load_tendencies(seasonal: &Path, weekly: Option<&Path>) -> Result<TendencyTable, DataError> {
    let mut teams = load_team_seasonal_from_reader(open(seasonal)?, &seasonal.display().to_string())?;
    if teams.is_empty() {
        return Err(DataError::Validation(format!(
            "{} produced zero team rows",
            seasonal.display()
        )));
    }
    if let Some(weekly) = weekly {
        let rows = load_team_weekly_from_reader(open(weekly)?, &weekly.display().to_string())?;
        info!("Loaded {} weekly rows from {}", rows.len(), weekly.display());
        merge_weekly(&mut teams, &rows);
    }
    let table = TendencyTable::from_records(teams);
    info!("Loaded {} teams from {}", table.len(), seasonal.display());
    Ok(table)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Player tables --

    #[test]
    fn player_csv_reads_identity_and_stats() {
        let csv_data = "\
player_id,player_name,season,games,Age,Prev Team,AAV,carries,rushing_yards,rushing_epa
00-001,Derrick Runner,2024,17,27,TEN,\"$12,000,000\",300,1350,12.5
00-002,Backup Back,2023,6,,NYJ,,40,150,";

        let table = load_players_from_reader(csv_data.as_bytes(), Position::RunningBack, "rb.csv").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.position(), Position::RunningBack);
        assert!(table.has_column("carries"));
        assert!(table.has_column("rushing_epa"));
        assert!(!table.has_column("Age"));
        assert!(!table.has_column("games"));

        let first = &table.records()[0];
        assert_eq!(first.player_id, "00-001");
        assert_eq!(first.player_name, "Derrick Runner");
        assert_eq!(first.season, 2024);
        assert_eq!(first.games, 17);
        assert_eq!(first.age, Some(27.0));
        assert_eq!(first.prev_team.as_deref(), Some("TEN"));
        assert_eq!(first.market_value, Some(12_000_000.0));
        assert_eq!(first.stat("rushing_yards"), Some(1350.0));

        let second = &table.records()[1];
        assert_eq!(second.age, None);
        assert_eq!(second.market_value, None);
        assert_eq!(second.stat("rushing_epa"), None);
        assert_eq!(table.latest_season(), Some(2024));
    }

    #[test]
    fn player_csv_skips_rows_with_bad_identity() {
        let csv_data = "\
player_id,player_name,season,games,carries
00-001,Good Row,2024,17,300
,No Id,2024,17,100
00-003,Bad Season,twenty,17,100
00-004,Bad Games,2024,-1,100";

        let table = load_players_from_reader(csv_data.as_bytes(), Position::RunningBack, "rb.csv").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].player_name, "Good Row");
    }

    #[test]
    fn player_csv_filters_other_positions() {
        let csv_data = "\
player_id,player_name,position,season,games,receptions
1,Slot Guy,WR,2024,17,90
2,Big Target,TE,2024,17,60
3,Halfback,HB,2024,17,40";

        let table = load_players_from_reader(csv_data.as_bytes(), Position::TightEnd, "te.csv").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].player_name, "Big Target");
        assert!(!table.has_column("position"));
    }

    #[test]
    fn non_numeric_stat_cells_read_as_null() {
        let csv_data = "\
player_id,player_name,season,games,recent_team,receptions
1,Pass Catcher,2024,17,KC,90
2,Other,2024,17,NA,NA";

        let table = load_players_from_reader(csv_data.as_bytes(), Position::WideReceiver, "wr.csv").unwrap();
        assert_eq!(table.records()[0].stat("recent_team"), None);
        assert_eq!(table.records()[0].stat("receptions"), Some(90.0));
        assert_eq!(table.records()[1].stat("receptions"), None);
    }

    #[test]
    fn player_csv_missing_required_column() {
        let csv_data = "player_id,player_name,games\n1,No Season,17\n";
        let err = load_players_from_reader(csv_data.as_bytes(), Position::Quarterback, "qb.csv").unwrap_err();
        match err {
            DataError::MissingColumn { column, .. } => assert_eq!(column, "season"),
            other => panic!("expected MissingColumn, got: {other}"),
        }
    }

    #[test]
    fn fractional_games_round() {
        let csv_data = "player_id,player_name,season,games\n1,Rounded,2024.0,16.6\n";
        let table = load_players_from_reader(csv_data.as_bytes(), Position::Quarterback, "qb.csv").unwrap();
        assert_eq!(table.records()[0].games, 17);
        assert_eq!(table.records()[0].season, 2024);
    }

    // -- Team tables --

    #[test]
    fn team_seasonal_reads_metrics_and_names() {
        let csv_data = "\
posteam,team_name,pass_to_run,shotgun_freq,PointsScored
KC,Kansas City Chiefs,0.62,0.71,450
BUF,,0.58,0.80,
LGAVG,League Average,0.59,0.66,380
KC,Duplicate,0.1,0.1,1";

        let teams = load_team_seasonal_from_reader(csv_data.as_bytes(), "teams.csv").unwrap();
        assert_eq!(teams.len(), 3);
        assert_eq!(teams[0].team_name, "Kansas City Chiefs");
        assert_eq!(teams[0].season_value("pass_to_run"), Some(0.62));
        assert_eq!(teams[1].team_name, "BUF");
        assert_eq!(teams[1].season_value("PointsScored"), None);

        let table = TendencyTable::from_records(teams);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn weekly_rows_average_onto_seasonal() {
        let seasonal = "posteam,shotgun_freq\nKC,0.7\nBUF,0.8\n";
        let weekly = "\
posteam,week,shotgun_freq,no_huddle_freq
KC,1,0.6,0.1
KC,2,0.8,
kc,3,0.7,0.3
NYJ,1,0.5,0.0";

        let mut teams = load_team_seasonal_from_reader(seasonal.as_bytes(), "s.csv").unwrap();
        let rows = load_team_weekly_from_reader(weekly.as_bytes(), "w.csv").unwrap();
        assert_eq!(rows.len(), 4);
        merge_weekly(&mut teams, &rows);

        // empty cells are skipped, not averaged in as zero
        let kc = &teams[0];
        assert!((kc.weekly_value("shotgun_freq").unwrap() - 0.7).abs() < 1e-12);
        assert!((kc.weekly_value("no_huddle_freq").unwrap() - 0.2).abs() < 1e-12);
        assert!(teams[1].weekly.is_empty());
    }

    #[test]
    fn team_seasonal_requires_posteam() {
        let csv_data = "team,pass_to_run\nKC,0.6\n";
        let err = load_team_seasonal_from_reader(csv_data.as_bytes(), "teams.csv").unwrap_err();
        assert!(matches!(err, DataError::MissingColumn { .. }));
    }
}
