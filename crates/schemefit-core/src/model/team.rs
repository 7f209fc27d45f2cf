// Team tendency records: season aggregates, weekly averages, box-score ranks.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// Row label the league-average line carries in the seasonal table.
pub const LEAGUE_AVERAGE_TEAM: &str = "LGAVG";

/// One team's play-calling profile for the season.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamTendencyRecord {
    /// Abbreviation (`KC`, `LA`, ...). Primary identity.
    pub team: String,
    pub team_name: String,
    /// Season-level metrics and box-score columns (including `*_Rank`).
    pub season: BTreeMap<String, f64>,
    /// Per-metric mean over the team's weekly observations.
    pub weekly: BTreeMap<String, f64>,
}

impl TeamTendencyRecord {
    pub fn new(team: impl Into<String>, team_name: impl Into<String>) -> Self {
        TeamTendencyRecord {
            team: team.into(),
            team_name: team_name.into(),
            season: BTreeMap::new(),
            weekly: BTreeMap::new(),
        }
    }

    pub fn with_season(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.season.insert(metric.into(), value);
        self
    }

    pub fn with_weekly(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.weekly.insert(metric.into(), value);
        self
    }

    pub fn season_value(&self, metric: &str) -> Option<f64> {
        self.season.get(metric).copied().filter(|v| v.is_finite())
    }

    pub fn weekly_value(&self, metric: &str) -> Option<f64> {
        self.weekly.get(metric).copied().filter(|v| v.is_finite())
    }

    /// Match a user-supplied team query against the abbreviation (exact,
    /// case-insensitive) or the display name (substring, case-insensitive).
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return false;
        }
        self.team.eq_ignore_ascii_case(query)
            || self
                .team_name
                .to_lowercase()
                .contains(&query.to_lowercase())
    }
}

/// A tendency ratio computed from two season (and weekly) metrics. A
/// non-positive denominator is replaced by `floor`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TendencyRatio {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
    pub floor: f64,
}

impl TendencyRatio {
    fn compute(&self, numerator: f64, denominator: f64) -> f64 {
        let den = if denominator > 0.0 {
            denominator
        } else {
            self.floor
        };
        numerator / den
    }
}

/// One weekly observation row before averaging.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyObservation {
    pub team: String,
    pub week: u32,
    pub values: BTreeMap<String, f64>,
}

/// Average each team's weekly observations per metric, ignoring nulls.
pub fn average_weekly(rows: &[WeeklyObservation]) -> BTreeMap<String, BTreeMap<String, f64>> {
    let mut sums: BTreeMap<String, BTreeMap<String, (f64, u32)>> = BTreeMap::new();
    for row in rows {
        let team = sums.entry(row.team.clone()).or_default();
        for (metric, value) in &row.values {
            if !value.is_finite() {
                continue;
            }
            let slot = team.entry(metric.clone()).or_insert((0.0, 0));
            slot.0 += value;
            slot.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(team, metrics)| {
            let means = metrics
                .into_iter()
                .map(|(metric, (sum, n))| (metric, sum / n as f64))
                .collect();
            (team, means)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Every team's tendency record plus the season column schema.
#[derive(Debug, Clone)]
pub struct TendencyTable {
    columns: BTreeSet<String>,
    teams: Vec<TeamTendencyRecord>,
}

impl TendencyTable {
    /// The league-average row is dropped.
    pub fn new(columns: impl IntoIterator<Item = String>, teams: Vec<TeamTendencyRecord>) -> Self {
        TendencyTable {
            columns: columns.into_iter().collect(),
            teams: teams
                .into_iter()
                .filter(|t| !t.team.eq_ignore_ascii_case(LEAGUE_AVERAGE_TEAM))
                .collect(),
        }
    }

    /// Schema is every season metric seen on any team.
    pub fn from_records(teams: Vec<TeamTendencyRecord>) -> Self {
        let columns = teams
            .iter()
            .flat_map(|t| t.season.keys().cloned())
            .collect::<BTreeSet<_>>();
        Self::new(columns, teams)
    }

    pub fn columns(&self) -> &BTreeSet<String> {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn teams(&self) -> &[TeamTendencyRecord] {
        &self.teams
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn find(&self, query: &str) -> Option<&TeamTendencyRecord> {
        self.teams
            .iter()
            .find(|t| t.team.eq_ignore_ascii_case(query.trim()))
            .or_else(|| self.teams.iter().find(|t| t.matches(query)))
    }

    /// Add a season column, one value per team in table order.
    pub fn insert_column(&mut self, column: &str, values: Vec<Option<f64>>) {
        for (team, value) in self.teams.iter_mut().zip(values) {
            match value {
                Some(v) => {
                    team.season.insert(column.to_string(), v);
                }
                None => {
                    team.season.remove(column);
                }
            }
        }
        self.columns.insert(column.to_string());
    }

    /// Add the configured ratio tendencies. A ratio whose inputs are missing
    /// from the schema is skipped; the scorer reports it if a rubric needs it.
    pub fn with_ratios(mut self, ratios: &[TendencyRatio]) -> Self {
        for ratio in ratios {
            if !self.has_column(&ratio.numerator) || !self.has_column(&ratio.denominator) {
                continue;
            }
            for team in &mut self.teams {
                if let (Some(num), Some(den)) = (
                    team.season_value(&ratio.numerator),
                    team.season_value(&ratio.denominator),
                ) {
                    team.season.insert(ratio.name.clone(), ratio.compute(num, den));
                }
                if let (Some(num), Some(den)) = (
                    team.weekly_value(&ratio.numerator),
                    team.weekly_value(&ratio.denominator),
                ) {
                    team.weekly.insert(ratio.name.clone(), ratio.compute(num, den));
                }
            }
            self.columns.insert(ratio.name.clone());
        }
        self
    }
}
