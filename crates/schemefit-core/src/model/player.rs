// Player-season records and the position tables that hold them.

use crate::error::FitError;
use crate::model::position::Position;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One player's season line. Stats are keyed by column name; a null cell is
/// simply absent from `stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSeasonRecord {
    pub player_id: String,
    pub player_name: String,
    pub position: Position,
    pub season: i32,
    pub games: u32,
    pub age: Option<f64>,
    pub prev_team: Option<String>,
    /// Average annual value from the free-agent listing.
    pub market_value: Option<f64>,
    pub stats: BTreeMap<String, f64>,
}

impl PlayerSeasonRecord {
    pub fn new(
        player_id: impl Into<String>,
        player_name: impl Into<String>,
        position: Position,
        season: i32,
        games: u32,
    ) -> Self {
        PlayerSeasonRecord {
            player_id: player_id.into(),
            player_name: player_name.into(),
            position,
            season,
            games,
            age: None,
            prev_team: None,
            market_value: None,
            stats: BTreeMap::new(),
        }
    }

    pub fn with_stat(mut self, column: impl Into<String>, value: f64) -> Self {
        self.stats.insert(column.into(), value);
        self
    }

    pub fn with_age(mut self, age: f64) -> Self {
        self.age = Some(age);
        self
    }

    /// Non-finite values read as null.
    pub fn stat(&self, column: &str) -> Option<f64> {
        self.stats.get(column).copied().filter(|v| v.is_finite())
    }
}

// ---------------------------------------------------------------------------
// Derived columns
// ---------------------------------------------------------------------------

/// A column computed from other columns before normalization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivedColumn {
    /// `<source>_per_game`; null when the player has no games.
    PerGame { source: String },
    /// `numerator / denominator`; 0 when the denominator is 0.
    Ratio {
        name: String,
        numerator: String,
        denominator: String,
    },
    /// `minuend - subtrahend`.
    Difference {
        name: String,
        minuend: String,
        subtrahend: String,
    },
}

impl DerivedColumn {
    pub fn name(&self) -> String {
        match self {
            DerivedColumn::PerGame { source } => format!("{source}_per_game"),
            DerivedColumn::Ratio { name, .. } | DerivedColumn::Difference { name, .. } => {
                name.clone()
            }
        }
    }

    /// Columns this derivation reads.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            DerivedColumn::PerGame { source } => vec![source.as_str()],
            DerivedColumn::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator.as_str(), denominator.as_str()],
            DerivedColumn::Difference {
                minuend,
                subtrahend,
                ..
            } => vec![minuend.as_str(), subtrahend.as_str()],
        }
    }

    fn compute(&self, record: &PlayerSeasonRecord) -> Option<f64> {
        match self {
            DerivedColumn::PerGame { source } => {
                if record.games == 0 {
                    return None;
                }
                record.stat(source).map(|v| v / record.games as f64)
            }
            DerivedColumn::Ratio {
                numerator,
                denominator,
                ..
            } => {
                let den = record.stat(denominator)?;
                if den <= 0.0 {
                    return Some(0.0);
                }
                record.stat(numerator).map(|num| num / den)
            }
            DerivedColumn::Difference {
                minuend,
                subtrahend,
                ..
            } => Some(record.stat(minuend)? - record.stat(subtrahend)?),
        }
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// All records for one position plus the column schema they were read with.
/// The schema lets "column missing from the file" be told apart from
/// "column present but empty".
#[derive(Debug, Clone)]
pub struct PlayerTable {
    position: Position,
    columns: BTreeSet<String>,
    records: Vec<PlayerSeasonRecord>,
}

impl PlayerTable {
    pub fn new(
        position: Position,
        columns: impl IntoIterator<Item = String>,
        records: Vec<PlayerSeasonRecord>,
    ) -> Self {
        PlayerTable {
            position,
            columns: columns.into_iter().collect(),
            records,
        }
    }

    /// Build a table whose schema is every stat column seen in `records`.
    pub fn from_records(position: Position, records: Vec<PlayerSeasonRecord>) -> Self {
        let columns = records
            .iter()
            .flat_map(|r| r.stats.keys().cloned())
            .collect::<BTreeSet<_>>();
        PlayerTable {
            position,
            columns,
            records,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn columns(&self) -> &BTreeSet<String> {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn records(&self) -> &[PlayerSeasonRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn latest_season(&self) -> Option<i32> {
        self.records.iter().map(|r| r.season).max()
    }

    /// Return a copy of the table extended with the derived columns, applied
    /// in order so later derivations may read earlier ones.
    ///
    /// A derivation whose input is absent from the schema is a configuration
    /// error.
    pub fn with_derived(&self, derived: &[DerivedColumn]) -> Result<PlayerTable, FitError> {
        let mut table = self.clone();
        for column in derived {
            for input in column.inputs() {
                if !table.has_column(input) {
                    return Err(FitError::configuration(
                        format!("positions.{}.derived", self.position.key()),
                        format!(
                            "`{}` needs column `{input}`, which the {} table does not have",
                            column.name(),
                            self.position
                        ),
                    ));
                }
            }
            let name = column.name();
            for record in &mut table.records {
                match column.compute(record) {
                    Some(v) if v.is_finite() => {
                        record.stats.insert(name.clone(), v);
                    }
                    _ => {
                        record.stats.remove(&name);
                    }
                }
            }
            table.columns.insert(name);
        }
        Ok(table)
    }
}
