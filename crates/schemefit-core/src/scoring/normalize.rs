// Median imputation and bounded min-max rescaling of feature columns.

use crate::error::FitError;
use crate::model::player::{PlayerSeasonRecord, PlayerTable};
use crate::model::position::Position;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Scale range
// ---------------------------------------------------------------------------

/// Target interval for rescaled values. `lo` stays above zero so a scaled
/// feature never erases a weighted term entirely.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScaleRange {
    pub lo: f64,
    pub hi: f64,
}

impl Default for ScaleRange {
    fn default() -> Self {
        ScaleRange { lo: 0.2, hi: 1.0 }
    }
}

impl ScaleRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lo && value <= self.hi
    }
}

// ---------------------------------------------------------------------------
// Column helpers
// ---------------------------------------------------------------------------

/// Median of the finite values, averaging the two middle values for an even
/// count. Returns `None` when there are no finite values.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = finite.len() / 2;
    if finite.len() % 2 == 0 {
        Some((finite[mid - 1] + finite[mid]) / 2.0)
    } else {
        Some(finite[mid])
    }
}

/// Rescale a fully populated column into `range`. A constant column maps to
/// `range.lo` everywhere.
pub fn min_max_scale(values: &[f64], range: ScaleRange) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;
    values
        .iter()
        .map(|&v| {
            if span > 0.0 {
                (range.lo + (v - min) * (range.hi - range.lo) / span).clamp(range.lo, range.hi)
            } else {
                range.lo
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Normalized rows
// ---------------------------------------------------------------------------

/// A player-season after imputation and rescaling. `values` holds the
/// imputed natural-unit values and `scaled` the rescaled ones, both indexed
/// by the owning table's column order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFeatureRow {
    pub player_id: String,
    pub player_name: String,
    pub season: i32,
    pub games: u32,
    pub age: Option<f64>,
    pub prev_team: Option<String>,
    pub market_value: Option<f64>,
    values: Vec<f64>,
    scaled: Vec<f64>,
}

impl NormalizedFeatureRow {
    fn from_record(record: &PlayerSeasonRecord, width: usize) -> Self {
        NormalizedFeatureRow {
            player_id: record.player_id.clone(),
            player_name: record.player_name.clone(),
            season: record.season,
            games: record.games,
            age: record.age,
            prev_team: record.prev_team.clone(),
            market_value: record.market_value,
            values: Vec::with_capacity(width),
            scaled: Vec::with_capacity(width),
        }
    }

    /// Imputed natural-unit value of column `index`.
    pub fn value(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// Rescaled value of column `index`.
    pub fn scaled(&self, index: usize) -> Option<f64> {
        self.scaled.get(index).copied()
    }
}

/// The normalized feature matrix for one position.
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    position: Position,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<NormalizedFeatureRow>,
}

impl NormalizedTable {
    pub fn position(&self) -> Position {
        self.position
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    pub fn rows(&self) -> &[NormalizedFeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a row's imputed value by column name.
    pub fn value_of(&self, row: &NormalizedFeatureRow, column: &str) -> Option<f64> {
        self.column_index(column).and_then(|i| row.value(i))
    }

    /// Look up a row's scaled value by column name.
    pub fn scaled_of(&self, row: &NormalizedFeatureRow, column: &str) -> Option<f64> {
        self.column_index(column).and_then(|i| row.scaled(i))
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    range: ScaleRange,
}

impl Normalizer {
    pub fn new(range: ScaleRange) -> Self {
        Normalizer { range }
    }

    pub fn range(&self) -> ScaleRange {
        self.range
    }

    /// Impute and rescale `columns` of `table`.
    ///
    /// 1. Every requested column must be in the table schema, otherwise the
    ///    run is misconfigured.
    /// 2. Nulls (and non-finite cells) are replaced by the column median.
    ///    A column with no values at all cannot be imputed.
    /// 3. Each column is rescaled into the configured range independently.
    pub fn normalize(
        &self,
        table: &PlayerTable,
        columns: &[String],
    ) -> Result<NormalizedTable, FitError> {
        for column in columns {
            if !table.has_column(column) {
                return Err(FitError::configuration(
                    format!("positions.{}.features", table.position().key()),
                    format!(
                        "required column `{column}` is absent from the {} table",
                        table.position()
                    ),
                ));
            }
        }

        let records = table.records();
        let mut rows: Vec<NormalizedFeatureRow> = records
            .iter()
            .map(|r| NormalizedFeatureRow::from_record(r, columns.len()))
            .collect();

        if !records.is_empty() {
            for column in columns {
                let raw: Vec<f64> = records
                    .iter()
                    .map(|r| r.stat(column).unwrap_or(f64::NAN))
                    .collect();
                let fill = median(&raw).ok_or_else(|| {
                    FitError::data_quality(
                        format!("{} column `{column}`", table.position()),
                        "every value is null; nothing to impute from",
                    )
                })?;
                let imputed: Vec<f64> = raw
                    .into_iter()
                    .map(|v| if v.is_finite() { v } else { fill })
                    .collect();
                let scaled = min_max_scale(&imputed, self.range);
                for ((row, value), scaled) in rows.iter_mut().zip(imputed).zip(scaled) {
                    row.values.push(value);
                    row.scaled.push(scaled);
                }
            }
        }

        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();

        Ok(NormalizedTable {
            position: table.position(),
            columns: columns.to_vec(),
            index,
            rows,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
