// Min-tie ranking of population metrics and team box-score columns.

use crate::config::{RankingMetric, TeamRankConfig};
use crate::error::FitError;
use crate::model::player::PlayerTable;
use crate::model::team::TendencyTable;
use crate::scoring::combine::FitResult;
use crate::scoring::normalize::Normalizer;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankDirection {
    /// Highest value gets rank 1.
    Descending,
    /// Lowest value gets rank 1.
    Ascending,
}

/// Rank `values` with the min-tie convention: tied values share the lowest
/// rank of their group and the next distinct value skips by the group size.
/// Nulls get no rank and do not occupy a position.
pub fn rank_min(values: &[Option<f64>], direction: RankDirection) -> Vec<Option<u32>> {
    let mut order: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.filter(|x| x.is_finite()).map(|x| (i, x)))
        .collect();
    order.sort_by(|a, b| {
        let ord = a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal);
        match direction {
            RankDirection::Ascending => ord,
            RankDirection::Descending => ord.reverse(),
        }
    });

    let mut ranks = vec![None; values.len()];
    let mut current_rank = 0u32;
    let mut previous: Option<f64> = None;
    for (position, (index, value)) in order.into_iter().enumerate() {
        if previous != Some(value) {
            current_rank = position as u32 + 1;
            previous = Some(value);
        }
        ranks[index] = Some(current_rank);
    }
    ranks
}

// ---------------------------------------------------------------------------
// Population ranking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingRow {
    pub player_name: String,
    pub metric: String,
    pub rank: u32,
}

/// Per-player ranks on each display metric across the full population.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationRanking {
    /// Metric labels in declaration order.
    metrics: Vec<String>,
    /// Players in first-appearance order.
    players: Vec<String>,
    /// `ranks[player][metric]`.
    ranks: Vec<Vec<Option<u32>>>,
}

impl PopulationRanking {
    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Ranks keyed by metric label, or `None` for a player outside the
    /// population.
    pub fn ranks_for(&self, player_name: &str) -> Option<BTreeMap<String, Option<u32>>> {
        let index = self.players.iter().position(|p| p == player_name)?;
        Some(
            self.metrics
                .iter()
                .cloned()
                .zip(self.ranks[index].iter().copied())
                .collect(),
        )
    }

    /// Flatten into (player, metric, rank) rows, player-major.
    pub fn rows(&self) -> Vec<RankingRow> {
        let mut rows = Vec::with_capacity(self.players.len() * self.metrics.len());
        for (player, ranks) in self.players.iter().zip(&self.ranks) {
            for (metric, rank) in self.metrics.iter().zip(ranks) {
                if let Some(rank) = rank {
                    rows.push(RankingRow {
                        player_name: player.clone(),
                        metric: metric.clone(),
                        rank: *rank,
                    });
                }
            }
        }
        rows
    }
}

/// Rank the population on each metric.
///
/// Columns are imputed and rescaled over every row first, then duplicate
/// player names are averaged, then each metric (or its complement) is
/// ranked highest-first.
pub fn rank_population(
    table: &PlayerTable,
    metrics: &[RankingMetric],
    normalizer: &Normalizer,
) -> Result<PopulationRanking, FitError> {
    let mut columns: Vec<String> = Vec::new();
    for m in metrics {
        if !columns.contains(&m.metric) {
            columns.push(m.metric.clone());
        }
    }
    let normalized = normalizer.normalize(table, &columns)?;

    let mut players: Vec<String> = Vec::new();
    let mut index_of: HashMap<&str, usize> = HashMap::new();
    let mut sums: Vec<Vec<f64>> = Vec::new();
    let mut counts: Vec<u32> = Vec::new();
    for row in normalized.rows() {
        let slot = *index_of.entry(row.player_name.as_str()).or_insert_with(|| {
            players.push(row.player_name.clone());
            sums.push(vec![0.0; columns.len()]);
            counts.push(0);
            players.len() - 1
        });
        for (c, sum) in sums[slot].iter_mut().enumerate() {
            *sum += row.scaled(c).unwrap_or(0.0);
        }
        counts[slot] += 1;
    }

    let mut ranks = vec![Vec::with_capacity(metrics.len()); players.len()];
    for metric in metrics {
        let column = columns.iter().position(|c| *c == metric.metric).unwrap_or(0);
        let values: Vec<Option<f64>> = sums
            .iter()
            .zip(&counts)
            .map(|(s, n)| {
                let mean = s[column] / f64::from(*n);
                Some(if metric.complement { 1.0 - mean } else { mean })
            })
            .collect();
        for (player_ranks, rank) in ranks.iter_mut().zip(rank_min(&values, RankDirection::Descending)) {
            player_ranks.push(rank);
        }
    }

    debug!(
        position = %table.position(),
        players = players.len(),
        metrics = metrics.len(),
        "ranked population"
    );
    Ok(PopulationRanking {
        metrics: metrics.iter().map(RankingMetric::label).collect(),
        players,
        ranks,
    })
}

// ---------------------------------------------------------------------------
// Merge onto fits
// ---------------------------------------------------------------------------

/// A fit with the player's population ranks attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedFit {
    #[serde(flatten)]
    pub fit: FitResult,
    /// Every ranking metric; `None` when the player is not in the population.
    pub ranks: BTreeMap<String, Option<u32>>,
}

pub fn attach_rankings(fits: Vec<FitResult>, ranking: &PopulationRanking) -> Vec<RankedFit> {
    fits.into_iter()
        .map(|fit| {
            let ranks = ranking.ranks_for(&fit.player_name).unwrap_or_else(|| {
                ranking.metrics().iter().map(|m| (m.clone(), None)).collect()
            });
            RankedFit { fit, ranks }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Team box-score ranks
// ---------------------------------------------------------------------------

/// Add `<column>_Rank` for each configured box-score column. Columns already
/// carrying a precomputed rank, or absent from the table, are left alone.
pub fn rank_box_scores(table: &mut TendencyTable, config: &TeamRankConfig) {
    let directed = config
        .higher_is_better
        .iter()
        .map(|c| (c, RankDirection::Descending))
        .chain(config.lower_is_better.iter().map(|c| (c, RankDirection::Ascending)));
    for (column, direction) in directed {
        let rank_column = format!("{column}_Rank");
        if table.has_column(&rank_column) || !table.has_column(column) {
            continue;
        }
        let values: Vec<Option<f64>> = table.teams().iter().map(|t| t.season_value(column)).collect();
        let ranks = rank_min(&values, direction)
            .into_iter()
            .map(|r| r.map(f64::from))
            .collect();
        table.insert_column(&rank_column, ranks);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
