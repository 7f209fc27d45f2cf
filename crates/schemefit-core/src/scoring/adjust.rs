// Bonus and penalty rules applied after the scheme-weighted combination.
//
// Rules are an ordered list per position. Each rule sees the running total of
// the adjustments before it, which is what makes `cap_total` order-sensitive.

use crate::config::{ConfigError, RunSettings};
use crate::error::{ensure_finite, FitError};
use crate::model::scheme::Scheme;
use crate::scoring::combine::TeamProfile;
use crate::scoring::normalize::{NormalizedFeatureRow, NormalizedTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Rule definitions
// ---------------------------------------------------------------------------

/// One named adjustment. `when_schemes`, if non-empty, restricts the rule to
/// teams whose weight set includes at least one of the listed schemes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdjustmentRule {
    pub name: String,
    #[serde(default)]
    pub when_schemes: Vec<Scheme>,
    #[serde(flatten)]
    pub kind: AdjustmentKind,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// `-penalty` when the player appeared in fewer than `min_games`.
    LowSample { min_games: u32, penalty: f64 },
    /// Each met threshold adds its bonus; the sum is capped.
    Volume {
        thresholds: Vec<VolumeThreshold>,
        #[serde(default)]
        cap: Option<f64>,
    },
    /// `bonus` when `stat` is strictly above `above`.
    Efficiency { stat: String, above: f64, bonus: f64 },
    /// Quarterback scrambling value in mobility schemes.
    Rushing(RushingBonus),
    /// `-(flat + (age - threshold) * per_year)` above the threshold.
    Age {
        threshold: f64,
        #[serde(default)]
        per_year: f64,
        #[serde(default)]
        flat: f64,
    },
    /// `-(current_season - season) * per_season`.
    Recency { per_season: f64 },
    /// Team box-score rank tiers.
    TeamNeed(TeamNeedRule),
    /// Clamp the adjustments accumulated so far to at most `max`.
    CapTotal { max: f64 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VolumeThreshold {
    pub stat: String,
    pub min: f64,
    pub bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RushingBonus {
    pub carries_stat: String,
    pub yards_stat: String,
    /// Players with fewer games get nothing.
    pub min_games: u32,
    pub min_carries_per_game: f64,
    pub base: f64,
    /// Carries per game beyond this add no further value.
    pub volume_ceiling: f64,
    pub ypc_baseline: f64,
    pub scale: f64,
    pub cap: f64,
}

impl RushingBonus {
    /// `base + scale * (min(cpg, ceiling) - min_cpg) * max(0, ypc - baseline)`,
    /// capped, once the player averages `min_carries_per_game`.
    pub fn amount(&self, carries: f64, yards: f64, games: u32) -> f64 {
        if games == 0 || games < self.min_games || carries <= 0.0 {
            return 0.0;
        }
        let carries_per_game = carries / games as f64;
        if carries_per_game < self.min_carries_per_game {
            return 0.0;
        }
        let ypc = yards / carries;
        let bonus = self.base
            + self.scale
                * (carries_per_game.min(self.volume_ceiling) - self.min_carries_per_game)
                * (ypc - self.ypc_baseline).max(0.0);
        bonus.min(self.cap)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NeedTier {
    /// Tier applies when the average rank is at least this.
    pub min_avg_rank: f64,
    pub bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TeamNeedRule {
    /// Box-score rank columns averaged for this position (`PassingYds_Rank`, ...).
    pub rank_columns: Vec<String>,
    /// Ordered from the worst ranks down.
    pub tiers: Vec<NeedTier>,
    /// Bonus when no tier matches (the team is already strong here).
    pub fallback: f64,
    /// Fixed adjustment per team abbreviation, used instead of the tiers.
    #[serde(default)]
    pub exceptions: BTreeMap<String, f64>,
}

impl TeamNeedRule {
    pub fn tier_bonus(&self, average_rank: f64) -> f64 {
        self.tiers
            .iter()
            .find(|t| average_rank >= t.min_avg_rank)
            .map(|t| t.bonus)
            .unwrap_or(self.fallback)
    }

    pub fn exception_for(&self, team: &str) -> Option<f64> {
        self.exceptions
            .iter()
            .find(|(abbr, _)| abbr.eq_ignore_ascii_case(team))
            .map(|(_, v)| *v)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Everything a rule may read for one (team, player) pair.
pub struct AdjustmentContext<'a> {
    pub table: &'a NormalizedTable,
    pub row: &'a NormalizedFeatureRow,
    pub team: &'a TeamProfile,
    pub settings: &'a RunSettings,
}

impl AdjustmentContext<'_> {
    /// Imputed natural-unit value of a feature column.
    fn stat(&self, column: &str) -> Result<f64, FitError> {
        self.table.value_of(self.row, column).ok_or_else(|| {
            FitError::configuration(
                format!("adjustments.{}", self.table.position().key()),
                format!("stat `{column}` is not a normalized feature"),
            )
        })
    }
}

/// An adjustment as it was applied to one fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedAdjustment {
    pub name: String,
    pub amount: f64,
}

impl AdjustmentRule {
    /// Whether the rule is in play for this team's scheme mix.
    pub fn applies_to(&self, team: &TeamProfile) -> bool {
        self.when_schemes.is_empty() || team.weights.contains_any(&self.when_schemes)
    }

    /// The amount this rule adds given the adjustments accumulated so far.
    pub fn evaluate(&self, ctx: &AdjustmentContext<'_>, running_total: f64) -> Result<f64, FitError> {
        let amount = match &self.kind {
            AdjustmentKind::LowSample { min_games, penalty } => {
                if ctx.row.games < *min_games {
                    -penalty
                } else {
                    0.0
                }
            }
            AdjustmentKind::Volume { thresholds, cap } => {
                let mut bonus = 0.0;
                for t in thresholds {
                    if ctx.stat(&t.stat)? >= t.min {
                        bonus += t.bonus;
                    }
                }
                match cap {
                    Some(cap) => bonus.min(*cap),
                    None => bonus,
                }
            }
            AdjustmentKind::Efficiency { stat, above, bonus } => {
                if ctx.stat(stat)? > *above {
                    *bonus
                } else {
                    0.0
                }
            }
            AdjustmentKind::Rushing(rule) => rule.amount(
                ctx.stat(&rule.carries_stat)?,
                ctx.stat(&rule.yards_stat)?,
                ctx.row.games,
            ),
            AdjustmentKind::Age {
                threshold,
                per_year,
                flat,
            } => match ctx.row.age {
                Some(age) if age > *threshold => -(flat + (age - threshold) * per_year),
                _ => 0.0,
            },
            AdjustmentKind::Recency { per_season } => {
                let distance = (ctx.settings.current_season - ctx.row.season).max(0);
                -(distance as f64 * per_season)
            }
            AdjustmentKind::TeamNeed(rule) => need_bonus(rule, ctx.team)?,
            AdjustmentKind::CapTotal { max } => running_total.min(*max) - running_total,
        };
        ensure_finite(amount, &ctx.row.player_name, &format!("adjustment `{}`", self.name))
    }

    /// Check the rule against the position's feature list.
    pub fn validate(&self, features: &[String], field: &str) -> Result<(), ConfigError> {
        let require = |stat: &str, sub: &str| -> Result<(), ConfigError> {
            if features.iter().any(|f| f == stat) {
                Ok(())
            } else {
                Err(ConfigError::Validation {
                    field: format!("{field}.{sub}"),
                    message: format!("`{stat}` is not a declared feature of this position"),
                })
            }
        };
        let invalid = |sub: &str, message: String| ConfigError::Validation {
            field: format!("{field}.{sub}"),
            message,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name", "must not be empty".into()));
        }
        match &self.kind {
            AdjustmentKind::LowSample { penalty, .. } => {
                if *penalty < 0.0 {
                    return Err(invalid("penalty", format!("must be >= 0, got {penalty}")));
                }
            }
            AdjustmentKind::Volume { thresholds, cap } => {
                if thresholds.is_empty() {
                    return Err(invalid("thresholds", "must not be empty".into()));
                }
                for (i, t) in thresholds.iter().enumerate() {
                    require(&t.stat, &format!("thresholds[{i}].stat"))?;
                }
                if let Some(cap) = cap {
                    if *cap < 0.0 {
                        return Err(invalid("cap", format!("must be >= 0, got {cap}")));
                    }
                }
            }
            AdjustmentKind::Efficiency { stat, .. } => require(stat, "stat")?,
            AdjustmentKind::Rushing(rule) => {
                require(&rule.carries_stat, "carries_stat")?;
                require(&rule.yards_stat, "yards_stat")?;
                if rule.volume_ceiling < rule.min_carries_per_game {
                    return Err(invalid(
                        "volume_ceiling",
                        format!(
                            "must be >= min_carries_per_game ({}), got {}",
                            rule.min_carries_per_game, rule.volume_ceiling
                        ),
                    ));
                }
            }
            AdjustmentKind::Age { per_year, flat, .. } => {
                if *per_year < 0.0 || *flat < 0.0 {
                    return Err(invalid("per_year", "age penalties must be >= 0".into()));
                }
            }
            AdjustmentKind::Recency { per_season } => {
                if *per_season < 0.0 {
                    return Err(invalid("per_season", format!("must be >= 0, got {per_season}")));
                }
            }
            AdjustmentKind::TeamNeed(rule) => {
                if rule.rank_columns.is_empty() {
                    return Err(invalid("rank_columns", "must not be empty".into()));
                }
                for pair in rule.tiers.windows(2) {
                    if pair[1].min_avg_rank >= pair[0].min_avg_rank {
                        return Err(invalid(
                            "tiers",
                            "min_avg_rank must strictly decrease from tier to tier".into(),
                        ));
                    }
                }
            }
            AdjustmentKind::CapTotal { max } => {
                if !max.is_finite() {
                    return Err(invalid("max", format!("must be finite, got {max}")));
                }
            }
        }
        Ok(())
    }
}

fn need_bonus(rule: &TeamNeedRule, team: &TeamProfile) -> Result<f64, FitError> {
    if let Some(fixed) = rule.exception_for(team.team()) {
        return Ok(fixed);
    }
    let mut sum = 0.0;
    for column in &rule.rank_columns {
        sum += team.rank(column).ok_or_else(|| {
            FitError::data_quality(team.team(), format!("box-score rank `{column}` is null"))
        })?;
    }
    // rank_columns is validated non-empty
    let average = sum / rule.rank_columns.len() as f64;
    Ok(rule.tier_bonus(average))
}

/// Apply the rules in order, returning the total adjustment and each rule's
/// contribution. Rules gated out by scheme are not reported.
pub fn apply_adjustments(
    rules: &[AdjustmentRule],
    ctx: &AdjustmentContext<'_>,
) -> Result<(f64, Vec<AppliedAdjustment>), FitError> {
    let mut total = 0.0;
    let mut applied = Vec::with_capacity(rules.len());
    for rule in rules {
        if !rule.applies_to(ctx.team) {
            continue;
        }
        let amount = rule.evaluate(ctx, total)?;
        total += amount;
        applied.push(AppliedAdjustment {
            name: rule.name.clone(),
            amount,
        });
    }
    Ok((total, applied))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
