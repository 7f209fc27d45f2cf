// The seven offensive scheme identities and per-scheme score vectors.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Offensive play-calling identities, in declaration order. Declaration order
/// is the tie-break for every "highest score" decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    #[serde(rename = "west_coast_mcvay")]
    WestCoastMcVay,
    AirRaid,
    SpreadOption,
    WestCoast,
    RunPower,
    PistolPowerSpread,
    ShanahanWideZone,
}

impl Scheme {
    pub const COUNT: usize = 7;

    pub const ALL: [Scheme; Scheme::COUNT] = [
        Scheme::WestCoastMcVay,
        Scheme::AirRaid,
        Scheme::SpreadOption,
        Scheme::WestCoast,
        Scheme::RunPower,
        Scheme::PistolPowerSpread,
        Scheme::ShanahanWideZone,
    ];

    /// Position in declaration order.
    pub fn index(&self) -> usize {
        match self {
            Scheme::WestCoastMcVay => 0,
            Scheme::AirRaid => 1,
            Scheme::SpreadOption => 2,
            Scheme::WestCoast => 3,
            Scheme::RunPower => 4,
            Scheme::PistolPowerSpread => 5,
            Scheme::ShanahanWideZone => 6,
        }
    }

    /// Configuration / column key (`air_raid`, `west_coast_mcvay`, ...).
    pub fn key(&self) -> &'static str {
        match self {
            Scheme::WestCoastMcVay => "west_coast_mcvay",
            Scheme::AirRaid => "air_raid",
            Scheme::SpreadOption => "spread_option",
            Scheme::WestCoast => "west_coast",
            Scheme::RunPower => "run_power",
            Scheme::PistolPowerSpread => "pistol_power_spread",
            Scheme::ShanahanWideZone => "shanahan_wide_zone",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Scheme::WestCoastMcVay => "West Coast McVay",
            Scheme::AirRaid => "Air Raid",
            Scheme::SpreadOption => "Spread Option",
            Scheme::WestCoast => "West Coast",
            Scheme::RunPower => "Run Power",
            Scheme::PistolPowerSpread => "Pistol Power Spread",
            Scheme::ShanahanWideZone => "Shanahan Wide Zone",
        }
    }

    /// Parse either a key or a display name, case-insensitively.
    pub fn from_str_scheme(s: &str) -> Option<Self> {
        let wanted = s.trim();
        Scheme::ALL.into_iter().find(|scheme| {
            scheme.key().eq_ignore_ascii_case(wanted)
                || scheme.display_name().eq_ignore_ascii_case(wanted)
        })
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ---------------------------------------------------------------------------
// Per-scheme value vector
// ---------------------------------------------------------------------------

/// One value per scheme, indexed by declaration order. Used both for team
/// tendency scores and for a player's raw fit under every scheme.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SchemeScores {
    values: [f64; Scheme::COUNT],
}

impl SchemeScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, scheme: Scheme) -> f64 {
        self.values[scheme.index()]
    }

    pub fn set(&mut self, scheme: Scheme, value: f64) {
        self.values[scheme.index()] = value;
    }

    /// (scheme, value) pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Scheme, f64)> + '_ {
        Scheme::ALL.into_iter().map(move |s| (s, self.get(s)))
    }

    /// The highest-valued scheme; ties go to the earlier declared scheme.
    pub fn best(&self) -> Scheme {
        let mut best = Scheme::ALL[0];
        for scheme in Scheme::ALL.into_iter().skip(1) {
            if self.get(scheme) > self.get(best) {
                best = scheme;
            }
        }
        best
    }
}

impl FromIterator<(Scheme, f64)> for SchemeScores {
    fn from_iter<I: IntoIterator<Item = (Scheme, f64)>>(iter: I) -> Self {
        let mut scores = SchemeScores::new();
        for (scheme, value) in iter {
            scores.set(scheme, value);
        }
        scores
    }
}

impl Serialize for SchemeScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Scheme::COUNT))?;
        for (scheme, value) in self.iter() {
            map.serialize_entry(scheme.key(), &value)?;
        }
        map.end()
    }
}
