// Offensive positions scored by the fit engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Positions with a fit model. Serialized as lowercase keys (`qb`, `ol`, ...)
/// so configuration tables read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "qb")]
    Quarterback,
    #[serde(rename = "rb")]
    RunningBack,
    #[serde(rename = "wr")]
    WideReceiver,
    #[serde(rename = "te")]
    TightEnd,
    #[serde(rename = "ol")]
    OffensiveLine,
}

impl Position {
    pub const ALL: [Position; 5] = [
        Position::Quarterback,
        Position::RunningBack,
        Position::WideReceiver,
        Position::TightEnd,
        Position::OffensiveLine,
    ];

    /// Parse a roster position string.
    ///
    /// Individual line spots ("T", "G", "C", "OT", "OG", "LT", ...) all map to
    /// the offensive line, and "HB"/"FB" map to running back.
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "QB" => Some(Position::Quarterback),
            "RB" | "HB" | "FB" => Some(Position::RunningBack),
            "WR" => Some(Position::WideReceiver),
            "TE" => Some(Position::TightEnd),
            "OL" | "T" | "G" | "C" | "OT" | "OG" | "LT" | "RT" | "LG" | "RG" => {
                Some(Position::OffensiveLine)
            }
            _ => None,
        }
    }

    /// Return the display string for this position.
    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Quarterback => "QB",
            Position::RunningBack => "RB",
            Position::WideReceiver => "WR",
            Position::TightEnd => "TE",
            Position::OffensiveLine => "OL",
        }
    }

    /// Lowercase configuration key, also used in output file names.
    pub fn key(&self) -> &'static str {
        match self {
            Position::Quarterback => "qb",
            Position::RunningBack => "rb",
            Position::WideReceiver => "wr",
            Position::TightEnd => "te",
            Position::OffensiveLine => "ol",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_line_spots_as_offensive_line() {
        for s in ["T", "g", "C", "OL", " lt "] {
            assert_eq!(Position::from_str_pos(s), Some(Position::OffensiveLine), "{s}");
        }
        assert_eq!(Position::from_str_pos("hb"), Some(Position::RunningBack));
        assert_eq!(Position::from_str_pos("K"), None);
    }

    #[test]
    fn key_and_display_agree() {
        for pos in Position::ALL {
            assert_eq!(pos.key().to_uppercase(), pos.display_str());
            assert_eq!(Position::from_str_pos(pos.key()), Some(pos));
        }
    }
}
