// Domain records: positions, schemes, player seasons, team tendencies.

pub mod player;
pub mod position;
pub mod scheme;
pub mod team;
