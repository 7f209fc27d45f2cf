// Library root: scheme classification and fit scoring. Performs no I/O;
// callers hand in already-loaded tables and configuration.

pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod scoring;

pub use config::{EngineConfig, RunSettings};
pub use context::{rank_position, RunContext};
pub use error::{Batch, FitError};
pub use scoring::combine::{compute_fits, FitResult, TeamProfile};
pub use scoring::tendency::{compute_team_schemes, SchemeScore};
