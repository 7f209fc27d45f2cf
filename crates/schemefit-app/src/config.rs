// Configuration loading (run.toml, schemes.toml, positions.toml,
// adjustments.toml) from `config/`, seeded from `defaults/` on first run.

use schemefit_core::model::position::Position;
use schemefit_core::EngineConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Files every run needs, in load order.
pub const CONFIG_FILES: [&str; 4] = ["run.toml", "schemes.toml", "positions.toml", "adjustments.toml"];

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error(transparent)]
    Engine(#[from] schemefit_core::config::ConfigError),

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("config/{file} is missing and there is no defaults/{file} to seed it from (base dir {base_dir})")]
    Unseeded {
        file: &'static str,
        base_dir: PathBuf,
    },

    #[error("failed to seed {path} from defaults: {source}")]
    Seed {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory relative data and output paths resolve against.
    pub base_dir: PathBuf,
    pub engine: EngineConfig,
    pub data: DataPaths,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Resolve a configured path against the project directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.output.dir)
    }

    pub fn player_paths(&self, position: Position) -> Option<&PlayerPaths> {
        self.data.players.get(position.key())
    }
}

// ---------------------------------------------------------------------------
// run.toml driver sections
// ---------------------------------------------------------------------------

/// The parts of run.toml the engine ignores.
#[derive(Debug, Clone, Deserialize)]
struct RunFile {
    data: DataPaths,
    #[serde(default)]
    output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataPaths {
    pub team_seasonal: String,
    #[serde(default)]
    pub team_weekly: Option<String>,
    /// Keyed by position (`qb`, `rb`, ...).
    #[serde(default)]
    pub players: BTreeMap<String, PlayerPaths>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayerPaths {
    /// Candidates that get fit scores.
    pub free_agents: String,
    /// Whole-league table the display rankings are computed over.
    #[serde(default)]
    pub population: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate every file under `config/` relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does that first.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<AppConfig, ConfigError> {
    let config_dir = base_dir.join("config");

    let run_text = read_config(&config_dir, "run.toml")?;
    let schemes_text = read_config(&config_dir, "schemes.toml")?;
    let positions_text = read_config(&config_dir, "positions.toml")?;
    let adjustments_text = read_config(&config_dir, "adjustments.toml")?;

    let engine = EngineConfig::from_toml_strs(&run_text, &schemes_text, &positions_text, &adjustments_text)?;

    let run_file: RunFile = toml::from_str(&run_text).map_err(|e| ConfigError::ParseError {
        path: config_dir.join("run.toml"),
        source: e,
    })?;

    let config = AppConfig {
        base_dir: base_dir.to_path_buf(),
        engine,
        data: run_file.data,
        output: run_file.output,
    };

    validate(&config)?;

    Ok(config)
}

/// Make sure `config/` holds every file in `CONFIG_FILES`, copying each
/// missing one from `defaults/`. Files already in `config/` are the user's
/// and stay as they are; anything else in `defaults/` is ignored.
///
/// Returns the names that were seeded, in `CONFIG_FILES` order.
pub fn seed_config_dir(base_dir: &Path) -> Result<Vec<&'static str>, ConfigError> {
    let config_dir = base_dir.join("config");
    let defaults_dir = base_dir.join("defaults");

    let mut seeded = Vec::new();
    for file in CONFIG_FILES {
        let target = config_dir.join(file);
        if target.is_file() {
            continue;
        }
        let source = defaults_dir.join(file);
        if !source.is_file() {
            return Err(ConfigError::Unseeded {
                file,
                base_dir: base_dir.to_path_buf(),
            });
        }
        std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::Seed {
            path: config_dir.clone(),
            source: e,
        })?;
        std::fs::copy(&source, &target).map_err(|e| ConfigError::Seed {
            path: target.clone(),
            source: e,
        })?;
        info!("Seeded {} from defaults", target.display());
        seeded.push(file);
    }
    Ok(seeded)
}

/// Seed `config/` from `defaults/`, then load it.
pub fn load_config(base_dir: &Path) -> Result<AppConfig, ConfigError> {
    seed_config_dir(base_dir)?;
    load_config_from(base_dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_config(config_dir: &Path, file: &str) -> Result<String, ConfigError> {
    let path = config_dir.join(file);
    std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path, source })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    if config.data.team_seasonal.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "data.team_seasonal".into(),
            message: "must not be empty".into(),
        });
    }
    if config.output.dir.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "output.dir".into(),
            message: "must not be empty".into(),
        });
    }
    for (key, paths) in &config.data.players {
        let Some(position) = Position::from_str_pos(key) else {
            return Err(ConfigError::ValidationError {
                field: format!("data.players.{key}"),
                message: "unknown position".into(),
            });
        };
        if !config.engine.positions.contains_key(&position) {
            return Err(ConfigError::ValidationError {
                field: format!("data.players.{key}"),
                message: "no position model is configured for this position".into(),
            });
        }
        if paths.free_agents.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: format!("data.players.{key}.free_agents"),
                message: "must not be empty".into(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
