// Configuration loading and parsing (config/ladder.toml).

use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::reconcile::UntaggedPolicy;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    /// Resolved path to the SQLite database.
    pub db_path: String,
    pub reconcile: ReconcileConfig,
    pub submission: SubmissionConfig,
    pub history: HistoryConfig,
}

// ---------------------------------------------------------------------------
// ladder.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire ladder.toml file.
#[derive(Debug, Clone, Deserialize)]
struct LadderFile {
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    reconcile: ReconcileConfig,
    #[serde(default)]
    submission: SubmissionConfig,
    #[serde(default)]
    history: HistoryConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DatabaseSection {
    /// Relative paths resolve against the directory holding `config/`. When
    /// omitted, the database lives in the platform data directory.
    path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub untagged_policy: UntaggedPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    /// How many times a submission is recomputed after a write conflict
    /// before giving up.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

fn default_max_conflict_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            display_limit: default_display_limit(),
        }
    }
}

fn default_display_limit() -> usize {
    200
}

const DB_FILE_NAME: &str = "tagladder.db";
const MAX_CONFLICT_RETRIES: u32 = 20;

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/ladder.toml` relative to
/// `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// `load_config_at` seeds missing files first.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("ladder.toml");
    let text = read_file(&path)?;
    let file: LadderFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let db_path = match file.database.path {
        Some(p) if p.trim().is_empty() => {
            return Err(ConfigError::ValidationError {
                field: "database.path".into(),
                message: "must not be empty".into(),
            });
        }
        Some(p) if p == ":memory:" || Path::new(&p).is_absolute() => p,
        Some(p) => base_dir.join(p).to_string_lossy().into_owned(),
        None => default_db_path().to_string_lossy().into_owned(),
    };

    let config = Config {
        db_path,
        reconcile: file.reconcile,
        submission: file.submission,
        history: file.history,
    };

    validate(&config)?;

    Ok(config)
}

/// Platform data directory location for the database, falling back to the
/// working directory when the platform offers none.
pub fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "tagladder")
        .map(|dirs| dirs.data_dir().join(DB_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DB_FILE_NAME))
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        let Some(file_name) = path.file_name().filter(|_| path.is_file()) else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }

        let target = config_dir.join(file_name);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                dest.write_all(&content)
                    .map_err(|e| ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    })?;
                copied.push(target);
            }
            // A user's copy, possibly created a moment ago, always wins.
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Seed `config/` under `base_dir` from `defaults/` where files are missing,
/// then load it.
pub fn load_config_at(base_dir: &Path) -> Result<Config, ConfigError> {
    let copied = ensure_config_files(base_dir)?;
    for path in &copied {
        info!("Created {} from defaults", path.display());
    }
    load_config_from(base_dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.history.display_limit == 0 {
        return Err(ConfigError::ValidationError {
            field: "history.display_limit".into(),
            message: "must be greater than 0".into(),
        });
    }

    let retries = config.submission.max_conflict_retries;
    if retries > MAX_CONFLICT_RETRIES {
        return Err(ConfigError::ValidationError {
            field: "submission.max_conflict_retries".into(),
            message: format!("must be at most {MAX_CONFLICT_RETRIES}, got {retries}"),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
