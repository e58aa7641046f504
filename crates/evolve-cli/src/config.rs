//! Configuration file handling for evolve.
//!
//! Looks for `.config/evolve.styx` in the current directory or any parent directory.

use facet::Facet;
use std::path::{Path, PathBuf};

pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
pub const DEFAULT_LOCK_NAME: &str = "evolve";

/// Configuration loaded from `.config/evolve.styx`.
#[derive(Debug, Clone, Default, Facet)]
pub struct Config {
    /// Database connection URL. `DATABASE_URL` is used when absent.
    #[facet(default)]
    pub database_url: Option<String>,

    /// Directory holding version records, relative to the project root.
    #[facet(default)]
    pub migrations_dir: Option<String>,

    /// Name of the advisory lock taken while migrating.
    #[facet(default)]
    pub lock_name: Option<String>,
}

/// A loaded config and the directory it applies to.
#[derive(Debug, Clone)]
pub struct Project {
    pub config: Config,
    /// The directory containing `.config/`, or the working directory when
    /// there is no config file.
    pub root: PathBuf,
}

impl Project {
    pub fn migrations_dir(&self) -> PathBuf {
        self.root.join(
            self.config
                .migrations_dir
                .as_deref()
                .unwrap_or(DEFAULT_MIGRATIONS_DIR),
        )
    }

    pub fn lock_name(&self) -> &str {
        self.config.lock_name.as_deref().unwrap_or(DEFAULT_LOCK_NAME)
    }

    /// The flag wins over the config file, which wins over `DATABASE_URL`.
    pub fn database_url(&self, flag: Option<String>) -> Option<String> {
        flag.or_else(|| self.config.database_url.clone())
            .or_else(|| std::env::var("DATABASE_URL").ok())
    }
}

/// Load the project configuration, searching up from the working directory.
pub fn load() -> Result<Project, ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(e.to_string()))?;
    load_from(&cwd)
}

/// Load the project configuration starting from a specific directory.
///
/// A missing config file is not an error: every setting has a default.
pub fn load_from(start: &Path) -> Result<Project, ConfigError> {
    let Some(config_path) = find_config_file(start) else {
        return Ok(Project {
            config: Config::default(),
            root: start.to_path_buf(),
        });
    };
    let content =
        std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Io(e.to_string()))?;
    let config: Config =
        facet_styx::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    // .config/evolve.styx -> project root
    let root = config_path
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| start.to_path_buf());
    Ok(Project { config, root })
}

fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let config_path = current.join(".config/evolve.styx");
        if config_path.exists() {
            return Some(config_path);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read .config/evolve.styx: {0}")]
    Io(String),
    #[error("failed to parse .config/evolve.styx: {0}")]
    Parse(String),
}
