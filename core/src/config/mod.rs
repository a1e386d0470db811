//! Application configuration
//!
//! Versioned JSON config file in the data directory. Older versions are
//! migrated forward on load and written back.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const CONFIG_FILE: &str = "tagfs.json";
const CURRENT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Malformed config: {0}")]
	Serde(#[from] serde_json::Error),

	#[error("No home directory available to place the data directory in")]
	NoHomeDir,

	#[error("Config version {0} is newer than this build understands ({CURRENT_VERSION})")]
	VersionFromTheFuture(u32),
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	/// Config schema version.
	pub version: u32,

	/// Where the database and logs live.
	pub data_dir: PathBuf,

	/// Root of the generated symlink tree.
	pub projection_root: PathBuf,

	/// Directories watched for auto-import.
	pub import_roots: Vec<PathBuf>,

	/// Glob patterns skipped during import, in addition to hidden paths.
	pub ignore_patterns: Vec<String>,

	/// Watcher coalescing window in milliseconds.
	pub debounce_ms: u64,

	/// Whether query terms resolve fuzzily by default.
	pub fuzzy: bool,

	/// Fuzzy scores at or below this are treated as "no such tag".
	pub fuzzy_threshold: f64,
}

impl Config {
	/// Load from the default data directory, creating a default config on
	/// first run.
	pub fn load() -> Result<Self, ConfigError> {
		Self::load_from(&default_data_dir()?)
	}

	/// Load from a specific data directory.
	pub fn load_from(data_dir: &Path) -> Result<Self, ConfigError> {
		let config_path = data_dir.join(CONFIG_FILE);

		if config_path.exists() {
			let json = fs::read_to_string(&config_path)?;
			let mut config: Config = serde_json::from_str(&json)?;

			if config.version > CURRENT_VERSION {
				return Err(ConfigError::VersionFromTheFuture(config.version));
			}
			if config.version < CURRENT_VERSION {
				info!(
					from = config.version,
					to = CURRENT_VERSION,
					"Migrating config"
				);
				config.migrate();
				config.save()?;
			}

			Ok(config)
		} else {
			warn!(path = %config_path.display(), "No config found, creating default");
			let config = Self::default_with_dir(data_dir.to_path_buf());
			config.save()?;
			Ok(config)
		}
	}

	pub fn default_with_dir(data_dir: PathBuf) -> Self {
		let projection_root = dirs::home_dir()
			.unwrap_or_else(|| data_dir.clone())
			.join("TagFS");

		Self {
			version: CURRENT_VERSION,
			data_dir,
			projection_root,
			import_roots: Vec::new(),
			ignore_patterns: vec!["node_modules".to_string(), "__pycache__".to_string()],
			debounce_ms: 100,
			fuzzy: true,
			fuzzy_threshold: 0.0,
		}
	}

	pub fn save(&self) -> Result<(), ConfigError> {
		fs::create_dir_all(&self.data_dir)?;
		let json = serde_json::to_string_pretty(self)?;
		fs::write(self.data_dir.join(CONFIG_FILE), json)?;
		Ok(())
	}

	pub fn db_path(&self) -> PathBuf {
		self.data_dir.join("tagfs.db")
	}

	pub fn log_dir(&self) -> PathBuf {
		self.data_dir.join("logs")
	}

	/// Bring an older config up to the current version, one step at a time.
	fn migrate(&mut self) {
		// v1 is the first shipped version; future steps go here.
		self.version = CURRENT_VERSION;
	}
}

/// `~/.config/tagfs` (or the platform equivalent).
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
	dirs::config_dir()
		.map(|dir| dir.join("tagfs"))
		.ok_or(ConfigError::NoHomeDir)
}
