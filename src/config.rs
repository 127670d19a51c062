//! Service configuration

use crate::backend::{AuthLevel, BackendKind, BackendSettings, IndexScheme};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
	env, fs,
	path::{Path, PathBuf},
};
use tracing::{info, warn};

const CONFIG_FILE: &str = "service.json";

/// Prefix of the environment variables that override file settings
pub const ENV_PREFIX: &str = "ENTITIES_SERVICE_";

/// Default data directory, `<platform data dir>/entities-service`
pub fn default_data_dir() -> Result<PathBuf> {
	dirs::data_dir()
		.map(|dir| dir.join("entities-service"))
		.ok_or_else(|| anyhow!("Could not determine a data directory"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
	/// Directory holding this file and, by default, the database
	#[serde(skip)]
	pub data_dir: PathBuf,

	pub backend: BackendKind,

	/// Database file. Relative paths are resolved against the data directory.
	pub database_path: PathBuf,

	pub index_scheme: IndexScheme,

	/// How many identities an error message lists before summarizing
	pub max_entities_in_errors: usize,

	/// Namespace prefix all entities must live under
	pub base_url: String,

	pub log_level: String,

	pub debug: bool,

	/// Token that grants every capability. For tests and local setups only.
	pub test_token: Option<String>,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			data_dir: PathBuf::from("."),
			backend: BackendKind::default(),
			database_path: PathBuf::from("entities.db"),
			index_scheme: IndexScheme::default(),
			max_entities_in_errors: 10,
			base_url: "http://onto-ns.com/meta".to_string(),
			log_level: "info".to_string(),
			debug: false,
			test_token: None,
		}
	}
}

impl ServiceConfig {
	pub fn config_path(data_dir: &Path) -> PathBuf {
		data_dir.join(CONFIG_FILE)
	}

	pub fn default_with_dir(data_dir: PathBuf) -> Self {
		Self {
			data_dir,
			..Default::default()
		}
	}

	/// Load from `data_dir`, writing defaults if there is no config yet, then
	/// apply environment overrides.
	pub fn load_from(data_dir: &Path) -> Result<Self> {
		let config_path = Self::config_path(data_dir);

		let mut config = if config_path.exists() {
			info!("Loading config from {:?}", config_path);
			let json = fs::read_to_string(&config_path)
				.with_context(|| format!("Failed to read {}", config_path.display()))?;
			let mut config: ServiceConfig = serde_json::from_str(&json)
				.with_context(|| format!("Invalid config in {}", config_path.display()))?;
			config.data_dir = data_dir.to_path_buf();
			config
		} else {
			warn!("No config found, creating default at {:?}", config_path);
			let config = Self::default_with_dir(data_dir.to_path_buf());
			config.save()?;
			config
		};

		config.apply_overrides(env::vars())?;
		Ok(config)
	}

	pub fn save(&self) -> Result<()> {
		fs::create_dir_all(&self.data_dir)?;

		let config_path = Self::config_path(&self.data_dir);
		let json = serde_json::to_string_pretty(self)?;
		fs::write(&config_path, json)?;
		info!("Saved config to {:?}", config_path);
		Ok(())
	}

	/// Apply `ENTITIES_SERVICE_*` variables from `vars`.
	pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
	where
		I: IntoIterator<Item = (String, String)>,
	{
		for (key, value) in vars {
			let Some(field) = key.strip_prefix(ENV_PREFIX) else {
				continue;
			};

			match field.to_ascii_lowercase().as_str() {
				"database_path" => self.database_path = PathBuf::from(value),
				"base_url" => self.base_url = value,
				"log_level" => self.log_level = value,
				"test_token" => self.test_token = Some(value),
				"max_entities_in_errors" => {
					self.max_entities_in_errors = value
						.parse()
						.with_context(|| format!("{key} must be a positive integer"))?
				}
				"debug" => self.debug = matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
				"index_scheme" => {
					self.index_scheme = serde_json::from_value(serde_json::Value::String(value))
						.with_context(|| format!("{key} must be `identity` or `legacy`"))?
				}
				"backend" => {
					self.backend = serde_json::from_value(serde_json::Value::String(value))
						.with_context(|| format!("{key} names an unknown backend"))?
				}
				// Read by the command line before any config is loaded
				"data_dir" => {}
				_ => warn!(%key, "Ignoring unknown configuration variable"),
			}
		}

		Ok(())
	}

	pub fn database_file(&self) -> PathBuf {
		if self.database_path.is_absolute() {
			self.database_path.clone()
		} else {
			self.data_dir.join(&self.database_path)
		}
	}

	pub fn backend_settings(&self, auth_level: AuthLevel) -> BackendSettings {
		BackendSettings {
			kind: self.backend,
			auth_level,
			index_scheme: self.index_scheme,
			max_entities_in_errors: self.max_entities_in_errors,
			base_url: Some(self.base_url.clone()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn creates_defaults_on_first_load() {
		let temp = TempDir::new().unwrap();

		let config = ServiceConfig::load_from(temp.path()).unwrap();
		assert!(ServiceConfig::config_path(temp.path()).exists());
		assert_eq!(config.max_entities_in_errors, 10);
		assert_eq!(config.database_file(), temp.path().join("entities.db"));
	}

	#[test]
	fn reloads_saved_values() {
		let temp = TempDir::new().unwrap();

		let mut config = ServiceConfig::default_with_dir(temp.path().to_path_buf());
		config.index_scheme = IndexScheme::Legacy;
		config.max_entities_in_errors = 3;
		config.save().unwrap();

		let loaded = ServiceConfig::load_from(temp.path()).unwrap();
		assert_eq!(loaded.index_scheme, IndexScheme::Legacy);
		assert_eq!(loaded.max_entities_in_errors, 3);
	}

	#[test]
	fn environment_overrides() {
		let mut config = ServiceConfig::default();
		config
			.apply_overrides([
				("ENTITIES_SERVICE_MAX_ENTITIES_IN_ERRORS".to_string(), "4".to_string()),
				("ENTITIES_SERVICE_INDEX_SCHEME".to_string(), "legacy".to_string()),
				("ENTITIES_SERVICE_TEST_TOKEN".to_string(), "secret".to_string()),
				("PATH".to_string(), "/bin".to_string()),
			])
			.unwrap();

		assert_eq!(config.max_entities_in_errors, 4);
		assert_eq!(config.index_scheme, IndexScheme::Legacy);
		assert_eq!(config.test_token.as_deref(), Some("secret"));

		let bad = config.apply_overrides([(
			"ENTITIES_SERVICE_MAX_ENTITIES_IN_ERRORS".to_string(),
			"many".to_string(),
		)]);
		assert!(bad.is_err());
	}
}
