//! Configuration of the upload tool

use super::FileFormat;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
	fs,
	path::{Path, PathBuf},
};

/// Client configuration stored in the data directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
	/// Registry the tool uploads to
	pub base_url: String,
	pub access_token: Option<String>,
	/// Formats picked up when `--format` is not given
	pub default_formats: Vec<String>,
}

impl Default for CliConfig {
	fn default() -> Self {
		Self {
			base_url: "http://onto-ns.com/meta".to_string(),
			access_token: None,
			default_formats: vec![FileFormat::Json.to_string()],
		}
	}
}

impl CliConfig {
	pub fn config_path(data_dir: &Path) -> PathBuf {
		data_dir.join("cli.json")
	}

	/// Load the config, writing the defaults on first use
	pub fn load(data_dir: &Path) -> Result<Self> {
		let config_path = Self::config_path(data_dir);

		if config_path.exists() {
			let json = fs::read_to_string(&config_path)?;
			Ok(serde_json::from_str(&json)?)
		} else {
			let config = Self::default();
			config.save(data_dir)?;
			Ok(config)
		}
	}

	pub fn save(&self, data_dir: &Path) -> Result<()> {
		fs::create_dir_all(data_dir)?;
		let json = serde_json::to_string_pretty(self)?;
		fs::write(Self::config_path(data_dir), json)?;
		Ok(())
	}

	pub fn set_base_url(&mut self, base_url: String, data_dir: &Path) -> Result<()> {
		self.base_url = base_url.trim_end_matches('/').to_string();
		self.save(data_dir)
	}

	pub fn set_access_token(&mut self, token: String, data_dir: &Path) -> Result<()> {
		self.access_token = Some(token);
		self.save(data_dir)
	}

	/// Configured default formats; unknown entries are ignored.
	pub fn formats(&self) -> Vec<FileFormat> {
		self.default_formats
			.iter()
			.filter_map(|format| format.parse().ok())
			.collect()
	}
}
