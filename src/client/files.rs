//! Locating and reading descriptor files

use super::{ClientError, Operator, Result};

use serde_json::Value;
use std::{
	collections::BTreeSet,
	fmt, fs,
	path::{Path, PathBuf},
	str::FromStr,
};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileFormat {
	Json,
	Yaml,
	Yml,
}

impl FileFormat {
	pub fn extension(&self) -> &'static str {
		match self {
			Self::Json => "json",
			Self::Yaml => "yaml",
			Self::Yml => "yml",
		}
	}

	pub fn from_path(path: &Path) -> Option<Self> {
		path.extension()
			.and_then(|ext| ext.to_str())
			.and_then(|ext| ext.to_lowercase().parse().ok())
	}

	/// The requested formats, with `yaml` pulling in `yml`
	pub fn expand(formats: &[FileFormat]) -> BTreeSet<FileFormat> {
		let mut expanded = formats.iter().copied().collect::<BTreeSet<_>>();
		if expanded.contains(&Self::Yaml) {
			expanded.insert(Self::Yml);
		}
		expanded
	}
}

impl fmt::Display for FileFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.extension())
	}
}

impl FromStr for FileFormat {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"json" => Ok(Self::Json),
			"yaml" => Ok(Self::Yaml),
			"yml" => Ok(Self::Yml),
			other => Err(format!("unsupported format: {other}")),
		}
	}
}

/// Parse a descriptor file according to its extension.
pub fn load_file(path: &Path) -> Result<Value> {
	let file_error = |message: String| ClientError::File {
		path: path.display().to_string(),
		message,
	};

	let content = fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;

	match FileFormat::from_path(path) {
		Some(FileFormat::Json) => serde_json::from_str(&content).map_err(|e| file_error(e.to_string())),
		Some(FileFormat::Yaml | FileFormat::Yml) => {
			serde_yaml::from_str(&content).map_err(|e| file_error(e.to_string()))
		}
		None => Err(file_error("unknown file format".to_string())),
	}
}

/// Explicit files plus every file below `dirs`, keeping those in `formats`.
///
/// Skipped files are reported to `operator`, once per unmatched extension.
pub async fn collect_files(
	files: &[PathBuf],
	dirs: &[PathBuf],
	formats: &[FileFormat],
	operator: &dyn Operator,
) -> Result<Vec<PathBuf>> {
	let formats = FileFormat::expand(formats);
	let mut candidates = files.to_vec();

	for dir in dirs {
		if !dir.is_dir() {
			return Err(ClientError::File {
				path: dir.display().to_string(),
				message: "not a directory".to_string(),
			});
		}

		let mut walked = WalkDir::new(dir)
			.into_iter()
			.filter_map(|entry| entry.ok())
			.filter(|entry| entry.file_type().is_file())
			.map(|entry| entry.into_path())
			.collect::<Vec<_>>();
		walked.sort();
		candidates.extend(walked);
	}

	let mut reported = BTreeSet::new();
	let mut selected = Vec::with_capacity(candidates.len());

	for path in candidates {
		let extension = path
			.extension()
			.and_then(|ext| ext.to_str())
			.map(str::to_lowercase)
			.unwrap_or_default();

		match extension.parse::<FileFormat>() {
			Ok(format) if formats.contains(&format) => selected.push(path),
			Ok(format) => {
				operator
					.info(&format!("Skipping file: {}", path.display()))
					.await;
				if reported.insert(extension) {
					operator
						.info(&format!(
							"Entities using the file format \"{format}\" can be uploaded by adding the option: --format={format}"
						))
						.await;
				}
			}
			Err(_) => {
				operator
					.info(&format!("Skipping file: {}", path.display()))
					.await;
				if reported.insert(extension.clone()) {
					operator
						.warn(&format!("File format {extension:?} is not supported."))
						.await;
				}
			}
		}
	}

	Ok(selected)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn yaml_pulls_in_yml() {
		let formats = FileFormat::expand(&[FileFormat::Yaml]);
		assert!(formats.contains(&FileFormat::Yml));
		assert!(!formats.contains(&FileFormat::Json));

		let formats = FileFormat::expand(&[FileFormat::Yml]);
		assert!(!formats.contains(&FileFormat::Yaml));
	}

	#[test]
	fn format_from_path() {
		assert_eq!(
			FileFormat::from_path(Path::new("a/b/Entity.JSON")),
			Some(FileFormat::Json)
		);
		assert_eq!(FileFormat::from_path(Path::new("entity.txt")), None);
		assert_eq!(FileFormat::from_path(Path::new("entity")), None);
	}

	#[test]
	fn loads_yaml_and_json() {
		let dir = tempfile::tempdir().unwrap();
		let yaml = dir.path().join("entity.yaml");
		fs::write(&yaml, "name: Person\nversion: '0.1'\n").unwrap();
		let json = dir.path().join("entity.json");
		fs::write(&json, r#"{"name": "Person"}"#).unwrap();

		assert_eq!(load_file(&yaml).unwrap()["version"], "0.1");
		assert_eq!(load_file(&json).unwrap()["name"], "Person");

		let broken = dir.path().join("broken.json");
		fs::write(&broken, "{").unwrap();
		assert!(matches!(load_file(&broken), Err(ClientError::File { .. })));
	}
}
