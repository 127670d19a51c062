//! Uploading local descriptors, negotiating versions for changed ones

use super::{files, ClientError, Operator, RegistryClient, Result};
use crate::{
	identity,
	models::{Document, EntityDescriptor, Resolver},
};

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};
use tracing::{debug, info};

/// The version offered when a changed descriptor is uploaded again.
///
/// `X` becomes `X.1`, `X.Y` becomes `X.Y.1` and `X.Y.Z` becomes `X.Y.(Z+1)`.
pub fn suggest_next_version(current: &str) -> Result<String> {
	if !identity::is_valid_version(current) {
		return Err(ClientError::InvalidVersion(current.to_string()));
	}

	let mut parts = current.split('.').collect::<Vec<_>>();
	match parts.len() {
		1 | 2 => Ok(format!("{current}.1")),
		_ => {
			let last = parts
				.pop()
				.and_then(|part| part.parse::<u64>().ok())
				.ok_or_else(|| ClientError::InvalidVersion(current.to_string()))?;
			Ok(format!("{}.{}", parts.join("."), last + 1))
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRejection {
	SameAsExisting,
	InvalidFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionDecision {
	Accepted(String),
	Rejected(VersionRejection),
}

/// Check the version an operator chose against the stored one
pub fn decide_next_version(current: &str, proposed: &str) -> VersionDecision {
	let proposed = proposed.trim();

	if proposed == current {
		VersionDecision::Rejected(VersionRejection::SameAsExisting)
	} else if !identity::is_valid_version(proposed) {
		VersionDecision::Rejected(VersionRejection::InvalidFormat)
	} else {
		VersionDecision::Accepted(proposed.to_string())
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOptions {
	/// Stop at the first file that fails instead of moving on
	pub fail_fast: bool,
}

/// Files by outcome
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadSummary {
	pub uploaded: Vec<PathBuf>,
	pub skipped: Vec<PathBuf>,
	pub failed: Vec<PathBuf>,
}

impl UploadSummary {
	pub fn is_success(&self) -> bool {
		self.failed.is_empty()
	}
}

enum Outcome {
	Submit(EntityDescriptor),
	Skip,
	Fail(String),
}

pub struct Uploader {
	client: Arc<dyn RegistryClient>,
	operator: Arc<dyn Operator>,
	resolver: Resolver,
	options: UploadOptions,
}

impl Uploader {
	pub fn new(client: Arc<dyn RegistryClient>, operator: Arc<dyn Operator>) -> Self {
		Self {
			client,
			operator,
			resolver: Resolver::default(),
			options: UploadOptions::default(),
		}
	}

	pub fn with_options(mut self, options: UploadOptions) -> Self {
		self.options = options;
		self
	}

	/// Validate, compare and submit `paths`. Files are handled one at a time
	/// and every accepted descriptor goes out in a single create call.
	pub async fn upload(&self, paths: &[PathBuf]) -> Result<UploadSummary> {
		let mut summary = UploadSummary::default();
		let mut batch = Vec::new();

		for path in paths {
			match self.process(path).await {
				Ok(Outcome::Submit(entity)) => batch.push((path.clone(), entity)),
				Ok(Outcome::Skip) => summary.skipped.push(path.clone()),
				Ok(Outcome::Fail(reason)) => self.record_failure(path, reason, &mut summary).await?,
				Err(e) => self.record_failure(path, e.to_string(), &mut summary).await?,
			}
		}

		if batch.is_empty() {
			return Ok(summary);
		}

		let (paths, entities): (Vec<_>, Vec<_>) = batch.into_iter().unzip();
		let documents = entities.iter().map(EntityDescriptor::to_wire).collect();

		match self.client.create(documents).await {
			Ok(()) => {
				info!(count = paths.len(), "Uploaded entities");
				summary.uploaded.extend(paths);
			}
			Err(e) => {
				self.operator.error(&e.to_string()).await;
				summary.failed.extend(paths);
			}
		}

		Ok(summary)
	}

	async fn record_failure(&self, path: &Path, reason: String, summary: &mut UploadSummary) -> Result<()> {
		if self.options.fail_fast {
			return Err(ClientError::Aborted {
				path: path.display().to_string(),
				reason,
			});
		}

		self.operator
			.error(&format!("Failed to upload {}: {reason}", path.display()))
			.await;
		summary.failed.push(path.to_path_buf());
		Ok(())
	}

	async fn process(&self, path: &Path) -> Result<Outcome> {
		let raw = files::load_file(path)?;
		let entity = match self.resolver.resolve(&raw) {
			Ok(entity) => entity,
			Err(errors) => return Ok(Outcome::Fail(format!("not a valid entity:\n{errors}"))),
		};

		let uri = match entity.identity() {
			Ok(id) => id.to_uri(),
			Err(e) => return Ok(Outcome::Fail(e.to_string())),
		};

		let Some(existing) = self.client.fetch(&uri).await? else {
			debug!(%uri, "Entity is new");
			return Ok(Outcome::Submit(entity));
		};

		let unchanged = self
			.resolver
			.resolve_document(&existing)
			.map(|stored| stored.same_content(&entity))
			.unwrap_or(false);

		if unchanged {
			self.operator
				.info(&format!(
					"Skipping file: {} (entity {uri} already exists in the registry)",
					path.display()
				))
				.await;
			return Ok(Outcome::Skip);
		}

		let pretty = |doc: &Document| serde_json::to_string_pretty(doc).unwrap_or_default();
		self.operator
			.show_difference(&uri, &pretty(&existing), &pretty(&entity.to_document()))
			.await;

		if !self.operator.confirm_new_version(&uri).await? {
			self.operator
				.info(&format!("Skipping file: {}", path.display()))
				.await;
			return Ok(Outcome::Skip);
		}

		let current = entity.version()?;
		let suggested = suggest_next_version(&current)?;
		let Some(proposed) = self.operator.prompt_version(&current, &suggested).await? else {
			self.operator
				.info(&format!("Skipping file: {}", path.display()))
				.await;
			return Ok(Outcome::Skip);
		};

		match decide_next_version(&current, &proposed) {
			VersionDecision::Accepted(version) => Ok(Outcome::Submit(entity.with_version(&version)?)),
			VersionDecision::Rejected(VersionRejection::SameAsExisting) => Ok(Outcome::Fail(format!(
				"the new version {proposed:?} is the same as existing version"
			))),
			VersionDecision::Rejected(VersionRejection::InvalidFormat) => Ok(Outcome::Fail(format!(
				"the new version {proposed:?} is not a valid version"
			))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn suggested_versions() {
		assert_eq!(suggest_next_version("1").unwrap(), "1.1");
		assert_eq!(suggest_next_version("1.1").unwrap(), "1.1.1");
		assert_eq!(suggest_next_version("1.1.1").unwrap(), "1.1.2");
		assert_eq!(suggest_next_version("0.2.9").unwrap(), "0.2.10");
		assert!(suggest_next_version("v1").is_err());
	}

	#[test]
	fn proposed_versions() {
		assert_eq!(
			decide_next_version("1.1", "1.1"),
			VersionDecision::Rejected(VersionRejection::SameAsExisting)
		);
		assert_eq!(
			decide_next_version("1.1", "1.1.1.1"),
			VersionDecision::Rejected(VersionRejection::InvalidFormat)
		);
		assert_eq!(
			decide_next_version("1.1", "one"),
			VersionDecision::Rejected(VersionRejection::InvalidFormat)
		);
		assert_eq!(
			decide_next_version("1.1", " 2.0 "),
			VersionDecision::Accepted("2.0".to_string())
		);
	}
}
