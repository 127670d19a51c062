//! Client side: talking to a registry and uploading local descriptor files.

mod config;
mod files;
mod http;
mod operator;
mod upload;

pub use config::CliConfig;
pub use files::{collect_files, load_file, FileFormat};
pub use http::HttpRegistryClient;
pub use operator::{ConsoleOperator, Operator};
pub use upload::{
	decide_next_version, suggest_next_version, UploadOptions, UploadSummary, Uploader, VersionDecision,
	VersionRejection,
};

use crate::{
	backend::{Backend, BackendError, EntityInput},
	identity::{self, IdentityError},
	models::{self, Document},
};

use async_trait::async_trait;
use serde_json::Value;
use std::{fmt, sync::Arc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	/// The registry answered with an unsuccessful status
	#[error("HTTP status code {status}: {message}")]
	Status { status: u16, message: String },

	#[error("not logged in: {0}")]
	Unauthorized(String),

	/// The registry refused or failed to store entities
	#[error("{0}")]
	WriteAccess(String),

	/// The registry rejected the entities themselves, e.g. as duplicates
	#[error("{0}")]
	Rejected(String),

	#[error("invalid response: {0}")]
	InvalidResponse(String),

	#[error("could not read {path}: {message}")]
	File { path: String, message: String },

	#[error("interaction failed: {0}")]
	Interaction(String),

	#[error(transparent)]
	Identity(#[from] IdentityError),

	#[error("invalid version {0:?}")]
	InvalidVersion(String),

	/// Fail-fast upload stopped at the first failed file
	#[error("upload aborted at {path}: {reason}")]
	Aborted { path: String, reason: String },
}

/// The registry as seen from an uploading client
#[async_trait]
pub trait RegistryClient: Send + Sync {
	/// The stored descriptor, or `None` if the registry does not know it.
	async fn fetch(&self, identity: &str) -> Result<Option<Document>>;

	/// Store all of `batch` in one call.
	async fn create(&self, batch: Vec<Document>) -> Result<()>;

	/// Fails unless the configured credentials allow writes.
	async fn check_login(&self) -> Result<()>;
}

/// Talks to a backend directly, for local stores.
pub struct BackendRegistryClient {
	backend: Arc<dyn Backend>,
	max_entities_in_errors: usize,
}

impl BackendRegistryClient {
	pub fn new(backend: Arc<dyn Backend>, max_entities_in_errors: usize) -> Self {
		Self {
			backend,
			max_entities_in_errors,
		}
	}

	fn client_error(&self, err: BackendError, identities: &[String]) -> ClientError {
		if self.backend.is_write_access_error(&err) {
			let shown = identity::display_identities(identities.iter().cloned(), self.max_entities_in_errors);
			ClientError::WriteAccess(format!(
				"Could not create entities with identities: {} ({err})",
				shown.join(", ")
			))
		} else {
			ClientError::Rejected(err.to_string())
		}
	}
}

impl fmt::Debug for BackendRegistryClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BackendRegistryClient")
			.field("backend", &self.backend)
			.finish()
	}
}

#[async_trait]
impl RegistryClient for BackendRegistryClient {
	async fn fetch(&self, identity: &str) -> Result<Option<Document>> {
		self.backend
			.read(identity)
			.await
			.map_err(|e| ClientError::Rejected(e.to_string()))
	}

	async fn create(&self, batch: Vec<Document>) -> Result<()> {
		let identities = batch
			.iter()
			.filter_map(|doc| models::resolve(&Value::Object(doc.clone())).ok())
			.filter_map(|entity| entity.identity().ok())
			.map(|id| id.to_uri())
			.collect::<Vec<_>>();

		self.backend
			.create(batch.into_iter().map(EntityInput::from).collect())
			.await
			.map(|_| ())
			.map_err(|err| self.client_error(err, &identities))
	}

	async fn check_login(&self) -> Result<()> {
		if self.backend.is_closed() {
			return Err(ClientError::Unauthorized("the backend is closed".to_string()));
		}
		Ok(())
	}
}
