//! Storage backends for entity descriptors.
//!
//! [`Backend`] is the storage-independent contract used by the service and the
//! upload client. The document store is the only implementation today.

mod connection;
mod document_store;
mod query;

pub use connection::{AuthLevel, ConnectionProvider};
pub use document_store::{entity, migration, DocumentStoreBackend};

use crate::{
	identity::{self, IdentityError},
	models::{Document, EntityDescriptor, Resolver, ValidationErrors},
};

use async_trait::async_trait;
use futures::stream::BoxStream;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, BackendError>;

#[derive(Error, Debug)]
pub enum BackendError {
	/// An identity failed the identity grammar
	#[error(transparent)]
	InvalidIdentity(#[from] IdentityError),

	/// A payload matched none of the schema variants
	#[error("invalid entity: {0}")]
	Validation(#[from] ValidationErrors),

	/// One or more identities are already stored
	#[error("entities already exist: {}", .shown.join(", "))]
	AlreadyExists {
		identities: Vec<String>,
		shown: Vec<String>,
	},

	/// The store refused the write for lack of permission
	#[error("write access denied: {0}")]
	WriteAccessDenied(String),

	/// Any other failed write
	#[error("write failed: {0}")]
	WriteFailure(String),

	#[error("backend is already closed")]
	AlreadyClosed,

	/// A raw query the backend cannot translate
	#[error("malformed query: {0}")]
	MalformedQuery(String),

	#[error("database error: {0}")]
	Database(#[from] DbErr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
	InvalidIdentity,
	Validation,
	AlreadyExists,
	WriteAccessDenied,
	WriteFailure,
	AlreadyClosed,
	MalformedQuery,
	Database,
}

impl BackendError {
	/// Build an [`BackendError::AlreadyExists`] whose message lists at most
	/// `max_shown` identities.
	pub fn already_exists(identities: Vec<String>, max_shown: usize) -> Self {
		let shown = identity::display_identities(identities.iter().cloned(), max_shown);
		Self::AlreadyExists { identities, shown }
	}

	pub fn kind(&self) -> BackendErrorKind {
		match self {
			Self::InvalidIdentity(_) => BackendErrorKind::InvalidIdentity,
			Self::Validation(_) => BackendErrorKind::Validation,
			Self::AlreadyExists { .. } => BackendErrorKind::AlreadyExists,
			Self::WriteAccessDenied(_) => BackendErrorKind::WriteAccessDenied,
			Self::WriteFailure(_) => BackendErrorKind::WriteFailure,
			Self::AlreadyClosed => BackendErrorKind::AlreadyClosed,
			Self::MalformedQuery(_) => BackendErrorKind::MalformedQuery,
			Self::Database(_) => BackendErrorKind::Database,
		}
	}
}

/// Something to write: an already resolved descriptor or a raw payload that
/// still has to go through the resolver.
#[derive(Debug, Clone)]
pub enum EntityInput {
	Descriptor(EntityDescriptor),
	Raw(Value),
}

impl EntityInput {
	pub fn resolve(self, resolver: &Resolver) -> Result<EntityDescriptor> {
		match self {
			Self::Descriptor(entity) => Ok(entity),
			Self::Raw(raw) => Ok(resolver.resolve(&raw)?),
		}
	}
}

impl From<EntityDescriptor> for EntityInput {
	fn from(entity: EntityDescriptor) -> Self {
		Self::Descriptor(entity)
	}
}

impl From<Value> for EntityInput {
	fn from(raw: Value) -> Self {
		Self::Raw(raw)
	}
}

impl From<Document> for EntityInput {
	fn from(doc: Document) -> Self {
		Self::Raw(Value::Object(doc))
	}
}

/// What [`Backend::contains`] looks for
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
	Identity(&'a str),
	Descriptor(&'a EntityDescriptor),
	Raw(&'a Value),
}

/// Search filters. A non-empty `raw_query` takes precedence and the named
/// filters are then ignored; otherwise named filters are OR-ed together and
/// no filter at all matches every entity.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
	pub raw_query: Option<Value>,
	pub by_properties: Vec<String>,
	pub by_dimensions: Vec<String>,
	pub by_identities: Vec<String>,
}

impl SearchQuery {
	pub fn all() -> Self {
		Self::default()
	}

	pub fn raw(query: Value) -> Self {
		Self {
			raw_query: Some(query),
			..Default::default()
		}
	}

	pub fn identities<I: IntoIterator<Item = S>, S: Into<String>>(ids: I) -> Self {
		Self {
			by_identities: ids.into_iter().map(Into::into).collect(),
			..Default::default()
		}
	}

	/// The raw query, unless it is absent or an empty object
	pub fn effective_raw_query(&self) -> Option<&Value> {
		self.raw_query.as_ref().filter(|q| match q {
			Value::Null => false,
			Value::Object(map) => !map.is_empty(),
			_ => true,
		})
	}

	pub fn has_named_filters(&self) -> bool {
		!(self.by_properties.is_empty() && self.by_dimensions.is_empty() && self.by_identities.is_empty())
	}
}

#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
	/// Prepare the store. Safe to call repeatedly.
	async fn initialize(&self) -> Result<()>;

	/// Insert entities, all or none. Returns the stored forms.
	async fn create(&self, entities: Vec<EntityInput>) -> Result<Vec<Document>>;

	/// `None` when nothing is stored under `identity`.
	async fn read(&self, identity: &str) -> Result<Option<Document>>;

	/// Replace the stored document. Does nothing if `identity` is not stored.
	async fn update(&self, identity: &str, entity: EntityInput) -> Result<()>;

	/// Merge top-level fields of `changes` into the stored document, then
	/// validate the result. Does nothing if `identity` is not stored.
	async fn patch(&self, identity: &str, changes: Document) -> Result<()>;

	/// Every identity is checked before anything is deleted.
	async fn delete(&self, identities: &[String]) -> Result<()>;

	/// Lazily yields matching documents.
	fn search(&self, query: SearchQuery) -> BoxStream<'_, Result<Document>>;

	async fn count(&self, raw_query: Option<&Value>) -> Result<u64>;

	async fn contains(&self, item: EntityRef<'_>) -> Result<bool> {
		let identity = match item {
			EntityRef::Identity(identity) => identity.to_string(),
			EntityRef::Descriptor(entity) => entity.identity()?.to_uri(),
			EntityRef::Raw(raw) => match Resolver::default().resolve(raw) {
				Ok(entity) => entity.identity()?.to_uri(),
				Err(errors) => {
					error!(item = %raw, %errors, "Item given to contains() is not an entity");
					return Ok(false);
				}
			},
		};

		Ok(self.read(&identity).await?.is_some())
	}

	/// Fails with [`BackendError::AlreadyClosed`] when called twice.
	async fn close(&self) -> Result<()>;

	fn is_closed(&self) -> bool;

	/// Error kinds meaning a write was denied or failed in the store
	fn write_access_exception(&self) -> &'static [BackendErrorKind];

	fn is_write_access_error(&self, err: &BackendError) -> bool {
		self.write_access_exception().contains(&err.kind())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
	#[default]
	DocumentStore,
}

/// Which fields the uniqueness index covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexScheme {
	/// The identity string alone
	#[default]
	Identity,
	/// Identity plus namespace, version and name, as older stores did
	Legacy,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
	pub kind: BackendKind,
	pub auth_level: AuthLevel,
	pub index_scheme: IndexScheme,
	pub max_entities_in_errors: usize,
	/// Restrict stored entities to this namespace prefix
	pub base_url: Option<String>,
}

impl Default for BackendSettings {
	fn default() -> Self {
		Self {
			kind: BackendKind::default(),
			auth_level: AuthLevel::Read,
			index_scheme: IndexScheme::default(),
			max_entities_in_errors: 10,
			base_url: None,
		}
	}
}

pub fn get_backend(settings: BackendSettings, provider: Arc<ConnectionProvider>) -> Arc<dyn Backend> {
	match settings.kind {
		BackendKind::DocumentStore => Arc::new(DocumentStoreBackend::new(settings, provider)),
	}
}
