//! CRUD operations over entities, each gated by one capability

use super::{Capabilities, Capability, Result, ServiceError};
use crate::{
	backend::{get_backend, AuthLevel, Backend, BackendError, ConnectionProvider, EntityInput, SearchQuery},
	config::ServiceConfig,
	identity::{self, EntityIdentity},
	models::{Document, EntityDescriptor, Resolver},
};

use futures::TryStreamExt;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeSet, sync::Arc};
use tracing::{error, info};

/// Search parameters, each repeatable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityQuery {
	#[serde(default)]
	pub id: Vec<String>,
	#[serde(default)]
	pub prop: Vec<String>,
	#[serde(default)]
	pub dim: Vec<String>,
}

/// Outcome of a successful operation
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
	pub status: StatusCode,
	pub body: Option<Value>,
}

impl Reply {
	fn new(status: StatusCode, body: Value) -> Self {
		Self {
			status,
			body: Some(body),
		}
	}

	fn no_content() -> Self {
		Self {
			status: StatusCode::NO_CONTENT,
			body: None,
		}
	}

	/// Nothing was asked for
	fn empty_list() -> Self {
		Self::new(StatusCode::OK, Value::Array(Vec::new()))
	}

	/// A single document on its own, several as a list
	fn documents(status: StatusCode, mut docs: Vec<Document>) -> Self {
		let body = if docs.len() == 1 {
			docs.pop().map(Value::Object).unwrap_or_default()
		} else {
			Value::Array(docs.into_iter().map(Value::Object).collect())
		};
		Self::new(status, body)
	}
}

/// `entity` or `entities`, `identity` or `identities`
fn plural(count: usize) -> &'static str {
	if count == 1 {
		"y"
	} else {
		"ies"
	}
}

/// A single payload object or a list of them
fn split_payload(payload: Value) -> Result<Vec<Value>> {
	match payload {
		Value::Array(items) => Ok(items),
		Value::Object(_) => Ok(vec![payload]),
		other => Err(ServiceError::BadRequest(format!(
			"expected an entity or a list of entities, got {other}"
		))),
	}
}

/// Identity named by a raw, possibly partial, entity
fn raw_identity(doc: &Document) -> Option<String> {
	let field = |key: &str| doc.get(key).and_then(Value::as_str);

	if let Some(uri) = field("uri").or_else(|| field("identity")) {
		return Some(uri.to_string());
	}

	match (field("namespace"), field("version"), field("name")) {
		(Some(namespace), Some(version), Some(name)) => Some(identity::build(namespace, version, name)),
		_ => None,
	}
}

pub struct EntitiesService {
	reader: Arc<dyn Backend>,
	writer: Arc<dyn Backend>,
	resolver: Resolver,
	max_entities_in_errors: usize,
}

impl EntitiesService {
	pub fn new(
		reader: Arc<dyn Backend>,
		writer: Arc<dyn Backend>,
		resolver: Resolver,
		max_entities_in_errors: usize,
	) -> Self {
		Self {
			reader,
			writer,
			resolver,
			max_entities_in_errors,
		}
	}

	/// Read and write backends over the configured store
	pub fn from_config(config: &ServiceConfig, provider: Arc<ConnectionProvider>) -> Self {
		Self::new(
			get_backend(config.backend_settings(AuthLevel::Read), provider.clone()),
			get_backend(config.backend_settings(AuthLevel::Write), provider),
			Resolver::with_base_url(config.base_url.clone()),
			config.max_entities_in_errors,
		)
	}

	fn display_ids(&self, ids: impl IntoIterator<Item = String>) -> String {
		identity::display_identities(ids, self.max_entities_in_errors).join(", ")
	}

	/// Resolve every payload, reporting all invalid ones together.
	fn resolve_all(&self, items: Vec<Value>) -> Result<Vec<EntityDescriptor>> {
		let mut entities = Vec::with_capacity(items.len());
		let mut problems = Vec::new();

		for (index, item) in items.iter().enumerate() {
			match self.resolver.resolve(item) {
				Ok(entity) => entities.push(entity),
				Err(errors) => {
					let name = item
						.as_object()
						.and_then(raw_identity)
						.unwrap_or_else(|| format!("entity #{index}"));
					problems.push(format!("{name}: {errors}"));
				}
			}
		}

		if problems.is_empty() {
			Ok(entities)
		} else {
			Err(ServiceError::InvalidEntities(problems))
		}
	}

	fn uris(entities: &[EntityDescriptor]) -> Result<Vec<String>> {
		entities
			.iter()
			.map(|e| -> Result<String> { Ok(e.identity().map_err(BackendError::from)?.to_uri()) })
			.collect()
	}

	/// Turn a write failure into a gateway error naming the entities involved.
	fn write_error(&self, backend: &dyn Backend, action: &str, ids: &[String], err: BackendError) -> ServiceError {
		if !backend.is_write_access_error(&err) {
			return err.into();
		}

		error!(?ids, error = %err, "Could not {action} entities");
		ServiceError::Write(format!(
			"Could not {action} entit{suffix} with identit{suffix}: {ids}",
			suffix = plural(ids.len()),
			ids = self.display_ids(ids.iter().cloned()),
		))
	}

	async fn existing(&self, ids: &[String]) -> Result<BTreeSet<String>> {
		let docs: Vec<Document> = self
			.writer
			.search(SearchQuery::identities(ids.iter().cloned()))
			.try_collect()
			.await?;

		Ok(docs.iter().filter_map(raw_identity).collect())
	}

	/// Inclusive search over identities, properties and dimensions. Without
	/// any parameter every entity is returned.
	pub async fn get_entities(&self, caller: &Capabilities, query: EntityQuery) -> Result<Reply> {
		caller.require(Capability::Read)?;

		let search = SearchQuery {
			raw_query: None,
			by_identities: query.id.clone(),
			by_properties: query.prop.clone(),
			by_dimensions: query.dim.clone(),
		};
		let docs: Vec<Document> = self.reader.search(search).try_collect().await?;

		if docs.is_empty() {
			let mut detail = String::from("Could not find entities:");
			for (label, values) in [
				("identities", &query.id),
				("properties", &query.prop),
				("dimensions", &query.dim),
			] {
				if !values.is_empty() {
					detail.push_str(&format!(" {label}={}", values.join(", ")));
				}
			}
			error!("{detail}");
			return Err(ServiceError::NotFound(detail));
		}

		Ok(Reply::documents(StatusCode::OK, docs))
	}

	/// Create every entity in the payload, or none.
	pub async fn create_entities(&self, caller: &Capabilities, payload: Value) -> Result<Reply> {
		caller.require(Capability::Write)?;

		let items = split_payload(payload)?;
		if items.is_empty() {
			return Ok(Reply::empty_list());
		}

		let entities = self.resolve_all(items)?;
		let ids = Self::uris(&entities)?;
		let count = entities.len();

		let created = self
			.writer
			.create(entities.into_iter().map(EntityInput::from).collect())
			.await
			.map_err(|err| self.write_error(self.writer.as_ref(), "create", &ids, err))?;

		if created.len() != count {
			return Err(ServiceError::Write(format!(
				"Could not create entit{suffix} with identit{suffix}: {}",
				self.display_ids(ids),
				suffix = plural(count),
			)));
		}

		info!(?ids, "Created entities");
		Ok(Reply::documents(StatusCode::CREATED, created))
	}

	/// Replace the entities that exist and create the rest. Replies with the
	/// created entities, or no content when everything was a replacement.
	pub async fn put_entities(&self, caller: &Capabilities, payload: Value) -> Result<Reply> {
		caller.require(Capability::Edit)?;

		let items = split_payload(payload)?;
		if items.is_empty() {
			return Ok(Reply::empty_list());
		}

		let entities = self.resolve_all(items)?;
		let ids = Self::uris(&entities)?;
		let existing = self.existing(&ids).await?;

		let (to_update, to_create): (Vec<_>, Vec<_>) = entities
			.into_iter()
			.zip(ids.iter().cloned())
			.partition(|(_, id)| existing.contains(id));

		for (entity, id) in &to_update {
			self.writer
				.update(id, entity.clone().into())
				.await
				.map_err(|err| self.write_error(self.writer.as_ref(), "put/update", &ids, err))?;
		}
		if !to_update.is_empty() {
			info!(count = to_update.len(), "Replaced existing entities");
		}

		if to_create.is_empty() {
			return Ok(Reply::no_content());
		}

		let count = to_create.len();
		let created = self
			.writer
			.create(to_create.into_iter().map(|(entity, _)| entity.into()).collect())
			.await
			.map_err(|err| self.write_error(self.writer.as_ref(), "put/update", &ids, err))?;

		if created.len() != count {
			return Err(ServiceError::Write(format!(
				"Could not put/update entit{suffix} with identit{suffix}: {}",
				self.display_ids(ids),
				suffix = plural(count),
			)));
		}

		Ok(Reply::documents(StatusCode::CREATED, created))
	}

	/// Merge partial entities into existing ones. Every target must exist.
	pub async fn patch_entities(&self, caller: &Capabilities, payload: Value) -> Result<Reply> {
		caller.require(Capability::Edit)?;

		let items = split_payload(payload)?;
		if items.is_empty() {
			return Ok(Reply::empty_list());
		}

		let mut changes = Vec::with_capacity(items.len());
		let mut problems = Vec::new();
		for (index, item) in items.into_iter().enumerate() {
			let Value::Object(doc) = item else {
				problems.push(format!("entity #{index}: expected an object"));
				continue;
			};
			match raw_identity(&doc) {
				Some(id) if EntityIdentity::parse(&id).is_ok() => changes.push((id, doc)),
				Some(id) => problems.push(format!("{id}: not a valid entity identity")),
				None => problems.push(format!(
					"entity #{index}: either `uri` or all of `namespace`, `version` and `name` must be given"
				)),
			}
		}
		if !problems.is_empty() {
			return Err(ServiceError::InvalidEntities(problems));
		}

		let ids = changes.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>();
		let existing = self.existing(&ids).await?;
		let missing = ids
			.iter()
			.filter(|id| !existing.contains(*id))
			.cloned()
			.collect::<Vec<_>>();

		if !missing.is_empty() {
			error!(?missing, "Cannot patch non-existent entities");
			return Err(ServiceError::NotFound(format!(
				"Cannot patch non-existent entities: identities=[{}]",
				self.display_ids(missing)
			)));
		}

		for (id, doc) in changes {
			self.writer
				.patch(&id, doc)
				.await
				.map_err(|err| self.write_error(self.writer.as_ref(), "patch/update", &ids, err))?;
		}

		Ok(Reply::no_content())
	}

	/// Delete by identity. Replies with the deleted identity, or a sorted
	/// list when there were several.
	pub async fn delete_entities(&self, caller: &Capabilities, identities: Vec<String>) -> Result<Reply> {
		caller.require(Capability::Delete)?;

		let ids = identities.into_iter().collect::<BTreeSet<_>>();
		if ids.is_empty() {
			return Err(ServiceError::BadRequest(
				"At least one entity identity must be provided to delete entities.".to_string(),
			));
		}

		let ids = ids.into_iter().collect::<Vec<_>>();
		self.writer
			.delete(&ids)
			.await
			.map_err(|err| self.write_error(self.writer.as_ref(), "delete", &ids, err))?;

		let body = if ids.len() == 1 {
			Value::String(ids[0].clone())
		} else {
			Value::Array(ids.into_iter().map(Value::String).collect())
		};
		Ok(Reply::new(StatusCode::OK, body))
	}
}
