//! Entity descriptors and the resolver that decides which schema variant a
//! raw payload follows.
//!
//! There is no discriminator field. A payload is tried against each variant
//! in [`RESOLUTION_ORDER`] and the first one that validates wins; when none
//! do, the errors of every attempt are returned together.

mod list_form;
mod map_form;
mod validate;

pub use list_form::{ListDimension, ListEntity, ListProperty};
pub use map_form::{MapEntity, MapProperty};
pub use validate::{ResolveOptions, ValidationError, ValidationErrors};

use crate::identity::{self, EntityIdentity, IdentityError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A descriptor as stored and exchanged: a JSON object
pub type Document = Map<String, Value>;

/// The only schema-of-schemas accepted in `meta`
pub const SUPPORTED_META: &str = "http://onto-ns.com/meta/0.3/EntitySchema";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVariant {
	/// Dimensions and properties keyed by name
	Map,
	/// Dimensions and properties as lists of named records
	List,
}

/// Variants are tried in this order; the map form takes precedence.
pub const RESOLUTION_ORDER: [SchemaVariant; 2] = [SchemaVariant::Map, SchemaVariant::List];

impl fmt::Display for SchemaVariant {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Map => write!(f, "map"),
			Self::List => write!(f, "list"),
		}
	}
}

/// Top-level fields shared by both variants. Unset fields stay unset when the
/// descriptor is dumped again.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct EntityHeader {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub uri: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub meta: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}

impl EntityHeader {
	pub fn identity(&self) -> Result<EntityIdentity, IdentityError> {
		if let Some(uri) = &self.uri {
			return EntityIdentity::parse(uri);
		}

		match (&self.namespace, &self.version, &self.name) {
			(Some(namespace), Some(version), Some(name)) => {
				EntityIdentity::parse(&identity::build(namespace, version, name))
			}
			_ => Err(IdentityError::Incomplete),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EntityDescriptor {
	Map(MapEntity),
	List(ListEntity),
}

impl EntityDescriptor {
	pub fn variant(&self) -> SchemaVariant {
		match self {
			Self::Map(_) => SchemaVariant::Map,
			Self::List(_) => SchemaVariant::List,
		}
	}

	pub fn header(&self) -> &EntityHeader {
		match self {
			Self::Map(e) => &e.header,
			Self::List(e) => &e.header,
		}
	}

	fn header_mut(&mut self) -> &mut EntityHeader {
		match self {
			Self::Map(e) => &mut e.header,
			Self::List(e) => &mut e.header,
		}
	}

	/// The identity, from `uri` when present, otherwise from its parts.
	pub fn identity(&self) -> Result<EntityIdentity, IdentityError> {
		self.header().identity()
	}

	pub fn version(&self) -> Result<String, IdentityError> {
		match &self.header().version {
			Some(version) => Ok(version.clone()),
			None => self.identity().map(|id| id.version),
		}
	}

	/// Copy of this descriptor at another version. Whichever identity forms
	/// are set are rewritten together so they stay consistent.
	pub fn with_version(&self, version: &str) -> Result<Self, IdentityError> {
		let identity = self.identity()?.with_version(version);
		let mut updated = self.clone();
		let header = updated.header_mut();

		if header.version.is_some() {
			header.version = Some(version.to_string());
		}
		if header.uri.is_some() {
			header.uri = Some(identity.to_uri());
		}

		Ok(updated)
	}

	/// The wire form, with cross-references spelled `$ref`.
	pub fn to_wire(&self) -> Document {
		match serde_json::to_value(self) {
			Ok(Value::Object(map)) => map,
			_ => Document::new(),
		}
	}

	/// The stored form: the wire form with `$ref` keys renamed to `ref`.
	pub fn to_document(&self) -> Document {
		let mut doc = self.to_wire();
		if let Some(properties) = doc.get_mut("properties") {
			rename_refs(properties);
		}
		doc
	}

	/// Compare the fields each side actually sets. How the identity is
	/// spelled (`uri` or its parts) does not count.
	pub fn same_content(&self, other: &Self) -> bool {
		self.comparable() == other.comparable()
	}

	fn comparable(&self) -> Document {
		let mut doc = self.to_wire();
		for key in ["uri", "namespace", "version", "name"] {
			doc.remove(key);
		}
		if let Ok(id) = self.identity() {
			doc.insert("uri".to_string(), Value::String(id.to_uri()));
		}
		doc
	}
}

fn rename_refs(properties: &mut Value) {
	let definitions: Vec<&mut Value> = match properties {
		Value::Object(map) => map.values_mut().collect(),
		Value::Array(items) => items.iter_mut().collect(),
		_ => return,
	};

	for definition in definitions {
		if let Some(obj) = definition.as_object_mut() {
			if let Some(reference) = obj.remove("$ref") {
				obj.insert("ref".to_string(), reference);
			}
		}
	}
}

/// Decides which variant a raw payload follows.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
	options: ResolveOptions,
}

impl Resolver {
	pub fn new(options: ResolveOptions) -> Self {
		Self { options }
	}

	/// Only accept descriptors whose `uri` and `namespace` live under `base_url`.
	pub fn with_base_url(base_url: impl Into<String>) -> Self {
		Self::new(ResolveOptions {
			base_url: Some(base_url.into()),
		})
	}

	pub fn resolve(&self, raw: &Value) -> Result<EntityDescriptor, ValidationErrors> {
		let mut attempts = Vec::with_capacity(RESOLUTION_ORDER.len());

		for variant in RESOLUTION_ORDER {
			let attempt = match variant {
				SchemaVariant::Map => MapEntity::parse(raw, &self.options).map(EntityDescriptor::Map),
				SchemaVariant::List => {
					ListEntity::parse(raw, &self.options).map(EntityDescriptor::List)
				}
			};

			match attempt {
				Ok(entity) => return Ok(entity),
				Err(errors) => attempts.push(errors),
			}
		}

		Err(ValidationErrors::merge(attempts))
	}

	pub fn resolve_document(&self, doc: &Document) -> Result<EntityDescriptor, ValidationErrors> {
		self.resolve(&Value::Object(doc.clone()))
	}
}

/// Resolve with default options.
pub fn resolve(raw: &Value) -> Result<EntityDescriptor, ValidationErrors> {
	Resolver::default().resolve(raw)
}
