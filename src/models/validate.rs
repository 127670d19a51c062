//! Field checks shared by both schema variants.
//!
//! Validation never stops at the first problem. Every check pushes into a
//! [`Collector`] so that a rejected payload reports everything wrong with it.

use super::{Document, EntityHeader, SchemaVariant, SUPPORTED_META};
use crate::{diff, identity};

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use url::Url;

/// One problem found while validating a payload against a schema variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
	/// Variants that reported this problem
	pub variants: Vec<SchemaVariant>,
	/// Dotted path to the offending field, empty for the payload itself
	pub location: String,
	pub message: String,
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let variants = self
			.variants
			.iter()
			.map(ToString::to_string)
			.collect::<Vec<_>>()
			.join(", ");

		if self.location.is_empty() {
			write!(f, "[{variants}] {}", self.message)
		} else {
			write!(f, "[{variants}] {}: {}", self.location, self.message)
		}
	}
}

/// Every problem found for a payload, deduplicated, in the order they were found
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
	/// Merge errors from several attempts. Identical problems reported by
	/// different variants collapse into a single entry.
	pub(crate) fn merge(attempts: impl IntoIterator<Item = Vec<ValidationError>>) -> Self {
		let mut merged: Vec<ValidationError> = Vec::new();

		for error in attempts.into_iter().flatten() {
			match merged
				.iter_mut()
				.find(|e| e.location == error.location && e.message == error.message)
			{
				Some(existing) => {
					for variant in error.variants {
						if !existing.variants.contains(&variant) {
							existing.variants.push(variant);
						}
					}
				}
				None => merged.push(error),
			}
		}

		Self(merged)
	}

	pub fn single(location: impl Into<String>, message: impl Into<String>) -> Self {
		Self(vec![ValidationError {
			variants: Vec::new(),
			location: location.into(),
			message: message.into(),
		}])
	}

	pub fn errors(&self) -> &[ValidationError] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Whether any error message contains `needle`
	pub fn mentions(&self, needle: &str) -> bool {
		self.0.iter().any(|e| e.message.contains(needle))
	}
}

impl fmt::Display for ValidationErrors {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} validation error(s)", self.0.len())?;
		for error in &self.0 {
			write!(f, "\n  {error}")?;
		}
		Ok(())
	}
}

impl std::error::Error for ValidationErrors {}

/// Settings that apply to every variant
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
	/// When set, `uri` and `namespace` must start with this URL
	pub base_url: Option<String>,
}

pub(crate) fn join(parent: &str, key: &str) -> String {
	if parent.is_empty() {
		key.to_string()
	} else {
		format!("{parent}.{key}")
	}
}

/// Present and not `null`
fn given<'a>(obj: &'a Document, key: &str) -> Option<&'a Value> {
	obj.get(key).filter(|v| !v.is_null())
}

pub(crate) struct Collector {
	variant: SchemaVariant,
	errors: Vec<ValidationError>,
}

impl Collector {
	pub fn new(variant: SchemaVariant) -> Self {
		Self {
			variant,
			errors: Vec::new(),
		}
	}

	pub fn push(&mut self, location: impl Into<String>, message: impl Into<String>) {
		self.errors.push(ValidationError {
			variants: vec![self.variant],
			location: location.into(),
			message: message.into(),
		});
	}

	pub fn object<'a>(&mut self, value: &'a Value, location: &str) -> Option<&'a Document> {
		let obj = value.as_object();
		if obj.is_none() {
			self.push(location, "input should be an object");
		}
		obj
	}

	pub fn opt_str(&mut self, obj: &Document, key: &str, parent: &str) -> Option<String> {
		match given(obj, key)? {
			Value::String(s) => Some(s.clone()),
			_ => {
				self.push(join(parent, key), "input should be a string");
				None
			}
		}
	}

	pub fn req_str(&mut self, obj: &Document, key: &str, parent: &str) -> Option<String> {
		if given(obj, key).is_none() {
			self.push(join(parent, key), "field required");
			return None;
		}
		self.opt_str(obj, key, parent)
	}

	/// An absolute http(s) URL, checked with the `url` crate
	pub fn opt_http_url(&mut self, obj: &Document, key: &str, parent: &str) -> Option<String> {
		let value = self.opt_str(obj, key, parent)?;
		match Url::parse(&value) {
			Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Some(value),
			_ => {
				self.push(join(parent, key), "input should be a valid http(s) URL");
				None
			}
		}
	}

	pub fn opt_str_list(&mut self, obj: &Document, key: &str, parent: &str) -> Option<Vec<String>> {
		let location = join(parent, key);
		let Value::Array(items) = given(obj, key)? else {
			self.push(location, "input should be a list");
			return None;
		};

		let mut out = Vec::with_capacity(items.len());
		for (index, item) in items.iter().enumerate() {
			match item {
				Value::String(s) => out.push(s.clone()),
				_ => self.push(join(&location, &index.to_string()), "input should be a string"),
			}
		}
		Some(out)
	}

	pub fn finish<T>(self, value: Option<T>) -> Result<T, Vec<ValidationError>> {
		match value {
			Some(value) if self.errors.is_empty() => Ok(value),
			_ => Err(self.errors),
		}
	}
}

/// Top-level fields common to both variants, plus the cross-field identity rules.
pub(crate) fn header(c: &mut Collector, obj: &Document, options: &ResolveOptions) -> EntityHeader {
	let uri_key = if given(obj, "uri").is_some() { "uri" } else { "identity" };

	let header = EntityHeader {
		name: c.opt_str(obj, "name", ""),
		version: c.opt_str(obj, "version", ""),
		namespace: c.opt_http_url(obj, "namespace", ""),
		uri: c.opt_http_url(obj, uri_key, ""),
		meta: c.opt_http_url(obj, "meta", ""),
		description: c.opt_str(obj, "description", ""),
	};

	if let Some(uri) = &header.uri {
		if !identity::is_valid(uri) {
			c.push(
				"uri",
				"not a valid entity URI, it must be of the form {namespace}/{version}/{name}",
			);
		}
	}

	if let Some(meta) = &header.meta {
		if meta != SUPPORTED_META {
			c.push(
				"meta",
				format!("only entities using {SUPPORTED_META} as their metadata entity are supported"),
			);
		}
	}

	if let Some(base_url) = &options.base_url {
		for (key, value) in [("uri", &header.uri), ("namespace", &header.namespace)] {
			if value.as_deref().is_some_and(|v| !v.starts_with(base_url.as_str())) {
				c.push(key, format!("this service only works with entities at {base_url}"));
			}
		}
	}

	cross_fields(c, obj, uri_key);

	header
}

/// `name`, `version` and `namespace` come together or not at all; without them
/// `uri` is required, and with both forms given they must agree exactly.
fn cross_fields(c: &mut Collector, obj: &Document, uri_key: &str) {
	let parts = ["name", "version", "namespace"].map(|key| given(obj, key));
	let uri = given(obj, uri_key);

	let any_missing = parts.iter().any(Option::is_none);
	let all_missing = parts.iter().all(Option::is_none);

	if any_missing && !all_missing {
		c.push("", "either all of `name`, `version` and `namespace` must be set or all must be unset");
	}

	if any_missing && uri.is_none() {
		c.push("", "either `name`, `version` and `namespace` or `uri` must be set");
	}

	if let ([Some(name), Some(version), Some(namespace)], Some(uri)) = (parts, uri) {
		let (Some(name), Some(version), Some(namespace), Some(uri)) =
			(name.as_str(), version.as_str(), namespace.as_str(), uri.as_str())
		else {
			return;
		};

		let rebuilt = identity::build(namespace, version, name);
		if uri != rebuilt {
			let diff = diff::intraline(uri, &rebuilt).join("\n  ");
			c.push(
				"",
				format!("the `uri` is not consistent with `name`, `version` and `namespace`:\n\n  {diff}\n"),
			);
		}
	}
}
