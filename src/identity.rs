//! Canonical entity identities.
//!
//! An identity is the string `{namespace}/{version}/{name}`, where the namespace
//! is an absolute http(s) URL, the version is one to three dot-separated integers
//! and the name contains none of `/`, `#` or `?`. Versions are compared as plain
//! strings, so `1.01` and `1.1` name different entities.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

static IDENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"^(?P<namespace>https?://.+)/(?P<version>\d(?:\.\d+){0,2})/(?P<name>[^/#?]+)$")
		.expect("identity grammar is a valid regex")
});

static VERSION_REGEX: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^\d(?:\.\d+){0,2}$").expect("version grammar is a valid regex"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
	/// The string does not follow `{namespace}/{version}/{name}`
	#[error("invalid entity identity {0:?}: expected `{{namespace}}/{{version}}/{{name}}`")]
	Invalid(String),

	/// Neither a full identity string nor all of its parts are available
	#[error("cannot derive an identity: either `uri` or all of `namespace`, `version` and `name` must be set")]
	Incomplete,
}

/// The three parts of an entity identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityIdentity {
	pub namespace: String,
	pub version: String,
	pub name: String,
}

impl EntityIdentity {
	/// Split a canonical identity string into its parts.
	pub fn parse(uri: &str) -> Result<Self, IdentityError> {
		let captures = IDENTITY_REGEX
			.captures(uri)
			.ok_or_else(|| IdentityError::Invalid(uri.to_string()))?;

		Ok(Self {
			namespace: captures["namespace"].to_string(),
			version: captures["version"].to_string(),
			name: captures["name"].to_string(),
		})
	}

	/// Build parts without checking the grammar. Use [`EntityIdentity::parse`]
	/// on the result of [`build`] when validation is needed.
	pub fn from_parts(
		namespace: impl Into<String>,
		version: impl Into<String>,
		name: impl Into<String>,
	) -> Self {
		Self {
			namespace: namespace.into(),
			version: version.into(),
			name: name.into(),
		}
	}

	/// Same identity with another version
	pub fn with_version(&self, version: impl Into<String>) -> Self {
		Self {
			namespace: self.namespace.clone(),
			version: version.into(),
			name: self.name.clone(),
		}
	}

	pub fn to_uri(&self) -> String {
		build(&self.namespace, &self.version, &self.name)
	}
}

/// Concatenate identity parts into the canonical string.
pub fn build(namespace: &str, version: &str, name: &str) -> String {
	format!("{namespace}/{version}/{name}")
}

/// Whether `uri` matches the identity grammar
pub fn is_valid(uri: &str) -> bool {
	IDENTITY_REGEX.is_match(uri)
}

/// Whether `version` matches the version part of the identity grammar
pub fn is_valid_version(version: &str) -> bool {
	VERSION_REGEX.is_match(version)
}

/// Deduplicate and sort identities for an error message, keeping at most `max`
/// and summarizing the rest as `... and N more`.
pub fn display_identities<I, S>(identities: I, max: usize) -> Vec<String>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	let mut ids = identities.into_iter().map(Into::into).collect::<Vec<String>>();
	ids.sort();
	ids.dedup();

	let remaining = ids.len().saturating_sub(max);
	ids.truncate(max);
	if remaining > 0 {
		ids.push(format!("... and {remaining} more"));
	}
	ids
}

impl fmt::Display for EntityIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}/{}", self.namespace, self.version, self.name)
	}
}

impl FromStr for EntityIdentity {
	type Err = IdentityError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl Serialize for EntityIdentity {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for EntityIdentity {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let uri = String::deserialize(deserializer)?;
		Self::parse(&uri).map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_and_build_round_trip() {
		let cases = [
			("http://onto-ns.com/meta", "0.1", "Widget"),
			("https://example.org/a/b", "1", "Thing"),
			("http://onto-ns.com/meta", "1.2.33", "Cat_2"),
		];

		for (namespace, version, name) in cases {
			let uri = build(namespace, version, name);
			let parsed = EntityIdentity::parse(&uri).unwrap();
			assert_eq!(parsed, EntityIdentity::from_parts(namespace, version, name));
			assert_eq!(parsed.to_string(), uri);
		}
	}

	#[test]
	fn rejects_malformed_identities() {
		for uri in [
			"not a uri",
			"ftp://onto-ns.com/meta/0.1/Widget",
			"http://onto-ns.com/meta/0.1.2.3/Widget",
			"http://onto-ns.com/meta/10.2.33/Widget",
			"http://onto-ns.com/meta/v1/Widget",
			"http://onto-ns.com/meta/0.1/Wid#get",
			"http://onto-ns.com/meta/0.1/",
		] {
			assert_eq!(
				EntityIdentity::parse(uri),
				Err(IdentityError::Invalid(uri.to_string())),
				"{uri} should be rejected"
			);
		}
	}

	#[test]
	fn leading_zero_versions_are_distinct() {
		let a = EntityIdentity::parse("http://onto-ns.com/meta/1.01/Widget").unwrap();
		let b = EntityIdentity::parse("http://onto-ns.com/meta/1.1/Widget").unwrap();
		assert_eq!(a.version, "1.01");
		assert_ne!(a, b);
	}

	#[test]
	fn version_grammar() {
		assert!(is_valid_version("1"));
		assert!(is_valid_version("1.2"));
		assert!(is_valid_version("1.2.30"));
		assert!(!is_valid_version("1.2.3.4"));
		assert!(!is_valid_version("v1"));
		assert!(!is_valid_version(""));
		assert!(!is_valid_version("12"));
	}

	#[test]
	fn display_identities_clips_and_dedups() {
		let ids = ["c", "a", "b", "a", "d"];
		assert_eq!(display_identities(ids, 10), vec!["a", "b", "c", "d"]);
		assert_eq!(display_identities(ids, 2), vec!["a", "b", "... and 2 more"]);
		assert!(display_identities(Vec::<String>::new(), 3).is_empty());
	}

	#[test]
	fn serde_as_string() {
		let id = EntityIdentity::from_parts("http://onto-ns.com/meta", "0.1", "Widget");
		let json = serde_json::to_string(&id).unwrap();
		assert_eq!(json, "\"http://onto-ns.com/meta/0.1/Widget\"");
		assert_eq!(serde_json::from_str::<EntityIdentity>(&json).unwrap(), id);
		assert!(serde_json::from_str::<EntityIdentity>("\"nope\"").is_err());
	}
}
