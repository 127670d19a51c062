//! Capabilities granted to a caller

use super::{Result, ServiceError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
	Read,
	Write,
	Edit,
	Delete,
}

impl fmt::Display for Capability {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Read => "read",
			Self::Write => "write",
			Self::Edit => "edit",
			Self::Delete => "delete",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
	pub fn none() -> Self {
		Self::default()
	}

	pub fn all() -> Self {
		[Capability::Read, Capability::Write, Capability::Edit, Capability::Delete]
			.into_iter()
			.collect()
	}

	pub fn read_only() -> Self {
		[Capability::Read].into_iter().collect()
	}

	pub fn contains(&self, capability: Capability) -> bool {
		self.0.contains(&capability)
	}

	pub fn require(&self, capability: Capability) -> Result<()> {
		if self.contains(capability) {
			Ok(())
		} else {
			Err(ServiceError::Forbidden(capability))
		}
	}
}

impl FromIterator<Capability> for Capabilities {
	fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}

/// Maps a bearer token to what its holder may do
#[async_trait]
pub trait AuthProvider: Send + Sync {
	async fn capabilities(&self, token: Option<&str>) -> Result<Capabilities>;
}

/// Grants everything to one configured token and read access to anonymous
/// callers. Any other token is rejected.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuth {
	token: Option<String>,
}

impl StaticTokenAuth {
	pub fn new(token: Option<String>) -> Self {
		Self { token }
	}
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
	async fn capabilities(&self, token: Option<&str>) -> Result<Capabilities> {
		match (token, self.token.as_deref()) {
			(None, _) => Ok(Capabilities::read_only()),
			(Some(given), Some(expected)) if given == expected => Ok(Capabilities::all()),
			(Some(_), _) => {
				warn!("Rejected an unknown access token");
				Err(ServiceError::Unauthorized)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn static_token() {
		let auth = StaticTokenAuth::new(Some("secret".into()));

		assert_eq!(auth.capabilities(None).await.unwrap(), Capabilities::read_only());
		assert_eq!(auth.capabilities(Some("secret")).await.unwrap(), Capabilities::all());
		assert!(matches!(
			auth.capabilities(Some("guess")).await,
			Err(ServiceError::Unauthorized)
		));

		let no_token = StaticTokenAuth::default();
		assert!(no_token.capabilities(Some("secret")).await.is_err());
	}

	#[test]
	fn require() {
		let caps = Capabilities::read_only();
		assert!(caps.require(Capability::Read).is_ok());
		assert!(matches!(
			caps.require(Capability::Edit),
			Err(ServiceError::Forbidden(Capability::Edit))
		));
	}
}
