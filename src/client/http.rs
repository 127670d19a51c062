//! Registry client over HTTP

use super::{ClientError, RegistryClient, Result};
use crate::models::Document;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
	client: Client,
	base_url: String,
	access_token: Option<String>,
}

impl HttpRegistryClient {
	pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			access_token,
		})
	}

	fn entities_url(&self) -> String {
		format!("{}/entities", self.base_url)
	}

	fn token(&self) -> Result<&str> {
		self.access_token
			.as_deref()
			.ok_or_else(|| ClientError::Unauthorized("no access token configured".to_string()))
	}

	async fn status_error(response: Response) -> ClientError {
		let status = response.status().as_u16();
		let message = response.text().await.unwrap_or_default();
		ClientError::Status { status, message }
	}
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
	async fn fetch(&self, identity: &str) -> Result<Option<Document>> {
		debug!(%identity, "Checking the registry for an existing entity");

		let response = self
			.client
			.get(self.entities_url())
			.query(&[("id", identity)])
			.send()
			.await?;

		if response.status() == StatusCode::NOT_FOUND {
			return Ok(None);
		}
		if !response.status().is_success() {
			return Err(Self::status_error(response).await);
		}

		match response.json::<Value>().await? {
			Value::Object(doc) => Ok(Some(doc)),
			Value::Array(docs) => Ok(docs.into_iter().find_map(|doc| match doc {
				Value::Object(doc) => Some(doc),
				_ => None,
			})),
			other => Err(ClientError::InvalidResponse(format!(
				"expected an entity, got {other}"
			))),
		}
	}

	async fn create(&self, batch: Vec<Document>) -> Result<()> {
		let token = self.token()?;
		let response = self
			.client
			.post(self.entities_url())
			.bearer_auth(token)
			.json(&batch)
			.send()
			.await?;

		match response.status() {
			status if status.is_success() => Ok(()),
			StatusCode::BAD_GATEWAY => Err(ClientError::WriteAccess(
				response.text().await.unwrap_or_default(),
			)),
			StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
				Err(ClientError::Rejected(response.text().await.unwrap_or_default()))
			}
			_ => Err(Self::status_error(response).await),
		}
	}

	async fn check_login(&self) -> Result<()> {
		let token = self.token()?;
		let response = self
			.client
			.post(self.entities_url())
			.bearer_auth(token)
			.json(&Vec::<Document>::new())
			.send()
			.await?;

		match response.status() {
			status if status.is_success() => Ok(()),
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Unauthorized(
				response.text().await.unwrap_or_default(),
			)),
			_ => Err(Self::status_error(response).await),
		}
	}
}
