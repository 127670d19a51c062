//! Entity operations as exposed to a request/response transport.
//!
//! Routing, payload decoding and token verification live outside this crate.
//! A transport resolves the caller's [`Capabilities`] through an
//! [`AuthProvider`], hands the decoded payload to [`EntitiesService`] and maps
//! the outcome to a status code with [`ServiceError::status_code`].

mod auth;
mod entities;

pub use auth::{AuthProvider, Capabilities, Capability, StaticTokenAuth};
pub use entities::{EntitiesService, EntityQuery, Reply};

use crate::backend::{BackendError, BackendErrorKind};

use http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
	/// The request itself is unusable
	#[error("{0}")]
	BadRequest(String),

	#[error("not authenticated")]
	Unauthorized,

	/// The caller lacks a capability
	#[error("missing the `{0}` capability")]
	Forbidden(Capability),

	/// Entities the caller expected to exist do not
	#[error("{0}")]
	NotFound(String),

	/// Payloads that are not valid entities, one message per entity
	#[error("invalid entities provided:\n{}", .0.join("\n"))]
	InvalidEntities(Vec<String>),

	/// The store refused or failed a write
	#[error("{0}")]
	Write(String),

	#[error(transparent)]
	Backend(#[from] BackendError),
}

impl ServiceError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			Self::BadRequest(_) => StatusCode::BAD_REQUEST,
			Self::Unauthorized => StatusCode::UNAUTHORIZED,
			Self::Forbidden(_) => StatusCode::FORBIDDEN,
			Self::NotFound(_) => StatusCode::NOT_FOUND,
			Self::InvalidEntities(_) => StatusCode::UNPROCESSABLE_ENTITY,
			Self::Write(_) => StatusCode::BAD_GATEWAY,
			Self::Backend(err) => match err.kind() {
				BackendErrorKind::InvalidIdentity | BackendErrorKind::Validation => {
					StatusCode::UNPROCESSABLE_ENTITY
				}
				BackendErrorKind::AlreadyExists => StatusCode::CONFLICT,
				BackendErrorKind::MalformedQuery => StatusCode::BAD_REQUEST,
				BackendErrorKind::WriteAccessDenied | BackendErrorKind::WriteFailure => {
					StatusCode::BAD_GATEWAY
				}
				BackendErrorKind::AlreadyClosed | BackendErrorKind::Database => {
					StatusCode::INTERNAL_SERVER_ERROR
				}
			},
		}
	}
}
