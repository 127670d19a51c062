//! Entities service
//!
//! A registry of versioned schema descriptors ("entities") addressed by URI,
//! stored in SQLite, plus the client used to upload descriptor files to it.

pub mod backend;
pub mod client;
pub mod config;
pub mod diff;
pub mod identity;
pub mod logging;
pub mod models;
pub mod service;

pub use backend::{get_backend, Backend, BackendError, BackendSettings, ConnectionProvider};
pub use identity::EntityIdentity;
pub use models::{resolve, EntityDescriptor, Resolver};
