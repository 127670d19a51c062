//! Database connections shared between backends, one pool per access level.

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use serde::{Deserialize, Serialize};
use std::{
	collections::HashMap,
	fmt,
	path::{Path, PathBuf},
	time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLevel {
	/// Opens the store read-only; every write is refused by the database
	Read,
	/// Opens the store read-write, creating it if missing
	Write,
}

impl fmt::Display for AuthLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Read => write!(f, "read"),
			Self::Write => write!(f, "write"),
		}
	}
}

/// Hands out database connections, opening each pool on first use.
///
/// A provider is created once and passed to every backend that needs it.
/// Pools live as long as the provider does.
pub struct ConnectionProvider {
	path: PathBuf,
	pools: Mutex<HashMap<AuthLevel, DatabaseConnection>>,
}

impl ConnectionProvider {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			pools: Mutex::new(HashMap::new()),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub async fn get(&self, level: AuthLevel) -> Result<DatabaseConnection, DbErr> {
		let mut pools = self.pools.lock().await;

		if let Some(conn) = pools.get(&level) {
			debug!(%level, "Using cached database connection");
			return Ok(conn.clone());
		}

		let conn = self.connect(level).await?;
		pools.insert(level, conn.clone());

		Ok(conn)
	}

	async fn connect(&self, level: AuthLevel) -> Result<DatabaseConnection, DbErr> {
		let db_url = match level {
			AuthLevel::Read => {
				if !self.path.exists() {
					return Err(DbErr::Custom(format!(
						"Database does not exist: {}",
						self.path.display()
					)));
				}
				format!("sqlite://{}?mode=ro", self.path.display())
			}
			AuthLevel::Write => {
				if let Some(parent) = self.path.parent() {
					std::fs::create_dir_all(parent)
						.map_err(|e| DbErr::Custom(format!("Failed to create directory: {}", e)))?;
				}
				format!("sqlite://{}?mode=rwc", self.path.display())
			}
		};

		let mut opt = ConnectOptions::new(db_url);
		opt.max_connections(match level {
			AuthLevel::Read => 10,
			// SQLite allows a single writer at a time
			AuthLevel::Write => 1,
		})
		.min_connections(1)
		.connect_timeout(Duration::from_secs(8))
		.idle_timeout(Duration::from_secs(60))
		.sqlx_logging(false);

		let conn = Database::connect(opt).await?;

		info!(%level, path = %self.path.display(), "Opened database connection");

		Ok(conn)
	}
}

impl fmt::Debug for ConnectionProvider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionProvider")
			.field("path", &self.path)
			.finish_non_exhaustive()
	}
}
