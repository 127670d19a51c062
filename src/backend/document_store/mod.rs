//! Document-store backend.
//!
//! Descriptors are kept as JSON documents in a single SQLite table. The
//! identity columns next to each document exist for indexing and lookup, the
//! document itself is what callers get back.

pub mod entity;
pub mod migration;

use super::{
	query, Backend, BackendError, BackendErrorKind, BackendSettings, ConnectionProvider, EntityInput,
	IndexScheme, Result, SearchQuery,
};
use crate::{
	identity::{self, EntityIdentity},
	models::{Document, EntityDescriptor, ResolveOptions, Resolver},
};

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use sea_orm::{
	sea_query::{Condition, Expr, Index, SimpleExpr},
	ActiveValue::Set,
	ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityName, EntityTrait, QueryFilter,
	QueryOrder, QuerySelect, PaginatorTrait, RuntimeErr, SqlErr, Statement, TransactionTrait,
};
use sea_orm_migration::{MigratorTrait, SchemaManager};
use serde_json::Value;
use std::{
	fmt,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};
use tracing::{debug, info, warn};

/// Name of the uniqueness index over identities
pub const INDEX_NAME: &str = "IDENTITY";

const PAGE_SIZE: u64 = 100;

// SQLite primary result codes that mean the write was not allowed
const SQLITE_PERM: i32 = 3;
const SQLITE_READONLY: i32 = 8;
const SQLITE_AUTH: i32 = 23;

const WRITE_ACCESS_ERRORS: &[BackendErrorKind] =
	&[BackendErrorKind::WriteAccessDenied, BackendErrorKind::WriteFailure];

#[derive(Debug)]
pub struct DocumentStoreBackend {
	settings: BackendSettings,
	provider: Arc<ConnectionProvider>,
	resolver: Resolver,
	closed: AtomicBool,
}

/// An index as found in the database
#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexInfo {
	unique: bool,
	keys: Vec<String>,
}

impl DocumentStoreBackend {
	pub fn new(settings: BackendSettings, provider: Arc<ConnectionProvider>) -> Self {
		let resolver = Resolver::new(ResolveOptions {
			base_url: settings.base_url.clone(),
		});

		Self {
			settings,
			provider,
			resolver,
			closed: AtomicBool::new(false),
		}
	}

	async fn conn(&self) -> Result<DatabaseConnection> {
		Ok(self.provider.get(self.settings.auth_level).await?)
	}

	fn index_columns(&self) -> Vec<entity::Column> {
		match self.settings.index_scheme {
			IndexScheme::Identity => vec![entity::Column::Identity],
			IndexScheme::Legacy => vec![
				entity::Column::Identity,
				entity::Column::Namespace,
				entity::Column::Version,
				entity::Column::Name,
			],
		}
	}

	fn index_keys(&self) -> &'static [&'static str] {
		match self.settings.index_scheme {
			IndexScheme::Identity => &["identity"],
			IndexScheme::Legacy => &["identity", "namespace", "version", "name"],
		}
	}

	async fn existing_index(conn: &DatabaseConnection) -> Result<Option<IndexInfo>> {
		let indexes = conn
			.query_all(Statement::from_string(
				DbBackend::Sqlite,
				format!("PRAGMA index_list('{}')", entity::Entity.table_name()),
			))
			.await?;

		for row in indexes {
			let name = row.try_get::<String>("", "name")?;
			if name != INDEX_NAME {
				continue;
			}

			let unique = row.try_get::<i32>("", "unique")? != 0;
			let keys = conn
				.query_all(Statement::from_string(
					DbBackend::Sqlite,
					format!("PRAGMA index_info('{INDEX_NAME}')"),
				))
				.await?
				.iter()
				.map(|key| key.try_get::<String>("", "name"))
				.collect::<std::result::Result<Vec<_>, DbErr>>()?;

			return Ok(Some(IndexInfo { unique, keys }));
		}

		Ok(None)
	}

	/// Rows stored only by namespace, version and name get their identity
	/// column, so the uniqueness index covers them too.
	async fn fill_identities(conn: &DatabaseConnection) -> Result<()> {
		let result = entity::Entity::update_many()
			.col_expr(
				entity::Column::Identity,
				Expr::cust("namespace || '/' || version || '/' || name"),
			)
			.filter(entity::Column::Identity.is_null())
			.filter(entity::Column::Namespace.is_not_null())
			.filter(entity::Column::Version.is_not_null())
			.filter(entity::Column::Name.is_not_null())
			.exec(conn)
			.await
			.map_err(classify_write)?;

		if result.rows_affected > 0 {
			info!(rows = result.rows_affected, "Filled in identities of legacy rows");
		}

		Ok(())
	}

	fn search_condition(&self, query: &SearchQuery) -> Result<Condition> {
		if let Some(raw) = query.effective_raw_query() {
			if query.has_named_filters() {
				debug!("Raw query given, ignoring named search filters");
			}
			return query::translate(raw);
		}

		if !query.has_named_filters() {
			return Ok(Condition::all());
		}

		let mut condition = Condition::any();
		for name in &query.by_properties {
			condition = condition.add(has_member("$.properties", name));
		}
		for name in &query.by_dimensions {
			condition = condition.add(has_member("$.dimensions", name));
		}
		for id in &query.by_identities {
			condition = condition.add(identity_condition(&EntityIdentity::parse(id)?));
		}

		Ok(condition)
	}
}

/// Matches the modern identity column or the legacy namespace/version/name
/// triple, so rows written under either addressing scheme are found.
fn identity_condition(id: &EntityIdentity) -> Condition {
	Condition::any()
		.add(entity::Column::Identity.eq(id.to_uri()))
		.add(
			Condition::all()
				.add(entity::Column::Namespace.eq(id.namespace.as_str()))
				.add(entity::Column::Version.eq(id.version.as_str()))
				.add(entity::Column::Name.eq(id.name.as_str())),
		)
}

/// The collection at `path` names `member`, either as a map key or as the
/// `name` of a list element.
fn has_member(path: &str, member: &str) -> SimpleExpr {
	Expr::cust_with_values(
		"EXISTS (SELECT 1 FROM json_each(entities.document, ?) AS member \
		 WHERE member.key = ? \
		 OR (CASE WHEN member.type = 'object' THEN json_extract(member.value, ?) END) = ?)",
		[path, member, "$.name", member],
	)
}

fn active_model(entity: &EntityDescriptor) -> Result<entity::ActiveModel> {
	let id = entity.identity()?;

	Ok(entity::ActiveModel {
		identity: Set(Some(id.to_uri())),
		namespace: Set(Some(id.namespace)),
		version: Set(Some(id.version)),
		name: Set(Some(id.name)),
		document: Set(Value::Object(entity.to_document())),
		..Default::default()
	})
}

/// The stored document, without any storage-internal key.
fn into_document(model: entity::Model) -> Document {
	match model.document {
		Value::Object(mut doc) => {
			doc.remove("_id");
			doc
		}
		other => {
			warn!(row = model.id, kind = ?other, "Stored document is not a JSON object");
			Document::new()
		}
	}
}

fn sqlite_code(err: &DbErr) -> Option<i32> {
	let runtime = match err {
		DbErr::Exec(e) | DbErr::Query(e) | DbErr::Conn(e) => e,
		_ => return None,
	};

	let RuntimeErr::SqlxError(e) = runtime else {
		return None;
	};
	let db_err: &dyn sqlx::error::DatabaseError = e.as_database_error()?;
	db_err.code()?.parse().ok()
}

fn is_duplicate(err: &DbErr) -> bool {
	matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Split a failed write into denied access and everything else.
fn classify_write(err: DbErr) -> BackendError {
	match sqlite_code(&err).map(|code| code & 0xff) {
		Some(SQLITE_READONLY | SQLITE_PERM | SQLITE_AUTH) => {
			BackendError::WriteAccessDenied(err.to_string())
		}
		_ => BackendError::WriteFailure(err.to_string()),
	}
}

#[async_trait]
impl Backend for DocumentStoreBackend {
	async fn initialize(&self) -> Result<()> {
		let conn = self.conn().await?;
		migration::Migrator::up(&conn, None).await?;
		Self::fill_identities(&conn).await?;

		let expected = self.index_keys();
		match Self::existing_index(&conn).await? {
			Some(index) => {
				if !index.unique {
					warn!(
						"The {INDEX_NAME} index in the entities store is not unique. \
						 This may cause problems when creating entities."
					);
				}
				if !index.keys.iter().map(String::as_str).eq(expected.iter().copied()) {
					warn!(
						found = ?index.keys,
						?expected,
						"The {INDEX_NAME} index in the entities store is not as expected. \
						 This may cause problems when creating entities."
					);
				}
			}
			None => {
				let mut index = Index::create();
				index.name(INDEX_NAME).table(entity::Entity).unique();
				for column in self.index_columns() {
					index.col(column);
				}

				SchemaManager::new(&conn)
					.create_index(index)
					.await
					.map_err(classify_write)?;

				info!(keys = ?expected, "Created the {INDEX_NAME} index");
			}
		}

		Ok(())
	}

	async fn create(&self, entities: Vec<EntityInput>) -> Result<Vec<Document>> {
		if entities.is_empty() {
			return Ok(Vec::new());
		}

		let entities = entities
			.into_iter()
			.map(|e| e.resolve(&self.resolver))
			.collect::<Result<Vec<_>>>()?;

		info!(count = entities.len(), "Creating entities");

		let conn = self.conn().await?;
		let txn = conn.begin().await.map_err(classify_write)?;

		let mut documents = Vec::with_capacity(entities.len());
		let mut duplicates = Vec::new();
		let mut failures = Vec::new();

		for entity in &entities {
			let uri = entity.identity()?.to_uri();
			match entity::Entity::insert(active_model(entity)?).exec(&txn).await {
				Ok(_) => documents.push(entity.to_document()),
				Err(err) if is_duplicate(&err) => duplicates.push(uri),
				Err(err) => failures.push((uri, err)),
			}
		}

		if duplicates.is_empty() && failures.is_empty() {
			txn.commit().await.map_err(classify_write)?;
			return Ok(documents);
		}

		txn.rollback().await?;

		if failures.is_empty() {
			warn!(?duplicates, "Refusing to create entities that already exist");
			return Err(BackendError::already_exists(
				duplicates,
				self.settings.max_entities_in_errors,
			));
		}

		let identities = identity::display_identities(
			failures.iter().map(|(uri, _)| uri.clone()).chain(duplicates),
			self.settings.max_entities_in_errors,
		);
		let (_, err) = failures.remove(0);

		Err(match classify_write(err) {
			BackendError::WriteAccessDenied(msg) => {
				BackendError::WriteAccessDenied(format!("{msg} (entities: {})", identities.join(", ")))
			}
			other => BackendError::WriteFailure(format!("{other} (entities: {})", identities.join(", "))),
		})
	}

	async fn read(&self, identity: &str) -> Result<Option<Document>> {
		let id = EntityIdentity::parse(identity)?;
		let conn = self.conn().await?;

		let row = entity::Entity::find()
			.filter(identity_condition(&id))
			.one(&conn)
			.await?;

		Ok(row.map(into_document))
	}

	async fn update(&self, identity: &str, entity: EntityInput) -> Result<()> {
		let id = EntityIdentity::parse(identity)?;
		let entity = entity.resolve(&self.resolver)?;
		let conn = self.conn().await?;

		let result = entity::Entity::update_many()
			.set(active_model(&entity)?)
			.filter(identity_condition(&id))
			.exec(&conn)
			.await
			.map_err(|err| {
				if is_duplicate(&err) {
					BackendError::already_exists(
						vec![entity.identity().map(|id| id.to_uri()).unwrap_or_default()],
						self.settings.max_entities_in_errors,
					)
				} else {
					classify_write(err)
				}
			})?;

		if result.rows_affected == 0 {
			debug!(%identity, "Nothing to update");
		}

		Ok(())
	}

	async fn patch(&self, identity: &str, changes: Document) -> Result<()> {
		let Some(mut doc) = self.read(identity).await? else {
			debug!(%identity, "Nothing to patch");
			return Ok(());
		};

		for (key, value) in changes {
			doc.insert(key, value);
		}

		self.update(identity, EntityInput::from(doc)).await
	}

	async fn delete(&self, identities: &[String]) -> Result<()> {
		let ids = identities
			.iter()
			.map(|id| EntityIdentity::parse(id))
			.collect::<std::result::Result<Vec<_>, _>>()?;

		if ids.is_empty() {
			return Ok(());
		}

		let condition = ids
			.iter()
			.fold(Condition::any(), |cond, id| cond.add(identity_condition(id)));

		let conn = self.conn().await?;
		let result = entity::Entity::delete_many()
			.filter(condition)
			.exec(&conn)
			.await
			.map_err(classify_write)?;

		info!(requested = ids.len(), deleted = result.rows_affected, "Deleted entities");

		Ok(())
	}

	fn search(&self, query: SearchQuery) -> BoxStream<'_, Result<Document>> {
		Box::pin(try_stream! {
			let condition = self.search_condition(&query)?;
			let conn = self.conn().await?;
			let mut last_id = 0;

			loop {
				let page = entity::Entity::find()
					.filter(condition.clone())
					.filter(entity::Column::Id.gt(last_id))
					.order_by_asc(entity::Column::Id)
					.limit(PAGE_SIZE)
					.all(&conn)
					.await
					.map_err(BackendError::from)?;

				let exhausted = (page.len() as u64) < PAGE_SIZE;

				for row in page {
					last_id = row.id;
					yield into_document(row);
				}

				if exhausted {
					break;
				}
			}
		})
	}

	async fn count(&self, raw_query: Option<&Value>) -> Result<u64> {
		let query = SearchQuery {
			raw_query: raw_query.cloned(),
			..Default::default()
		};

		let mut select = entity::Entity::find();
		if let Some(raw) = query.effective_raw_query() {
			select = select.filter(query::translate(raw)?);
		}

		let conn = self.conn().await?;
		Ok(select.count(&conn).await?)
	}

	async fn close(&self) -> Result<()> {
		if self.closed.swap(true, Ordering::SeqCst) {
			return Err(BackendError::AlreadyClosed);
		}

		// Pools belong to the provider and outlive this backend
		debug!(backend = %self, "Closed backend");
		Ok(())
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	fn write_access_exception(&self) -> &'static [BackendErrorKind] {
		WRITE_ACCESS_ERRORS
	}
}

impl fmt::Display for DocumentStoreBackend {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"DocumentStoreBackend: path={} auth_level={}",
			self.provider.path().display(),
			self.settings.auth_level
		)
	}
}
