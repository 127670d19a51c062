//! Entity operations end to end over a temporary store

use entities_service::{
	backend::{get_backend, AuthLevel, ConnectionProvider},
	config::ServiceConfig,
	models::Resolver,
	service::{Capabilities, EntitiesService, EntityQuery, ServiceError},
};

use http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

fn entity(name: &str, version: &str) -> Value {
	json!({
		"uri": format!("http://onto-ns.com/meta/{version}/{name}"),
		"description": format!("{name} entity."),
		"dimensions": {},
		"properties": {
			"value": {"type": "float", "unit": "m", "description": "A value."}
		}
	})
}

fn uri(name: &str, version: &str) -> String {
	format!("http://onto-ns.com/meta/{version}/{name}")
}

async fn setup(dir: &TempDir) -> (ServiceConfig, Arc<ConnectionProvider>, EntitiesService) {
	let config = ServiceConfig::default_with_dir(dir.path().to_path_buf());
	let provider = Arc::new(ConnectionProvider::new(config.database_file()));
	get_backend(config.backend_settings(AuthLevel::Write), provider.clone())
		.initialize()
		.await
		.unwrap();

	let service = EntitiesService::from_config(&config, provider.clone());
	(config, provider, service)
}

fn by_id(ids: &[String]) -> EntityQuery {
	EntityQuery {
		id: ids.to_vec(),
		..Default::default()
	}
}

#[tokio::test]
async fn test_create_and_get() {
	let dir = TempDir::new().unwrap();
	let (_, _, service) = setup(&dir).await;
	let admin = Capabilities::all();

	let reply = service
		.create_entities(&admin, entity("Length", "0.1"))
		.await
		.unwrap();
	assert_eq!(reply.status, StatusCode::CREATED);
	assert_eq!(reply.body, Some(entity("Length", "0.1")));

	let reply = service
		.get_entities(&Capabilities::read_only(), by_id(&[uri("Length", "0.1")]))
		.await
		.unwrap();
	assert_eq!(reply.status, StatusCode::OK);
	assert_eq!(reply.body, Some(entity("Length", "0.1")));

	service
		.create_entities(&admin, json!([entity("Mass", "0.1"), entity("Time", "0.1")]))
		.await
		.unwrap();
	let reply = service
		.get_entities(&admin, EntityQuery::default())
		.await
		.unwrap();
	assert_eq!(reply.body.unwrap().as_array().map(Vec::len), Some(3));

	let empty = service.create_entities(&admin, json!([])).await.unwrap();
	assert_eq!(empty.status, StatusCode::OK);
	assert_eq!(empty.body, Some(json!([])));
}

#[tokio::test]
async fn test_create_conflicts_and_invalid_payloads() {
	let dir = TempDir::new().unwrap();
	let (_, _, service) = setup(&dir).await;
	let admin = Capabilities::all();

	service
		.create_entities(&admin, entity("Length", "0.1"))
		.await
		.unwrap();
	let err = service
		.create_entities(&admin, entity("Length", "0.1"))
		.await
		.unwrap_err();
	assert_eq!(err.status_code(), StatusCode::CONFLICT);

	let err = service
		.create_entities(&admin, json!([{"uri": "nope"}, {"name": "Incomplete"}]))
		.await
		.unwrap_err();
	assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
	match err {
		ServiceError::InvalidEntities(problems) => assert_eq!(problems.len(), 2),
		other => panic!("unexpected error: {other}"),
	}

	let err = service
		.create_entities(&admin, json!("not an entity"))
		.await
		.unwrap_err();
	assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_capabilities_are_enforced() {
	let dir = TempDir::new().unwrap();
	let (_, _, service) = setup(&dir).await;
	let anonymous = Capabilities::read_only();

	let err = service
		.create_entities(&anonymous, entity("Length", "0.1"))
		.await
		.unwrap_err();
	assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

	let err = service
		.delete_entities(&anonymous, vec![uri("Length", "0.1")])
		.await
		.unwrap_err();
	assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

	let err = service
		.get_entities(&Capabilities::none(), EntityQuery::default())
		.await
		.unwrap_err();
	assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_get_missing() {
	let dir = TempDir::new().unwrap();
	let (_, _, service) = setup(&dir).await;

	let err = service
		.get_entities(&Capabilities::all(), by_id(&[uri("Length", "0.1")]))
		.await
		.unwrap_err();
	assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
	assert!(err.to_string().contains("Length"), "{err}");
}

#[tokio::test]
async fn test_put_updates_and_creates() {
	let dir = TempDir::new().unwrap();
	let (_, _, service) = setup(&dir).await;
	let admin = Capabilities::all();

	service
		.create_entities(&admin, entity("Length", "0.1"))
		.await
		.unwrap();

	let mut changed = entity("Length", "0.1");
	changed["description"] = json!("Changed.");

	let reply = service
		.put_entities(&admin, json!([changed.clone(), entity("Mass", "0.1")]))
		.await
		.unwrap();
	assert_eq!(reply.status, StatusCode::CREATED);
	assert_eq!(reply.body, Some(entity("Mass", "0.1")));

	let reply = service.put_entities(&admin, changed.clone()).await.unwrap();
	assert_eq!(reply.status, StatusCode::NO_CONTENT);
	assert_eq!(reply.body, None);

	let reply = service
		.get_entities(&admin, by_id(&[uri("Length", "0.1")]))
		.await
		.unwrap();
	assert_eq!(reply.body, Some(changed));
}

#[tokio::test]
async fn test_patch() {
	let dir = TempDir::new().unwrap();
	let (_, _, service) = setup(&dir).await;
	let admin = Capabilities::all();

	service
		.create_entities(&admin, entity("Length", "0.1"))
		.await
		.unwrap();

	let err = service
		.patch_entities(&admin, json!({"uri": uri("Mass", "0.1"), "description": "x"}))
		.await
		.unwrap_err();
	assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

	let err = service
		.patch_entities(&admin, json!({"description": "no identity"}))
		.await
		.unwrap_err();
	assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

	let reply = service
		.patch_entities(&admin, json!({"uri": uri("Length", "0.1"), "description": "Patched."}))
		.await
		.unwrap();
	assert_eq!(reply.status, StatusCode::NO_CONTENT);

	let body = service
		.get_entities(&admin, by_id(&[uri("Length", "0.1")]))
		.await
		.unwrap()
		.body
		.unwrap();
	assert_eq!(body["description"], "Patched.");
	assert_eq!(body["properties"], entity("Length", "0.1")["properties"]);
}

#[tokio::test]
async fn test_delete() {
	let dir = TempDir::new().unwrap();
	let (_, _, service) = setup(&dir).await;
	let admin = Capabilities::all();

	service
		.create_entities(
			&admin,
			json!([entity("Length", "0.1"), entity("Mass", "0.1"), entity("Time", "0.1")]),
		)
		.await
		.unwrap();

	let err = service.delete_entities(&admin, vec![]).await.unwrap_err();
	assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

	let reply = service
		.delete_entities(&admin, vec![uri("Time", "0.1"), uri("Mass", "0.1")])
		.await
		.unwrap();
	assert_eq!(reply.status, StatusCode::OK);
	assert_eq!(reply.body, Some(json!([uri("Mass", "0.1"), uri("Time", "0.1")])));

	let reply = service
		.delete_entities(&admin, vec![uri("Length", "0.1")])
		.await
		.unwrap();
	assert_eq!(reply.body, Some(json!(uri("Length", "0.1"))));

	let err = service
		.get_entities(&admin, EntityQuery::default())
		.await
		.unwrap_err();
	assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_read_only_store_reports_bad_gateway() {
	let dir = TempDir::new().unwrap();
	let (config, provider, _) = setup(&dir).await;

	let reader = get_backend(config.backend_settings(AuthLevel::Read), provider);
	let service = EntitiesService::new(
		reader.clone(),
		reader,
		Resolver::with_base_url(config.base_url.clone()),
		config.max_entities_in_errors,
	);

	let err = service
		.create_entities(&Capabilities::all(), entity("Length", "0.1"))
		.await
		.unwrap_err();
	assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
	assert_eq!(
		err.to_string(),
		format!("Could not create entity with identity: {}", uri("Length", "0.1"))
	);
}
