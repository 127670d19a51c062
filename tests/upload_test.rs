//! Uploading descriptor files into a local store

use entities_service::{
	backend::{get_backend, AuthLevel, Backend, BackendSettings, ConnectionProvider},
	client::{
		collect_files, suggest_next_version, BackendRegistryClient, ClientError, FileFormat, Operator,
		UploadOptions, Uploader,
	},
};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::{
	fs,
	path::{Path, PathBuf},
	sync::{Arc, Mutex},
};
use tempfile::TempDir;

/// Answers prompts from a script and records everything it is told
#[derive(Default)]
struct ScriptedOperator {
	accept_new_version: bool,
	/// Version typed at the prompt; the suggestion when `None`
	version: Option<String>,
	prompts: Mutex<Vec<(String, String)>>,
	differences: Mutex<Vec<String>>,
	messages: Mutex<Vec<String>>,
}

impl ScriptedOperator {
	fn accepting(version: Option<&str>) -> Self {
		Self {
			accept_new_version: true,
			version: version.map(String::from),
			..Default::default()
		}
	}

	fn messages(&self) -> Vec<String> {
		self.messages.lock().unwrap().clone()
	}
}

#[async_trait]
impl Operator for ScriptedOperator {
	async fn show_difference(&self, identity: &str, _existing: &str, _incoming: &str) {
		self.differences.lock().unwrap().push(identity.to_string());
	}

	async fn confirm_new_version(&self, _identity: &str) -> Result<bool, ClientError> {
		Ok(self.accept_new_version)
	}

	async fn prompt_version(&self, existing: &str, suggested: &str) -> Result<Option<String>, ClientError> {
		self.prompts
			.lock()
			.unwrap()
			.push((existing.to_string(), suggested.to_string()));
		Ok(Some(self.version.clone().unwrap_or_else(|| suggested.to_string())))
	}

	async fn info(&self, message: &str) {
		self.messages.lock().unwrap().push(format!("info: {message}"));
	}

	async fn warn(&self, message: &str) {
		self.messages.lock().unwrap().push(format!("warn: {message}"));
	}

	async fn error(&self, message: &str) {
		self.messages.lock().unwrap().push(format!("error: {message}"));
	}
}

fn person(version: &str, description: &str) -> Value {
	json!({
		"uri": format!("http://onto-ns.com/meta/{version}/Person"),
		"description": description,
		"dimensions": {},
		"properties": {
			"name": {"type": "string", "description": "Full name."}
		}
	})
}

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
	let path = dir.join(name);
	fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
	path
}

async fn store(dir: &TempDir) -> Arc<dyn Backend> {
	let provider = Arc::new(ConnectionProvider::new(dir.path().join("entities.db")));
	let backend = get_backend(
		BackendSettings {
			auth_level: AuthLevel::Write,
			base_url: Some("http://onto-ns.com/meta".to_string()),
			..Default::default()
		},
		provider,
	);
	backend.initialize().await.unwrap();
	backend
}

fn uploader(backend: &Arc<dyn Backend>, operator: &Arc<ScriptedOperator>) -> Uploader {
	Uploader::new(
		Arc::new(BackendRegistryClient::new(backend.clone(), 10)),
		operator.clone() as Arc<dyn Operator>,
	)
}

#[tokio::test]
async fn test_new_entity_is_uploaded() {
	let dir = TempDir::new().unwrap();
	let backend = store(&dir).await;
	let operator = Arc::new(ScriptedOperator::default());
	let file = write_json(dir.path(), "person.json", &person("0.1", "A person."));

	let summary = uploader(&backend, &operator).upload(&[file.clone()]).await.unwrap();

	assert_eq!(summary.uploaded, vec![file]);
	assert!(summary.is_success());
	assert!(backend
		.read("http://onto-ns.com/meta/0.1/Person")
		.await
		.unwrap()
		.is_some());
}

#[tokio::test]
async fn test_unchanged_entity_is_skipped() {
	let dir = TempDir::new().unwrap();
	let backend = store(&dir).await;
	backend
		.create(vec![person("0.1", "A person.").into()])
		.await
		.unwrap();

	let operator = Arc::new(ScriptedOperator::accepting(None));
	let file = write_json(dir.path(), "person.json", &person("0.1", "A person."));

	let summary = uploader(&backend, &operator).upload(&[file.clone()]).await.unwrap();

	assert_eq!(summary.skipped, vec![file]);
	assert!(summary.uploaded.is_empty());
	assert!(operator.prompts.lock().unwrap().is_empty());
	assert_eq!(backend.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_identity_spelling_alone_is_not_a_change() {
	let dir = TempDir::new().unwrap();
	let backend = store(&dir).await;
	backend
		.create(vec![person("0.1", "A person.").into()])
		.await
		.unwrap();

	let mut local = person("0.1", "A person.");
	let obj = local.as_object_mut().unwrap();
	obj.remove("uri");
	obj.insert("namespace".to_string(), json!("http://onto-ns.com/meta"));
	obj.insert("version".to_string(), json!("0.1"));
	obj.insert("name".to_string(), json!("Person"));

	let operator = Arc::new(ScriptedOperator::accepting(None));
	let file = write_json(dir.path(), "person.json", &local);

	let summary = uploader(&backend, &operator).upload(&[file.clone()]).await.unwrap();

	assert_eq!(summary.skipped, vec![file]);
	assert!(operator.differences.lock().unwrap().is_empty());
	assert_eq!(backend.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_changed_entity_gets_suggested_version() {
	let dir = TempDir::new().unwrap();
	let backend = store(&dir).await;
	backend
		.create(vec![person("0.1", "A person.").into()])
		.await
		.unwrap();

	let operator = Arc::new(ScriptedOperator::accepting(None));
	let file = write_json(dir.path(), "person.json", &person("0.1", "Someone."));

	let summary = uploader(&backend, &operator).upload(&[file.clone()]).await.unwrap();

	assert_eq!(summary.uploaded, vec![file]);
	assert_eq!(
		*operator.differences.lock().unwrap(),
		vec!["http://onto-ns.com/meta/0.1/Person".to_string()]
	);
	assert_eq!(
		*operator.prompts.lock().unwrap(),
		vec![("0.1".to_string(), "0.1.1".to_string())]
	);

	let bumped = backend
		.read("http://onto-ns.com/meta/0.1.1/Person")
		.await
		.unwrap()
		.unwrap();
	assert_eq!(Value::Object(bumped), person("0.1.1", "Someone."));

	let original = backend
		.read("http://onto-ns.com/meta/0.1/Person")
		.await
		.unwrap()
		.unwrap();
	assert_eq!(original["description"], "A person.");
}

#[tokio::test]
async fn test_same_version_is_rejected_without_writing() {
	let dir = TempDir::new().unwrap();
	let backend = store(&dir).await;
	backend
		.create(vec![person("0.1", "A person.").into()])
		.await
		.unwrap();

	let operator = Arc::new(ScriptedOperator::accepting(Some("0.1")));
	let file = write_json(dir.path(), "person.json", &person("0.1", "Someone."));

	let summary = uploader(&backend, &operator).upload(&[file.clone()]).await.unwrap();

	assert_eq!(summary.failed, vec![file]);
	assert!(!summary.is_success());
	assert!(operator
		.messages()
		.iter()
		.any(|m| m.starts_with("error:") && m.contains("same as existing version")));
	assert_eq!(backend.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_custom_version_fails() {
	let dir = TempDir::new().unwrap();
	let backend = store(&dir).await;
	backend
		.create(vec![person("0.1", "A person.").into()])
		.await
		.unwrap();

	let operator = Arc::new(ScriptedOperator::accepting(Some("0.1.2.3")));
	let file = write_json(dir.path(), "person.json", &person("0.1", "Someone."));

	let summary = uploader(&backend, &operator).upload(&[file.clone()]).await.unwrap();

	assert_eq!(summary.failed, vec![file]);
	assert_eq!(backend.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_declined_new_version_is_skipped() {
	let dir = TempDir::new().unwrap();
	let backend = store(&dir).await;
	backend
		.create(vec![person("0.1", "A person.").into()])
		.await
		.unwrap();

	let operator = Arc::new(ScriptedOperator::default());
	let file = write_json(dir.path(), "person.json", &person("0.1", "Someone."));

	let summary = uploader(&backend, &operator).upload(&[file.clone()]).await.unwrap();

	assert_eq!(summary.skipped, vec![file]);
	assert!(operator.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_file_does_not_stop_the_batch() {
	let dir = TempDir::new().unwrap();
	let backend = store(&dir).await;
	let operator = Arc::new(ScriptedOperator::default());

	let bad = write_json(dir.path(), "bad.json", &json!({"uri": "not a uri"}));
	let good = write_json(dir.path(), "good.json", &person("0.1", "A person."));

	let summary = uploader(&backend, &operator)
		.upload(&[bad.clone(), good.clone()])
		.await
		.unwrap();

	assert_eq!(summary.failed, vec![bad]);
	assert_eq!(summary.uploaded, vec![good]);
	assert_eq!(backend.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_fail_fast_aborts_before_writing() {
	let dir = TempDir::new().unwrap();
	let backend = store(&dir).await;
	let operator = Arc::new(ScriptedOperator::default());

	let good = write_json(dir.path(), "good.json", &person("0.1", "A person."));
	let bad = write_json(dir.path(), "bad.json", &json!({"uri": "not a uri"}));

	let result = uploader(&backend, &operator)
		.with_options(UploadOptions { fail_fast: true })
		.upload(&[good, bad])
		.await;

	assert!(matches!(result, Err(ClientError::Aborted { .. })));
	assert_eq!(backend.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_collect_files_filters_formats() {
	let dir = TempDir::new().unwrap();
	let nested = dir.path().join("nested");
	fs::create_dir_all(&nested).unwrap();
	for name in ["a.json", "b.yaml", "d.txt"] {
		fs::write(dir.path().join(name), "{}").unwrap();
	}
	for name in ["c.yml", "e.txt"] {
		fs::write(nested.join(name), "{}").unwrap();
	}

	let operator = ScriptedOperator::default();
	let files = collect_files(&[], &[dir.path().to_path_buf()], &[FileFormat::Yaml], &operator)
		.await
		.unwrap();

	assert_eq!(files, vec![dir.path().join("b.yaml"), nested.join("c.yml")]);

	let messages = operator.messages();
	assert_eq!(
		messages.iter().filter(|m| m.starts_with("info: Skipping file")).count(),
		3
	);
	assert_eq!(
		messages.iter().filter(|m| m.contains("--format=json")).count(),
		1
	);
	assert_eq!(
		messages.iter().filter(|m| m.contains("\"txt\" is not supported")).count(),
		1
	);
}

#[test]
fn test_version_bump_rule() {
	assert_eq!(suggest_next_version("1").unwrap(), "1.1");
	assert_eq!(suggest_next_version("1.1").unwrap(), "1.1.1");
	assert_eq!(suggest_next_version("1.1.1").unwrap(), "1.1.2");
}
