//! End-to-end deploy runs against an in-memory backend.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use apiman_cli::client::{ApiRequest, Credentials, Method};
use apiman_cli::error::{ApimanError, InputError, RawResponse};
use apiman_cli::model::error_count;
use apiman_cli::{
    Client, Deployer, EnvSubstitutor, ImportResult, Importer, Kind, MemoryTransport, ResultAction,
};

const DEPLOY_FILE: &str = r"
operation:
  todo.create:
    httpMethod: POST
    httpPath: /todo
    incoming: !include resources/schema/todo.json
    action: action://todo-create
schema:
  Todo: !include resources/schema/todo.json
connection:
  System:
    class: Acme\Connection\Sql
    config:
      url: ${env.DB_URL}
config:
  mail_sender: info@acme.com
action:
  todo-create:
    class: Acme\Action\Todo\Create
";

struct Project {
    dir: tempfile::TempDir,
    env: EnvSubstitutor,
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let schema_dir = dir.path().join("resources").join("schema");
        std::fs::create_dir_all(&schema_dir).expect("create dirs");
        std::fs::write(
            schema_dir.join("todo.json"),
            r#"{"type": "object", "properties": {"title": {"type": "string"}}}"#,
        )
        .expect("write schema");

        let env = EnvSubstitutor::new(BTreeMap::from([(
            String::from("DB_URL"),
            String::from("sqlite://memory"),
        )]));

        Self { dir, env }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn deployer(transport: &Arc<MemoryTransport>) -> Deployer<Arc<MemoryTransport>> {
    Deployer::new(Importer::new(Client::new(
        Arc::clone(transport),
        Credentials::new("https://api.acme.com", "token"),
    )))
}

async fn deploy(transport: &Arc<MemoryTransport>, project: &Project) -> Vec<ImportResult> {
    deployer(transport)
        .deploy(DEPLOY_FILE, &project.env, Some(project.path()))
        .expect("deploy file is valid")
        .collect()
        .await
}

fn missing_everywhere(request: &ApiRequest) -> RawResponse {
    match request.method {
        Method::Get => RawResponse::new(404, r#"{"success":false,"message":"Not found"}"#),
        _ => RawResponse::new(201, r#"{"success":true,"message":"Created"}"#),
    }
}

#[test]
fn test_document_references_declared_schema() {
    let project = Project::new();
    let transport = Arc::new(MemoryTransport::new());

    let document = deployer(&transport)
        .build_document(DEPLOY_FILE, &project.env, Some(project.path()))
        .expect("document");

    assert_eq!(document.schema[0].name, "Todo");
    assert_eq!(document.operation[0].incoming.as_deref(), Some("schema://Todo"));
    assert_eq!(document.operation[0].outgoing.as_deref(), Some("schema://Passthru"));
    assert_eq!(document.operation[0].action.as_deref(), Some("action://todo-create"));
    assert_eq!(
        document.connection[0].config.as_ref().and_then(|c| c.get("url")),
        Some(&serde_json::json!("sqlite://memory"))
    );
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_everything_created_in_kind_order() {
    let project = Project::new();
    let transport = Arc::new(MemoryTransport::with_responder(missing_everywhere));

    let results = deploy(&transport, &project).await;

    let kinds: Vec<Kind> = results.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![Kind::Action, Kind::Config, Kind::Connection, Kind::Schema, Kind::Operation]
    );
    assert!(results.iter().all(|r| r.action == ResultAction::Created));
    assert_eq!(error_count(&results), 0);
}

#[tokio::test]
async fn test_everything_updated_when_present() {
    let project = Project::new();
    let transport = Arc::new(MemoryTransport::with_responder(|request: &ApiRequest| {
        match request.method {
            Method::Get => RawResponse::new(200, r#"{"id":3,"name":"existing"}"#),
            _ => RawResponse::new(200, r#"{"success":true,"message":"Updated"}"#),
        }
    }));

    let results = deploy(&transport, &project).await;

    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.action == ResultAction::Updated));
    assert!(transport
        .requests()
        .iter()
        .filter(|r| r.method == Method::Put)
        .all(|r| r.path.ends_with("/3")));
}

#[tokio::test]
async fn test_failed_create_does_not_stop_the_run() {
    let project = Project::new();
    let transport = Arc::new(MemoryTransport::with_responder(|request: &ApiRequest| {
        if request.method == Method::Post && request.path == "backend/schema" {
            RawResponse::new(500, "database unavailable")
        } else {
            missing_everywhere(request)
        }
    }));

    let results = deploy(&transport, &project).await;

    assert_eq!(results.len(), 5);
    assert_eq!(error_count(&results), 1);

    let failed = &results[3];
    assert_eq!(failed.kind, Kind::Schema);
    assert_eq!(failed.message, "Todo: API returned an invalid status code");
    assert_eq!(failed.response, Some(RawResponse::new(500, "database unavailable")));
    assert_eq!(results[4].action, ResultAction::Created);
}

#[tokio::test]
async fn test_stopping_early_sends_nothing_more() {
    let project = Project::new();
    let transport = Arc::new(MemoryTransport::with_responder(missing_everywhere));
    let deployer = deployer(&transport);

    let mut run = deployer
        .deploy(DEPLOY_FILE, &project.env, Some(project.path()))
        .expect("deploy file is valid");
    let first = run.next_result().await.expect("one result");
    drop(run);

    assert_eq!(first.kind, Kind::Action);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn test_input_errors_abort_before_any_request() {
    let project = Project::new();
    let transport = Arc::new(MemoryTransport::with_responder(missing_everywhere));

    let broken = DEPLOY_FILE.replace("resources/schema/todo.json", "resources/schema/missing.json");
    let deployer = deployer(&transport);
    let result = deployer.deploy(&broken, &project.env, Some(project.path()));

    assert!(matches!(
        result,
        Err(ApimanError::Input(InputError::FileNotFound { .. }))
    ));
    assert!(transport.requests().is_empty());
}

#[test]
fn test_malformed_import_document() {
    let transport = Arc::new(MemoryTransport::new());
    let importer = Importer::new(Client::new(
        Arc::clone(&transport),
        Credentials::new("https://api.acme.com", "token"),
    ));

    for document in ["[]", "42", "null"] {
        assert!(matches!(
            importer.import(document),
            Err(ApimanError::Input(InputError::MalformedDocument { .. }))
        ));
    }
    assert!(transport.requests().is_empty());
}
