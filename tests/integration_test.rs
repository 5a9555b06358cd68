use pretty_assertions::assert_eq;
use route_surface::{
    cli::{self, CliArgs, Framework},
    config::AnalyzerConfig,
    detector::FrameworkDetector,
    document::{HttpMethod, ParamLocation, RouteRecord},
    error::Error,
    openapi_builder::build_document,
    parser::AstParser,
    program::Program,
    provider::{
        actix::ActixProvider, axum::AxumProvider, tide::TideProvider, CapabilityProvider,
    },
    scanner::FileScanner,
    schema::SchemaKind,
    serializer::{serialize_json, serialize_yaml},
    tracer::discover,
};
use clap::Parser;
use std::collections::HashSet;
use tempfile::TempDir;

/// Helper function to create a temporary test project
fn create_test_project(files: Vec<(&str, &str)>) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    for (path, content) in files {
        let file_path = temp_dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&file_path, content).expect("Failed to write test file");
    }

    temp_dir
}

/// Scan, parse, build and trace a project the way the CLI does.
fn analyze(
    temp_dir: &TempDir,
    provider: &dyn CapabilityProvider,
    config: &AnalyzerConfig,
) -> Vec<RouteRecord> {
    let scan_result = FileScanner::new(temp_dir.path().to_path_buf())
        .scan()
        .expect("Failed to scan directory");
    let parsed_files =
        AstParser::load(&scan_result.rust_files, false).expect("Failed to load project");
    let program = Program::build(&parsed_files);
    discover(&program, provider, config)
}

fn routes(records: &[RouteRecord]) -> Vec<(HttpMethod, &str, &str)> {
    records
        .iter()
        .map(|r| (r.method, r.path.as_str(), r.handler.as_str()))
        .collect()
}

fn find<'r>(records: &'r [RouteRecord], method: HttpMethod, path: &str) -> &'r RouteRecord {
    records
        .iter()
        .find(|r| r.method == method && r.path == path)
        .unwrap_or_else(|| panic!("No route {} {}, found: {:?}", method, path, routes(records)))
}

#[test]
fn test_axum_end_to_end_discovery() {
    let temp_dir = create_test_project(vec![("src/main.rs", include_str!("fixtures/axum_project.rs"))]);
    let records = analyze(&temp_dir, &AxumProvider, &AnalyzerConfig::default());

    assert_eq!(
        routes(&records),
        vec![
            (HttpMethod::Get, "/health", "health_check"),
            (HttpMethod::Get, "/api/v1/users", "list_users"),
            (HttpMethod::Post, "/api/v1/users", "create_user"),
            (HttpMethod::Get, "/api/v1/users/:id", "get_user"),
            (HttpMethod::Delete, "/api/v1/users/:id", "delete_user"),
        ]
    );

    let get_user = find(&records, HttpMethod::Get, "/api/v1/users/:id");
    assert_eq!(get_user.module_path, "crate");
    assert_eq!(get_user.request_params.len(), 1);
    assert_eq!(get_user.request_params[0].name, "id");
    assert_eq!(get_user.request_params[0].location, ParamLocation::Path);
    assert_eq!(get_user.request_params[0].schema.kind, SchemaKind::Integer);
    assert!(get_user.request_params[0].required);

    let response = &get_user.response_schema;
    assert_eq!(response.type_name.as_deref(), Some("User"));
    let keys: Vec<_> = response.properties.keys().cloned().collect();
    assert_eq!(keys, vec!["emailAddress", "id", "name"]);

    let create_user = find(&records, HttpMethod::Post, "/api/v1/users");
    let body = &create_user.request_params[0];
    assert_eq!(body.location, ParamLocation::Body);
    assert_eq!(body.schema.type_name.as_deref(), Some("CreateUserRequest"));
    assert_eq!(create_user.response_schema.type_name.as_deref(), Some("User"));

    let list_users = find(&records, HttpMethod::Get, "/api/v1/users");
    let query = &list_users.request_params[0];
    assert_eq!(query.location, ParamLocation::Query);
    assert!(!query.required);
    assert_eq!(query.schema.type_name.as_deref(), Some("ListQuery"));
}

#[test]
fn test_actix_end_to_end_discovery() {
    let temp_dir =
        create_test_project(vec![("src/main.rs", include_str!("fixtures/actix_project.rs"))]);
    let records = analyze(&temp_dir, &ActixProvider, &AnalyzerConfig::default());

    assert_eq!(
        routes(&records),
        vec![
            (HttpMethod::Get, "/health", "health"),
            (HttpMethod::Get, "/api/v1/users", "get_users"),
            (HttpMethod::Get, "/api/v1/users/{id}", "get_user"),
            (HttpMethod::Post, "/api/v1/users", "create_user"),
            (HttpMethod::Delete, "/api/v1/users/{id}", "delete_user"),
        ]
    );

    let get_user = find(&records, HttpMethod::Get, "/api/v1/users/{id}");
    assert_eq!(get_user.response_schema.type_name.as_deref(), Some("User"));
    assert_eq!(get_user.request_params[0].name, "id");

    // read through req.match_info().get("id")
    let delete_user = find(&records, HttpMethod::Delete, "/api/v1/users/{id}");
    assert_eq!(delete_user.request_params.len(), 1);
    assert_eq!(delete_user.request_params[0].location, ParamLocation::Path);
    assert_eq!(delete_user.request_params[0].source_method, "match_info().get");
}

#[test]
fn test_tide_end_to_end_discovery() {
    let temp_dir = create_test_project(vec![("src/main.rs", include_str!("fixtures/tide_project.rs"))]);
    let records = analyze(&temp_dir, &TideProvider, &AnalyzerConfig::default());

    assert_eq!(
        routes(&records),
        vec![
            (HttpMethod::Get, "/health", "anonymous"),
            (HttpMethod::Get, "/api/notes", "list_notes"),
            (HttpMethod::Post, "/api/notes", "create_note"),
            (HttpMethod::Get, "/api/notes/:id", "get_note"),
        ]
    );

    let list_notes = find(&records, HttpMethod::Get, "/api/notes");
    assert_eq!(list_notes.request_params[0].location, ParamLocation::Query);
    assert_eq!(
        list_notes.request_params[0].schema.type_name.as_deref(),
        Some("NoteFilter")
    );

    let create_note = find(&records, HttpMethod::Post, "/api/notes");
    assert_eq!(create_note.request_params[0].location, ParamLocation::Body);
    assert_eq!(
        create_note.request_params[0].schema.type_name.as_deref(),
        Some("NewNote")
    );
    assert_eq!(create_note.response_schema.type_name.as_deref(), Some("Note"));
}

#[test]
fn test_wrapper_injects_call_site_payload() {
    let temp_dir = create_test_project(vec![("src/main.rs", include_str!("fixtures/tide_project.rs"))]);
    let records = analyze(&temp_dir, &TideProvider, &AnalyzerConfig::default());

    // `return fail(..)` is an error emission, `success(note)` wins
    let get_note = find(&records, HttpMethod::Get, "/api/notes/:id");
    let response = &get_note.response_schema;
    assert_eq!(response.type_name.as_deref(), Some("ApiResponse"));
    assert_eq!(response.properties["code"].kind, SchemaKind::Integer);
    let data = &response.properties["data"];
    assert_eq!(data.type_name.as_deref(), Some("Note"));
    assert_eq!(data.properties["done"].kind, SchemaKind::Boolean);

    let list_notes = find(&records, HttpMethod::Get, "/api/notes");
    let data = &list_notes.response_schema.properties["data"];
    assert_eq!(data.kind, SchemaKind::Array);
    assert_eq!(
        data.items.as_deref().and_then(|items| items.type_name.as_deref()),
        Some("Note")
    );
}

#[test]
fn test_plain_send_helper_defaults_to_success() {
    let code = r#"
        pub struct Stats { pub users: u32 }

        fn send<T: Serialize>(data: T) -> Json<T> {
            Json(data)
        }

        async fn stats() -> Json<Stats> {
            send(Stats { users: 3 })
        }

        pub fn app() -> Router {
            Router::new().route("/stats", get(stats))
        }
    "#;
    let temp_dir = create_test_project(vec![("src/lib.rs", code)]);
    let records = analyze(&temp_dir, &AxumProvider, &AnalyzerConfig::default());

    assert_eq!(routes(&records), vec![(HttpMethod::Get, "/stats", "stats")]);
    let response = &records[0].response_schema;
    assert_eq!(response.type_name.as_deref(), Some("Stats"));
    assert_eq!(response.properties["users"].kind, SchemaKind::Integer);
}

#[test]
fn test_recursive_response_respects_max_depth() {
    let code = r#"
        pub struct Category { pub name: String, pub children: Vec<Category> }

        async fn tree() -> Json<Category> {
            let root: Category = repository::root_category();
            Json(root)
        }

        pub fn app() -> Router {
            Router::new().route("/categories", get(tree))
        }
    "#;
    let temp_dir = create_test_project(vec![("src/lib.rs", code)]);
    let config = AnalyzerConfig {
        max_depth: 4,
        ..AnalyzerConfig::default()
    };
    let records = analyze(&temp_dir, &AxumProvider, &config);

    assert_eq!(records.len(), 1);
    let response = &records[0].response_schema;
    assert_eq!(response.type_name.as_deref(), Some("Category"));
    assert!(response.depth() <= config.max_depth);
}

#[test]
fn test_discovery_is_idempotent_and_unique() {
    let temp_dir = create_test_project(vec![("src/main.rs", include_str!("fixtures/tide_project.rs"))]);
    let config = AnalyzerConfig::default();

    let first = analyze(&temp_dir, &TideProvider, &config);
    let second = analyze(&temp_dir, &TideProvider, &config);
    assert_eq!(first, second);

    let keys: HashSet<_> = first.iter().map(RouteRecord::key).collect();
    assert_eq!(keys.len(), first.len());
}

#[test]
fn test_mutually_recursive_group_functions() {
    let code = r#"
        use actix_web::{web, App, HttpResponse};

        async fn ping() -> HttpResponse { HttpResponse::Ok().finish() }
        async fn pong() -> HttpResponse { HttpResponse::Ok().finish() }

        fn ping_routes(cfg: &mut web::ServiceConfig) {
            cfg.route("/ping", web::get().to(ping)).configure(pong_routes);
        }

        fn pong_routes(cfg: &mut web::ServiceConfig) {
            cfg.route("/pong", web::get().to(pong)).configure(ping_routes);
        }

        fn main() {
            HttpServer::new(|| App::new().configure(ping_routes)).run();
        }
    "#;
    let temp_dir = create_test_project(vec![("src/main.rs", code)]);
    let records = analyze(&temp_dir, &ActixProvider, &AnalyzerConfig::default());

    assert_eq!(
        routes(&records),
        vec![
            (HttpMethod::Get, "/ping", "ping"),
            (HttpMethod::Get, "/pong", "pong"),
        ]
    );
}

#[test]
fn test_framework_detection_on_fixtures() {
    let temp_dir = create_test_project(vec![
        ("axum/src/main.rs", include_str!("fixtures/axum_project.rs")),
        ("actix/src/main.rs", include_str!("fixtures/actix_project.rs")),
        ("tide/src/main.rs", include_str!("fixtures/tide_project.rs")),
    ]);
    let scan_result = FileScanner::new(temp_dir.path().to_path_buf()).scan().unwrap();
    assert_eq!(scan_result.rust_files.len(), 3);

    let parsed_files = AstParser::load(&scan_result.rust_files, false).unwrap();
    let detection = FrameworkDetector::detect(&parsed_files);
    assert_eq!(
        detection.frameworks,
        vec![Framework::Axum, Framework::ActixWeb, Framework::Tide]
    );
}

#[test]
fn test_openapi_document_structure() {
    let temp_dir = create_test_project(vec![("src/main.rs", include_str!("fixtures/axum_project.rs"))]);
    let records = analyze(&temp_dir, &AxumProvider, &AnalyzerConfig::default());

    let json = serialize_json(&build_document(&records)).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(doc["openapi"], "3.0.0");
    let get_user = &doc["paths"]["/api/v1/users/{id}"]["get"];
    assert_eq!(get_user["operationId"], "get_user");
    assert_eq!(get_user["parameters"][0]["name"], "id");
    assert_eq!(get_user["parameters"][0]["in"], "path");
    assert_eq!(get_user["parameters"][0]["schema"]["type"], "integer");

    let list_users = &doc["paths"]["/api/v1/users"]["get"];
    let query_names: Vec<_> = list_users["parameters"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(query_names, vec!["limit", "page"]);

    let create_user = &doc["paths"]["/api/v1/users"]["post"];
    assert_eq!(
        create_user["requestBody"]["content"]["application/json"]["schema"]["title"],
        "CreateUserRequest"
    );
    assert!(doc["components"]["schemas"]["User"].is_object());
}

#[test]
fn test_route_document_yaml() {
    let temp_dir = create_test_project(vec![("src/main.rs", include_str!("fixtures/tide_project.rs"))]);
    let records = analyze(&temp_dir, &TideProvider, &AnalyzerConfig::default());

    let yaml = serialize_yaml(&records).unwrap();
    let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
    let first = &value[0];
    assert_eq!(first["method"], serde_yaml::Value::from("GET"));
    assert_eq!(first["path"], serde_yaml::Value::from("/health"));
    assert_eq!(first["module"], serde_yaml::Value::from("crate"));
}

#[test]
fn test_cli_run_writes_documents() {
    let temp_dir = create_test_project(vec![("src/main.rs", include_str!("fixtures/axum_project.rs"))]);
    let routes_path = temp_dir.path().join("out/routes.json");
    let openapi_path = temp_dir.path().join("out/openapi.yaml");

    let args = CliArgs::try_parse_from([
        "route-surface".as_ref(),
        temp_dir.path().as_os_str(),
        "-f".as_ref(),
        "json".as_ref(),
        "-o".as_ref(),
        routes_path.as_os_str(),
    ])
    .unwrap();
    cli::run(args).unwrap();

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&routes_path).unwrap()).unwrap();
    assert_eq!(doc["framework"], "axum");
    assert_eq!(doc["routes"].as_array().unwrap().len(), 5);

    let args = CliArgs::try_parse_from([
        "route-surface".as_ref(),
        temp_dir.path().as_os_str(),
        "-s".as_ref(),
        "openapi".as_ref(),
        "-o".as_ref(),
        openapi_path.as_os_str(),
    ])
    .unwrap();
    cli::run(args).unwrap();

    let doc: serde_yaml::Value =
        serde_yaml::from_str(&std::fs::read_to_string(&openapi_path).unwrap()).unwrap();
    assert!(doc["paths"]["/health"]["get"].is_mapping());

    let yapi_path = temp_dir.path().join("out/yapi.json");
    let args = CliArgs::try_parse_from([
        "route-surface".as_ref(),
        temp_dir.path().as_os_str(),
        "-s".as_ref(),
        "yapi".as_ref(),
        "-f".as_ref(),
        "json".as_ref(),
        "-o".as_ref(),
        yapi_path.as_os_str(),
    ])
    .unwrap();
    cli::run(args).unwrap();

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&yapi_path).unwrap()).unwrap();
    let project_name = temp_dir.path().file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(doc["info"]["name"], project_name.as_str());
    assert_eq!(doc["interfaces"].as_array().unwrap().len(), 5);
    assert_eq!(doc["categories"][0]["_id"], 1);
}

#[test]
fn test_cli_errors() {
    // nothing to scan
    let empty = TempDir::new().unwrap();
    let args = CliArgs::try_parse_from(["route-surface".as_ref(), empty.path().as_os_str()]).unwrap();
    assert!(cli::run(args).is_err());

    // no framework imports
    let plain = create_test_project(vec![("src/main.rs", "fn main() {}")]);
    let args = CliArgs::try_parse_from(["route-surface".as_ref(), plain.path().as_os_str()]).unwrap();
    let err = cli::run(args).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::FrameworkNotDetected)));
}

#[test]
fn test_lenient_loading_skips_broken_files() {
    let temp_dir = create_test_project(vec![
        ("src/main.rs", include_str!("fixtures/tide_project.rs")),
        ("src/broken.rs", "pub fn broken( {"),
    ]);
    let output = temp_dir.path().join("routes.yaml");

    let strict = CliArgs::try_parse_from([
        "route-surface".as_ref(),
        temp_dir.path().as_os_str(),
        "-o".as_ref(),
        output.as_os_str(),
    ])
    .unwrap();
    let err = cli::run(strict).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::LoadError { .. })));

    let lenient = CliArgs::try_parse_from([
        "route-surface".as_ref(),
        temp_dir.path().as_os_str(),
        "--lenient".as_ref(),
        "-o".as_ref(),
        output.as_os_str(),
    ])
    .unwrap();
    cli::run(lenient).unwrap();
    assert!(output.exists());
}
