//! Route composition, middleware ordering and error translation, served
//! in-process through the composed router.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Deserialize;

use rest_server::config::options::{
    add_query_options, add_root_middlewares, set_root_middlewares, with_debug_mode,
    with_error_handler, with_query_protocol, with_root_handler, with_root_path,
};
use rest_server::http::{HttpError, HttpServer, Middleware, ServerError};
use rest_server::query::playground_title;
use rest_server::routing::{RouteError, RouteMethod};

mod common;
use common::{body_json, body_text, context, get, get_with_auth, FnModule, RecordingModule, StubEngine};

fn tagging(name: &'static str) -> Middleware {
    Middleware::new(name, move |router: Router| {
        router.layer(axum::middleware::map_response(move |mut response: Response| async move {
            response
                .headers_mut()
                .append("x-chain", HeaderValue::from_static(name));
            response
        }))
    })
}

#[tokio::test]
async fn root_reports_service_status() {
    let server = HttpServer::new(&context(), []).unwrap();
    let response = get(server.router(), "/").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["message"], "Service up and running");
    assert!(body["uptime_secs"].is_u64());
}

#[tokio::test]
async fn root_handler_can_be_replaced() {
    let server = HttpServer::new(&context(), [with_root_handler(|| async { "custom root" })]).unwrap();
    let response = get(server.router(), "/").await;
    assert_eq!(body_text(response).await, "custom root");
}

#[tokio::test]
async fn memstats_requires_basic_auth() {
    let server = HttpServer::new(&context(), []).unwrap();

    let denied = get(server.router(), "/memstats").await;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    assert!(denied.headers().contains_key(header::WWW_AUTHENTICATE));
    assert_eq!(body_json(denied).await["code"], 401);

    let allowed = get_with_auth(server.router(), "/memstats").await;
    assert_eq!(allowed.status(), StatusCode::OK);
    let body = body_json(allowed).await;
    assert!(body.get("physical_mem_bytes").is_some());
    assert!(body["uptime_secs"].is_u64());
}

#[tokio::test]
async fn basic_auth_does_not_leak_onto_other_routes() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let service = context().with_module(Arc::new(RecordingModule::new("open", &log)));
    let server = HttpServer::new(&service, []).unwrap();

    assert_eq!(get(server.router(), "/open").await.status(), StatusCode::OK);
    assert_eq!(get(server.router(), "/missing").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_path_names_the_resource() {
    let server = HttpServer::new(&context(), []).unwrap();
    let response = get(server.router(), "/does/not/exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );

    let body = body_json(response).await;
    assert_eq!(body["code"], 404);
    assert_eq!(body["message"], r#"Resource "GET /does/not/exist" not found"#);
}

#[tokio::test]
async fn module_hooks_run_once_in_module_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let service = context()
        .with_module(Arc::new(RecordingModule::new("alpha", &log)))
        .with_module(Arc::new(RecordingModule::new("beta", &log)));
    let server = HttpServer::new(&service, [with_root_path("/api")]).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["alpha.rest", "alpha.server", "beta.rest", "beta.server"]
    );

    let response = get(server.router(), "/api/beta").await;
    assert_eq!(body_text(response).await, "beta");

    let raw = Request::post("/api/alpha/raw").body(Body::empty()).unwrap();
    let response = common::send(server.router(), raw).await;
    assert_eq!(body_text(response).await, "alpha raw");

    // Module routes live under the prefix only.
    assert_eq!(get(server.router(), "/beta").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn modules_without_hooks_contribute_nothing() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut quiet = RecordingModule::new("quiet", &log);
    quiet.rest = false;
    quiet.server = false;
    let server = HttpServer::new(&context().with_module(Arc::new(quiet)), []).unwrap();

    assert!(log.lock().unwrap().is_empty());
    assert!(server.routes().listing().is_empty());
}

#[tokio::test]
async fn listing_is_sorted_and_skips_builtins() {
    let service = context().with_module(Arc::new(FnModule::new("users", |g| {
        g.post("/users", || async { "created" })
            .get("/accounts", || async { "accounts" })
            .get("/users", || async { "users" });
    })));
    let server = HttpServer::new(&service, [with_root_path("/v1")]).unwrap();

    let listed: Vec<(String, String)> = server
        .routes()
        .listing()
        .iter()
        .map(|e| (e.method.to_string(), e.path.clone()))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("GET".to_string(), "/v1/accounts".to_string()),
            ("POST".to_string(), "/v1/users".to_string()),
            ("GET".to_string(), "/v1/users".to_string()),
        ]
    );
    assert!(server
        .routes()
        .listing()
        .iter()
        .all(|e| e.path != "/" && e.path != "/memstats"));
}

#[tokio::test]
async fn query_protocol_adds_three_routes() {
    let engine = Arc::new(StubEngine::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let service = context()
        .with_module(Arc::new(RecordingModule::new("catalog", &log)))
        .with_query_engine(engine.clone());

    let without = HttpServer::new(&service, [with_root_path("/api")]).unwrap();
    let with = HttpServer::new(
        &service,
        [
            with_root_path("/api"),
            with_query_protocol(true),
            add_query_options([playground_title("Catalog")]),
        ],
    )
    .unwrap();

    let graphql = |server: &HttpServer| -> Vec<(RouteMethod, String)> {
        server
            .routes()
            .listing()
            .iter()
            .filter(|e| e.path.contains("/graphql"))
            .map(|e| (e.method.clone(), e.path.clone()))
            .collect()
    };
    assert!(graphql(&without).is_empty());
    assert_eq!(
        graphql(&with),
        vec![
            (RouteMethod::Any, "/api/graphql".to_string()),
            (RouteMethod::Only(Method::GET), "/api/graphql/playground".to_string()),
            (RouteMethod::Only(Method::GET), "/api/graphql/voyager".to_string()),
        ]
    );
    assert_eq!(*engine.seen_modules.lock().unwrap(), vec!["catalog"]);
    assert_eq!(engine.seen_title.lock().unwrap().as_deref(), Some("Catalog"));

    let post = Request::post("/api/graphql").body(Body::empty()).unwrap();
    let response = common::send(with.router(), post).await;
    assert_eq!(body_text(response).await, "executed POST");
    let response = get(with.router(), "/api/graphql/playground").await;
    assert_eq!(body_text(response).await, "playground");
    let response = get(with.router(), "/api/graphql/voyager").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn root_middlewares_wrap_outer_to_inner() {
    let server = HttpServer::new(
        &context(),
        [
            set_root_middlewares([tagging("first")]),
            add_root_middlewares([tagging("second")]),
        ],
    )
    .unwrap();

    let response = get(server.router(), "/").await;
    let chain: Vec<_> = response
        .headers()
        .get_all("x-chain")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    // The innermost middleware touches the response first.
    assert_eq!(chain, vec!["second", "first"]);
}

#[tokio::test]
async fn user_middleware_sees_translated_errors() {
    let seen = Arc::new(Mutex::new(None));
    let observer = {
        let seen = Arc::clone(&seen);
        Middleware::new("observer", move |router: Router| {
            let seen = Arc::clone(&seen);
            router.layer(axum::middleware::map_response(move |response: Response| {
                let seen = Arc::clone(&seen);
                async move {
                    *seen.lock().unwrap() = response
                        .headers()
                        .get(header::CONTENT_TYPE)
                        .map(|v| v.to_str().unwrap().to_string());
                    response
                }
            }))
        })
    };
    let server = HttpServer::new(&context(), [add_root_middlewares([observer])]).unwrap();

    let response = get(server.router(), "/nowhere").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(seen.lock().unwrap().as_deref(), Some("application/json"));
}

#[tokio::test]
async fn handler_errors_are_rendered() {
    let service = context().with_module(Arc::new(FnModule::new("failing", |g| {
        g.get("/fail", || async {
            Err::<&str, _>(HttpError::bad_request("name is required"))
        });
    })));
    let server = HttpServer::new(&service, []).unwrap();

    let response = get(server.router(), "/fail").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], 400);
    assert_eq!(body["message"], "name is required");
}

#[tokio::test]
async fn custom_error_handler_renders_errors() {
    let server = HttpServer::new(
        &context(),
        [with_error_handler(|error, request| {
            (
                error.status(),
                format!("{} failed on {}", request.method, request.path),
            )
                .into_response()
        })],
    )
    .unwrap();

    let response = get(server.router(), "/gone").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "GET failed on /gone");
}

async fn explode() -> &'static str {
    panic!("boom")
}

fn panicking_service() -> rest_server::ServiceContext {
    context().with_module(Arc::new(FnModule::new("panicking", |g| {
        g.get("/panic", explode);
    })))
}

#[tokio::test]
async fn panics_become_internal_errors() {
    let server = HttpServer::new(&panicking_service(), []).unwrap();
    let response = get(server.router(), "/panic").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["code"], 500);
    assert!(body["message"].as_str().unwrap().contains("boom"));

    let quiet = HttpServer::new(&panicking_service(), [with_debug_mode(false)]).unwrap();
    let response = get(quiet.router(), "/panic").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["message"], "Internal Server Error");
}

#[test]
fn duplicate_routes_fail_construction() {
    let first = FnModule::new("first", |g| {
        g.get("/dup", || async { "first" });
    });
    let second = FnModule::new("second", |g| {
        g.any("/dup", || async { "second" });
    });
    let service = context()
        .with_module(Arc::new(first))
        .with_module(Arc::new(second));

    let err = HttpServer::new(&service, []).unwrap_err();
    match err {
        ServerError::Route(RouteError::Conflict { path, .. }) => assert_eq!(path, "/dup"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn module_route_colliding_with_root_fails() {
    let service = context().with_module(Arc::new(FnModule::new("shadow", |g| {
        g.get("/", || async { "shadow" });
    })));
    assert!(matches!(
        HttpServer::new(&service, []),
        Err(ServerError::Route(RouteError::Conflict { .. }))
    ));
}

#[test]
fn raw_mount_overlapping_a_declared_route_fails() {
    let service = context().with_module(Arc::new(FnModule::new("overlap", |g| {
        g.get("/ping", || async { "declared" });
        g.raw(|router| router.route("/ping", axum::routing::get(|| async { "raw" })));
    })));

    match HttpServer::new(&service, []) {
        Err(ServerError::Route(RouteError::Engine { message, .. })) => {
            assert!(message.contains("/ping"), "got {message:?}");
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[test]
fn legacy_capture_syntax_fails_construction() {
    let service = context().with_module(Arc::new(FnModule::new("legacy", |g| {
        g.get("/users/:id", || async { "user" });
    })));

    match HttpServer::new(&service, [with_root_path("/api")]) {
        Err(ServerError::Route(RouteError::InvalidPath { path, .. })) => {
            assert_eq!(path, "/api/users/:id");
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

async fn create_user(Json(user): Json<NewUser>) -> String {
    user.name
}

#[tokio::test]
async fn extractor_rejections_use_the_error_body() {
    let service = context().with_module(Arc::new(FnModule::new("users", |g| {
        g.post("/users", create_user);
    })));
    let server = HttpServer::new(&service, []).unwrap();

    let malformed = Request::post("/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{bad"))
        .unwrap();
    let response = common::send(server.router(), malformed).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let body = body_json(response).await;
    assert_eq!(body["code"], 400);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Failed to parse the request body as JSON"));

    let untyped = Request::post("/users").body(Body::from("{}")).unwrap();
    let response = common::send(server.router(), untyped).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body_json(response).await["code"], 415);

    let valid = Request::post("/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"name":"ada"}"#))
        .unwrap();
    let response = common::send(server.router(), valid).await;
    assert_eq!(body_text(response).await, "ada");
}
