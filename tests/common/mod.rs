//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use rest_server::config::options::with_port;
use rest_server::http::{BasicAuth, HttpServer, ServeError};
use rest_server::query::{query_service, QueryEngine, QueryHandlers, QueryOptions};
use rest_server::routing::{Module, RestHandler, RouteGroup, ServerHandler, ServerKind, ServiceContext};
use rest_server::{LifecycleState, ServerOption};

pub const USERNAME: &str = "user";
pub const PASSWORD: &str = "secret";

/// `Authorization` value for [`USERNAME`]:[`PASSWORD`].
pub const AUTH_HEADER: &str = "Basic dXNlcjpzZWNyZXQ=";

pub fn context() -> ServiceContext {
    ServiceContext::new("integration", BasicAuth::new(USERNAME, PASSWORD).middleware())
}

/// Run `request` through the server's router without a socket.
pub async fn send(router: Router, request: Request<Body>) -> Response {
    router.oneshot(request).await.unwrap()
}

pub async fn get(router: Router, uri: &str) -> Response {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn get_with_auth(router: Router, uri: &str) -> Response {
    let request = Request::get(uri)
        .header(header::AUTHORIZATION, AUTH_HEADER)
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// A running server on an OS-assigned port.
pub struct Running {
    pub server: Arc<HttpServer>,
    pub addr: SocketAddr,
    pub handle: JoinHandle<Result<(), ServeError>>,
}

/// Compose, bind to port 0 and serve in the background.
pub async fn start(service: &ServiceContext, mut options: Vec<ServerOption>) -> Running {
    options.insert(0, with_port(0));
    let server = Arc::new(HttpServer::new(service, options).unwrap());
    let bound = server.bind().await.unwrap();
    let handle = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve().await }
    });
    while server.state() == LifecycleState::Constructed {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Running {
        server,
        addr: SocketAddr::from((Ipv4Addr::LOCALHOST, bound.port())),
        handle,
    }
}

/// Write a raw request and read until the peer closes or `wait` passes.
///
/// A reset connection yields whatever arrived before it.
pub async fn raw_request(addr: SocketAddr, request: &str, wait: Duration) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    let _ = tokio::time::timeout(wait, async {
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
            }
        }
    })
    .await;
    String::from_utf8_lossy(&received).into_owned()
}

pub fn http_get(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
}

/// Module recording each hook call into a shared log.
pub struct RecordingModule {
    pub name: &'static str,
    pub log: Arc<Mutex<Vec<String>>>,
    pub rest: bool,
    pub server: bool,
}

impl RecordingModule {
    pub fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            log: Arc::clone(log),
            rest: true,
            server: true,
        }
    }
}

impl Module for RecordingModule {
    fn name(&self) -> &str {
        self.name
    }

    fn rest_handler(&self) -> Option<&dyn RestHandler> {
        self.rest.then_some(self as &dyn RestHandler)
    }

    fn server_handler(&self, kind: ServerKind) -> Option<&dyn ServerHandler> {
        (self.server && kind == ServerKind::Rest).then_some(self as &dyn ServerHandler)
    }
}

impl RestHandler for RecordingModule {
    fn mount(&self, group: &mut RouteGroup<'_>) {
        self.log.lock().unwrap().push(format!("{}.rest", self.name));
        let name = self.name;
        group.get(&format!("/{name}"), move || async move { name });
    }
}

impl ServerHandler for RecordingModule {
    fn mount_handlers(&self, group: &mut RouteGroup<'_>) {
        self.log.lock().unwrap().push(format!("{}.server", self.name));
        let name = self.name;
        group.raw(|router| {
            router.route(
                &format!("/{name}/raw"),
                axum::routing::post(move || async move { format!("{name} raw") }),
            )
        });
    }
}

/// Module mounting whatever the closure registers.
pub struct FnModule<F> {
    pub name: &'static str,
    pub mount: F,
}

impl<F> FnModule<F>
where
    F: Fn(&mut RouteGroup<'_>) + Send + Sync,
{
    pub fn new(name: &'static str, mount: F) -> Self {
        Self { name, mount }
    }
}

impl<F> Module for FnModule<F>
where
    F: Fn(&mut RouteGroup<'_>) + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn rest_handler(&self) -> Option<&dyn RestHandler> {
        Some(self)
    }
}

impl<F> RestHandler for FnModule<F>
where
    F: Fn(&mut RouteGroup<'_>) + Send + Sync,
{
    fn mount(&self, group: &mut RouteGroup<'_>) {
        (self.mount)(group)
    }
}

/// Query engine answering with fixed strings.
pub struct StubEngine {
    pub seen_modules: Mutex<Vec<String>>,
    pub seen_title: Mutex<Option<String>>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            seen_modules: Mutex::new(Vec::new()),
            seen_title: Mutex::new(None),
        }
    }
}

impl QueryEngine for StubEngine {
    fn handlers(&self, modules: &[Arc<dyn Module>], options: &QueryOptions) -> QueryHandlers {
        *self.seen_modules.lock().unwrap() = modules.iter().map(|m| m.name().to_string()).collect();
        *self.seen_title.lock().unwrap() = Some(options.playground_title.clone());
        QueryHandlers {
            execute: query_service(|method: Method| async move { format!("executed {method}") }),
            playground: query_service(|| async { "playground" }),
            voyager: query_service(|| async { (StatusCode::OK, "voyager") }),
        }
    }
}
