//! HTTP server composition and lifecycle.
//!
//! # Responsibilities
//! - Resolve options into an immutable [`ServerConfig`]
//! - Compose built-in, module and query-protocol routes into one router
//! - Wrap the router with error translation, panic recovery and the
//!   configured middleware chain
//! - Accept connections on a dedicated or shared listener
//! - Drain connections on shutdown, aborting what outlives the deadline
//!
//! # Design Decisions
//! - Everything that can fail on bad input fails in [`HttpServer::new`];
//!   `serve` only fails on bind
//! - Error translation sits inside the middleware chain so user
//!   middleware observes the final response
//! - A connection is told to close once its in-flight request completes;
//!   connections still open at the deadline are dropped without a response

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::http::Method;
use axum::middleware;
use axum::routing::{any_service, get_service};
use axum::{Extension, Router};
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::engine::EngineSettings;
use crate::config::options::{ServerConfig, ServerOption};
use crate::http::error::{not_found, panic_response, translate_errors};
use crate::http::handlers;
use crate::http::middleware::apply_chain;
use crate::lifecycle::{Lifecycle, LifecycleState, ShutdownSignal};
use crate::net::connection::{ConnectionSlot, ConnectionTracker};
use crate::net::listener::{is_connection_error, ListenerError, ServerListener};
use crate::net::mux::MuxError;
use crate::net::stream::PrefixedStream;
use crate::routing::group::{join_path, normalize_prefix, RouteGroup};
use crate::routing::module::{ServerKind, ServiceContext};
use crate::routing::table::{RouteError, RouteMethod, RouteTable};

/// Construction failures. The server never starts.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to claim shared listener: {0}")]
    SharedListener(#[from] MuxError),
    #[error("route registration failed: {0}")]
    Route(#[from] RouteError),
    #[error("query protocol enabled but the service provides no query engine")]
    MissingQueryEngine,
}

/// Failures of [`HttpServer::serve`].
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Bind(ListenerError),
    #[error("server is already serving")]
    AlreadyServing,
}

impl ServeError {
    /// Whether the process should give up. Bind failures are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServeError::Bind(_))
    }
}

/// Why the accept loop ended.
enum Stop {
    Shutdown(Instant),
    ListenerClosed,
}

/// Marks the lifecycle stopped however `serve` exits.
struct StoppedGuard<'a>(&'a Lifecycle);

impl Drop for StoppedGuard<'_> {
    fn drop(&mut self) {
        self.0.mark_stopped();
    }
}

/// The HTTP application server.
pub struct HttpServer {
    service: String,
    config: Arc<ServerConfig>,
    engine: EngineSettings,
    router: Router,
    routes: RouteTable,
    listener: Mutex<Option<ServerListener>>,
    lifecycle: Lifecycle,
    shutdown: ShutdownSignal,
}

impl HttpServer {
    /// Compose a server from built-in defaults and `options`.
    pub fn new<I>(service: &ServiceContext, options: I) -> Result<Self, ServerError>
    where
        I: IntoIterator<Item = ServerOption>,
    {
        Self::from_config(service, ServerConfig::default(), options)
    }

    /// Compose a server from `base` (usually built from a settings file)
    /// with `options` layered on top.
    pub fn from_config<I>(
        service: &ServiceContext,
        base: ServerConfig,
        options: I,
    ) -> Result<Self, ServerError>
    where
        I: IntoIterator<Item = ServerOption>,
    {
        let config = base.resolve(options);
        let engine = config.engine_settings();

        let (router, routes) = compose_routes(service, &config)?;
        let router = router
            .fallback(not_found)
            .layer(CatchPanicLayer::custom(panic_response(config.debug())))
            .layer(middleware::from_fn_with_state(
                config.error_handler().clone(),
                translate_errors,
            ));
        let router = apply_chain(router, config.middlewares())
            .layer(Extension(config.chain_context()));

        let listener = match config.shared_listener() {
            Some(shared) => Some(ServerListener::Shared(
                shared.match_with(config.http1_matcher().clone())?,
            )),
            None => None,
        };

        routes.log_listing();
        tracing::debug!(
            service = %service.name(),
            middlewares = ?config.middlewares(),
            shared_listener = listener.is_some(),
            "HTTP server composed"
        );

        Ok(Self {
            service: service.name().to_string(),
            config,
            engine,
            router,
            routes,
            listener: Mutex::new(listener),
            lifecycle: Lifecycle::new(),
            shutdown: ShutdownSignal::new(),
        })
    }

    /// Protocol name of this server.
    pub fn name(&self) -> &'static str {
        ServerKind::Rest.as_str()
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    pub fn engine_settings(&self) -> &EngineSettings {
        &self.engine
    }

    /// Every registration made while composing, in mount order.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// The fully wrapped router, for serving requests in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Bind the dedicated listener now instead of in `serve`.
    ///
    /// Returns the bound address; with port 0 this is where the OS put it.
    pub async fn bind(&self) -> Result<SocketAddr, ServeError> {
        if let Some(addr) = self.held_addr() {
            return Ok(addr);
        }
        let listener = ServerListener::bind(self.config.port())
            .await
            .map_err(ServeError::Bind)?;
        let addr = listener
            .local_addr()
            .map_err(|source| {
                ServeError::Bind(ListenerError::Bind {
                    addr: SocketAddr::from(([0, 0, 0, 0], self.config.port())),
                    source,
                })
            })?;

        let mut held = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        // A concurrent bind may have won; keep the first listener.
        match held.as_ref().and_then(|l| l.local_addr().ok()) {
            Some(existing) => Ok(existing),
            None => {
                *held = Some(listener);
                Ok(addr)
            }
        }
    }

    /// Accept and serve connections until shutdown.
    ///
    /// Returns `Ok(())` after a clean stop, including when `shutdown` ran
    /// first.
    pub async fn serve(&self) -> Result<(), ServeError> {
        match self.lifecycle.begin_serving() {
            Ok(()) => {}
            Err(LifecycleState::Serving) => return Err(ServeError::AlreadyServing),
            Err(_) => return Ok(()),
        }
        let _stopped = StoppedGuard(&self.lifecycle);

        let mut listener = match self.take_listener() {
            Some(listener) => listener,
            None => match ServerListener::bind(self.config.port()).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!(error = %e, "HTTP server failed to bind");
                    return Err(ServeError::Bind(e));
                }
            },
        };

        match listener.local_addr() {
            Ok(addr) => tracing::info!(
                service = %self.service,
                shared = listener.is_shared(),
                "HTTP server run at port {}",
                addr
            ),
            Err(e) => tracing::warn!(error = %e, "HTTP server address unavailable"),
        }

        let tracker = ConnectionTracker::new(self.engine.max_connections);
        let mut connections = JoinSet::new();
        let mut shutdown = self.shutdown.subscribe();

        let stop = loop {
            tokio::select! {
                deadline = shutdown.triggered() => break Stop::Shutdown(deadline),
                Some(_) = connections.join_next() => {}
                accepted = accept_next(&tracker, &mut listener) => match accepted {
                    Ok((slot, stream, peer)) => {
                        self.spawn_connection(&mut connections, &tracker, slot, stream, peer);
                    }
                    Err(ListenerError::Closed) => {
                        tracing::info!("HTTP listener closed");
                        break Stop::ListenerClosed;
                    }
                    Err(ListenerError::Accept(e)) if is_connection_error(&e) => {
                        tracing::debug!(error = %e, "Connection failed during accept");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        };

        tracker.close();
        listener.close();

        let deadline = match stop {
            Stop::Shutdown(deadline) => Some(deadline),
            Stop::ListenerClosed => {
                self.lifecycle.begin_shutdown();
                tokio::select! {
                    _ = join_all(&mut connections) => None,
                    deadline = shutdown.triggered() => Some(deadline),
                }
            }
        };

        if let Some(deadline) = deadline {
            tracing::info!(
                active_connections = tracker.active_count(),
                "Draining HTTP connections"
            );
            if tokio::time::timeout_at(deadline, join_all(&mut connections))
                .await
                .is_err()
            {
                let abandoned = connections.len();
                connections.abort_all();
                join_all(&mut connections).await;
                tracing::warn!(
                    abandoned,
                    "Shutdown deadline passed, closed connections without response"
                );
            }
        }

        tracing::info!("Stopping HTTP server: SUCCESS");
        Ok(())
    }

    /// Stop accepting, let in-flight requests finish for up to `grace`,
    /// then drop what is left. Returns once the server is stopped.
    pub async fn shutdown(&self, grace: Duration) {
        match self.lifecycle.begin_shutdown() {
            LifecycleState::Constructed => {
                self.shutdown.trigger(grace);
                if let Some(listener) = self.take_listener() {
                    listener.close();
                }
                tracing::info!("Stopping HTTP server: SUCCESS");
            }
            _ => {
                self.shutdown.trigger(grace);
                self.lifecycle.wait_stopped().await;
            }
        }
    }

    fn take_listener(&self) -> Option<ServerListener> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn held_addr(&self) -> Option<SocketAddr> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    fn spawn_connection(
        &self,
        connections: &mut JoinSet<()>,
        tracker: &ConnectionTracker,
        slot: ConnectionSlot,
        stream: PrefixedStream,
        peer: SocketAddr,
    ) {
        let guard = tracker.track(slot);
        let builder = self.engine.connection_builder();
        let service = TowerToHyperService::new(self.router.clone());
        let mut shutdown = self.shutdown.subscribe();

        connections.spawn(async move {
            tracing::trace!(connection_id = %guard.id(), peer_addr = %peer, "Connection accepted");
            let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
            let mut conn = std::pin::pin!(conn);
            let mut draining = false;
            loop {
                tokio::select! {
                    result = conn.as_mut() => {
                        if let Err(e) = result {
                            tracing::debug!(
                                connection_id = %guard.id(),
                                error = %e,
                                "Connection ended with error"
                            );
                        }
                        break;
                    }
                    _ = shutdown.triggered(), if !draining => {
                        draining = true;
                        conn.as_mut().graceful_shutdown();
                    }
                }
            }
            drop(guard);
        });
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("service", &self.service)
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("routes", &self.routes.entries().len())
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

async fn accept_next(
    tracker: &ConnectionTracker,
    listener: &mut ServerListener,
) -> Result<(ConnectionSlot, PrefixedStream, SocketAddr), ListenerError> {
    let slot = tracker.reserve().await.ok_or(ListenerError::Closed)?;
    let (stream, peer) = listener.accept().await?;
    Ok((slot, stream, peer))
}

async fn join_all(connections: &mut JoinSet<()>) {
    while connections.join_next().await.is_some() {}
}

/// Mount built-in, module and query-protocol routes.
fn compose_routes(
    service: &ServiceContext,
    config: &ServerConfig,
) -> Result<(Router, RouteTable), ServerError> {
    let query_engine = if config.include_query() {
        Some(
            service
                .query_engine()
                .ok_or(ServerError::MissingQueryEngine)?,
        )
    } else {
        None
    };

    let mut routes = RouteTable::new();
    let mut errors = Vec::new();
    let router = {
        let mut root = RouteGroup::new(&mut routes, &mut errors, "");

        let root_handler = config.root_handler();
        root.mount(
            RouteMethod::Only(Method::GET),
            "/",
            root_handler.name(),
            root_handler.endpoint(),
        );
        root.group("", |g| {
            g.use_middleware(service.basic_auth().clone());
            g.get("/memstats", handlers::memstats);
        });

        root.group(config.root_path(), |g| {
            for module in service.modules() {
                if let Some(handler) = module.rest_handler() {
                    tracing::debug!(module = %module.name(), "Mounting REST handler");
                    handler.mount(g);
                }
                if let Some(handler) = module.server_handler(ServerKind::Rest) {
                    tracing::debug!(module = %module.name(), "Mounting server handler");
                    handler.mount_handlers(g);
                }
            }
        });

        if let Some(engine) = query_engine {
            let prefix = normalize_prefix(config.root_path());
            let query = engine.handlers(service.modules(), config.query_options());
            root.mount(
                RouteMethod::Any,
                &join_path(&prefix, "/graphql"),
                "graphql::execute",
                any_service(query.execute),
            );
            root.mount(
                RouteMethod::Only(Method::GET),
                &join_path(&prefix, "/graphql/playground"),
                "graphql::playground",
                get_service(query.playground),
            );
            root.mount(
                RouteMethod::Only(Method::GET),
                &join_path(&prefix, "/graphql/voyager"),
                "graphql::voyager",
                get_service(query.voyager),
            );
        }

        root.into_router()
    };

    match errors.into_iter().next() {
        Some(error) => Err(ServerError::Route(error)),
        None => Ok((router, routes)),
    }
}
