//! Construction-time server options.
//!
//! A [`ServerConfig`] starts from defaults (usually derived from
//! [`ServerSettings`]) and is folded through an ordered list of
//! [`ServerOption`] values, then frozen behind an `Arc`.
//!
//! Most options are plain setters where the last call wins. Three compose
//! differently:
//! - [`set_root_middlewares`] replaces the whole chain
//! - [`add_root_middlewares`] appends to the chain
//! - [`add_query_options`] folds nested [`QueryOption`]s into the query sub-options

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::{get, MethodRouter};

use crate::config::engine::EngineSettings;
use crate::config::schema::ServerSettings;
use crate::http::error::{default_error_handler, ErrorHandler, HttpError, RequestSummary};
use crate::http::handlers;
use crate::http::middleware::{default_chain, ChainContext, Middleware};
use crate::net::matcher::Http1Matcher;
use crate::net::mux::SharedListener;
use crate::query::{QueryOption, QueryOptions};

/// Callback adjusting [`EngineSettings`] before the server starts.
pub type EngineTuning = Arc<dyn Fn(&mut EngineSettings) + Send + Sync>;

/// Handler answering `GET /`.
#[derive(Clone)]
pub struct RootHandler {
    name: String,
    endpoint: MethodRouter,
}

impl RootHandler {
    pub fn new<H, T>(handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self {
            name: type_name::<H>().to_string(),
            endpoint: get(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn endpoint(&self) -> MethodRouter {
        self.endpoint.clone()
    }
}

/// The effective configuration of one server instance.
///
/// Immutable once resolved; every field is read through a getter.
#[derive(Clone)]
pub struct ServerConfig {
    port: u16,
    root_path: String,
    debug: bool,
    middlewares: Vec<Middleware>,
    root_handler: RootHandler,
    error_handler: ErrorHandler,
    include_query: bool,
    shared_listener: Option<SharedListener>,
    http1_matcher: Http1Matcher,
    trace_max_log_size: usize,
    engine_tuning: Option<EngineTuning>,
    query: QueryOptions,
}

impl ServerConfig {
    /// Defaults derived from a settings file.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            port: settings.port,
            root_path: settings.root_path.clone(),
            debug: settings.debug,
            middlewares: default_chain(settings),
            root_handler: RootHandler::new(handlers::default_root),
            error_handler: default_error_handler(),
            include_query: false,
            shared_listener: None,
            http1_matcher: Http1Matcher::default(),
            trace_max_log_size: settings.tracing.max_log_size,
            engine_tuning: None,
            query: QueryOptions::default(),
        }
    }

    /// Apply `overrides` in order and freeze the result.
    pub fn resolve<I>(self, overrides: I) -> Arc<ServerConfig>
    where
        I: IntoIterator<Item = ServerOption>,
    {
        Arc::new(
            overrides
                .into_iter()
                .fold(self, |config, option| option.apply(config)),
        )
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn middlewares(&self) -> &[Middleware] {
        &self.middlewares
    }

    pub fn root_handler(&self) -> &RootHandler {
        &self.root_handler
    }

    pub fn error_handler(&self) -> &ErrorHandler {
        &self.error_handler
    }

    pub fn include_query(&self) -> bool {
        self.include_query
    }

    pub fn shared_listener(&self) -> Option<&SharedListener> {
        self.shared_listener.as_ref()
    }

    /// Matcher used to claim HTTP/1 connections from a shared listener.
    pub fn http1_matcher(&self) -> &Http1Matcher {
        &self.http1_matcher
    }

    pub fn trace_max_log_size(&self) -> usize {
        self.trace_max_log_size
    }

    pub fn query_options(&self) -> &QueryOptions {
        &self.query
    }

    /// Values the built-in middleware read per request.
    pub fn chain_context(&self) -> ChainContext {
        ChainContext {
            debug: self.debug,
            max_log_size: self.trace_max_log_size,
        }
    }

    /// Engine settings after the tuning callback, if any, ran.
    pub fn engine_settings(&self) -> EngineSettings {
        let mut settings = EngineSettings::default();
        if let Some(tune) = &self.engine_tuning {
            tune(&mut settings);
        }
        settings
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("root_path", &self.root_path)
            .field("debug", &self.debug)
            .field("middlewares", &self.middlewares)
            .field("root_handler", &self.root_handler.name)
            .field("include_query", &self.include_query)
            .field("shared_listener", &self.shared_listener.is_some())
            .field("http1_matcher", &self.http1_matcher)
            .field("trace_max_log_size", &self.trace_max_log_size)
            .field("engine_tuning", &self.engine_tuning.is_some())
            .field("query", &self.query)
            .finish()
    }
}

/// One override of a [`ServerConfig`].
pub struct ServerOption(Box<dyn FnOnce(ServerConfig) -> ServerConfig + Send>);

impl ServerOption {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(ServerConfig) -> ServerConfig + Send + 'static,
    {
        Self(Box::new(f))
    }

    fn apply(self, config: ServerConfig) -> ServerConfig {
        (self.0)(config)
    }
}

/// Listening port. Not range-checked: bad values fail at bind time.
pub fn with_port(port: u16) -> ServerOption {
    ServerOption::new(move |mut c| {
        c.port = port;
        c
    })
}

/// Path prefix for module and query-protocol routes.
pub fn with_root_path(root_path: impl Into<String>) -> ServerOption {
    let root_path = root_path.into();
    ServerOption::new(move |mut c| {
        c.root_path = root_path;
        c
    })
}

pub fn with_debug_mode(debug: bool) -> ServerOption {
    ServerOption::new(move |mut c| {
        c.debug = debug;
        c
    })
}

pub fn with_root_handler<H, T>(handler: H) -> ServerOption
where
    H: Handler<T, ()>,
    T: 'static,
{
    let root = RootHandler::new(handler);
    ServerOption::new(move |mut c| {
        c.root_handler = root;
        c
    })
}

pub fn with_error_handler<F>(handler: F) -> ServerOption
where
    F: Fn(&HttpError, &RequestSummary) -> axum::response::Response + Send + Sync + 'static,
{
    let handler: ErrorHandler = Arc::new(handler);
    ServerOption::new(move |mut c| {
        c.error_handler = handler;
        c
    })
}

/// Claim the HTTP sub-stream of a protocol-multiplexing listener instead of
/// binding a dedicated one.
pub fn with_shared_listener(listener: SharedListener) -> ServerOption {
    ServerOption::new(move |mut c| {
        c.shared_listener = Some(listener);
        c
    })
}

/// Replace the matcher that claims HTTP/1 connections on a shared listener.
pub fn with_http1_matcher(matcher: Http1Matcher) -> ServerOption {
    ServerOption::new(move |mut c| {
        c.http1_matcher = matcher;
        c
    })
}

/// Also claim HTTP/1 connections using non-standard methods, such as the
/// verbs some health checkers send.
pub fn with_extra_http_methods<I, M>(methods: I) -> ServerOption
where
    I: IntoIterator<Item = M>,
    M: AsRef<str>,
{
    let matcher = Http1Matcher::with_extra_methods(methods);
    with_http1_matcher(matcher)
}

/// Cap the payload bytes the tracer records per request and response.
pub fn with_trace_max_log_size(max: usize) -> ServerOption {
    ServerOption::new(move |mut c| {
        c.trace_max_log_size = max;
        c
    })
}

/// Mount the embedded query-protocol endpoints.
pub fn with_query_protocol(include: bool) -> ServerOption {
    ServerOption::new(move |mut c| {
        c.include_query = include;
        c
    })
}

pub fn with_engine_tuning<F>(tune: F) -> ServerOption
where
    F: Fn(&mut EngineSettings) + Send + Sync + 'static,
{
    let tune: EngineTuning = Arc::new(tune);
    ServerOption::new(move |mut c| {
        c.engine_tuning = Some(tune);
        c
    })
}

/// Replace the root middleware chain, discarding every earlier entry.
pub fn set_root_middlewares<I>(middlewares: I) -> ServerOption
where
    I: IntoIterator<Item = Middleware>,
{
    let middlewares: Vec<Middleware> = middlewares.into_iter().collect();
    ServerOption::new(move |mut c| {
        c.middlewares = middlewares;
        c
    })
}

/// Append to the root middleware chain.
pub fn add_root_middlewares<I>(middlewares: I) -> ServerOption
where
    I: IntoIterator<Item = Middleware>,
{
    let middlewares: Vec<Middleware> = middlewares.into_iter().collect();
    ServerOption::new(move |mut c| {
        c.middlewares.extend(middlewares);
        c
    })
}

/// Apply query-protocol sub-options in order.
pub fn add_query_options<I>(options: I) -> ServerOption
where
    I: IntoIterator<Item = QueryOption>,
{
    let options: Vec<QueryOption> = options.into_iter().collect();
    ServerOption::new(move |mut c| {
        c.query = options
            .into_iter()
            .fold(c.query, |query, option| option.apply(query));
        c
    })
}
