//! rest-server demo binary.
//!
//! Serves the built-in endpoints plus a small status module. With
//! `--shared`, the port is multiplexed: HTTP requests go to the server and
//! any other connection gets a line-echo service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Path;
use axum::Json;
use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use rest_server::config::loader::load_settings;
use rest_server::config::options::{with_port, with_shared_listener};
use rest_server::config::{ServerConfig, ServerSettings};
use rest_server::http::handlers::mark_started;
use rest_server::http::{BasicAuth, HttpError, HttpServer};
use rest_server::lifecycle::signals::wait_for_signal;
use rest_server::net::{AnyMatcher, PrefixedStream, SharedListener, SubListener};
use rest_server::observability::logging::init_logging;
use rest_server::routing::{Module, RestHandler, RouteGroup, ServiceContext};

#[derive(Debug, Parser)]
#[command(name = "rest-server", version, about = "HTTP application server")]
struct Cli {
    /// Settings file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listening port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Share the port with a line-echo protocol.
    #[arg(long)]
    shared: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

struct StatusModule {
    started: Instant,
}

#[derive(Serialize)]
struct Status {
    service: &'static str,
    uptime_ms: u128,
}

impl Module for StatusModule {
    fn name(&self) -> &str {
        "status"
    }

    fn rest_handler(&self) -> Option<&dyn RestHandler> {
        Some(self)
    }
}

impl RestHandler for StatusModule {
    fn mount(&self, group: &mut RouteGroup<'_>) {
        let started = self.started;
        group
            .get("/status", move || async move {
                Json(Status {
                    service: "rest-server",
                    uptime_ms: started.elapsed().as_millis(),
                })
            })
            .get("/echo/{message}", echo);
    }
}

async fn echo(Path(message): Path<String>) -> Result<String, HttpError> {
    if message.len() > 256 {
        return Err(HttpError::bad_request("message too long"));
    }
    Ok(message)
}

async fn serve_echo(mut listener: SubListener) {
    while let Ok((stream, peer)) = listener.accept().await {
        tokio::spawn(async move {
            if let Err(e) = echo_lines(stream).await {
                tracing::debug!(peer_addr = %peer, error = %e, "Echo connection failed");
            }
        });
    }
}

async fn echo_lines(stream: PrefixedStream) -> std::io::Result<()> {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    mark_started();

    let mut settings = match &cli.config {
        Some(path) => load_settings(path)?,
        None => ServerSettings::default(),
    };
    if let Some(port) = cli.port {
        settings.port = port;
    }
    settings.shared_listener |= cli.shared;
    settings.logging.json |= cli.json_logs;

    init_logging(&settings.logging, settings.debug)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = settings.port,
        shared_listener = settings.shared_listener,
        "rest-server starting"
    );

    let service = ServiceContext::new(
        "rest-server",
        BasicAuth::from_settings(&settings.basic_auth).middleware(),
    )
    .with_module(Arc::new(StatusModule {
        started: Instant::now(),
    }));

    let mut options = vec![with_port(settings.port)];
    let shared = if settings.shared_listener {
        let shared = SharedListener::bind(("0.0.0.0", settings.port)).await?;
        options.push(with_shared_listener(shared.clone()));
        Some(shared)
    } else {
        None
    };

    let server = Arc::new(HttpServer::from_config(
        &service,
        ServerConfig::from_settings(&settings),
        options,
    )?);

    // Registered after the server so HTTP gets first claim on each connection.
    if let Some(shared) = &shared {
        let echo = shared.match_with(AnyMatcher)?;
        tokio::spawn(serve_echo(echo));
        let mux = shared.clone();
        tokio::spawn(async move {
            if let Err(e) = mux.serve().await {
                tracing::error!(error = %e, "Shared listener failed");
            }
        });
    }

    let serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve().await }
    });

    let grace = Duration::from_secs(settings.shutdown_timeout_secs);
    let shutdown = tokio::spawn({
        let server = Arc::clone(&server);
        async move {
            match wait_for_signal().await {
                Ok(signal) => tracing::info!(%signal, "Shutdown signal received"),
                Err(e) => tracing::warn!(error = %e, "Signal handling unavailable, shutting down"),
            }
            server.shutdown(grace).await;
        }
    });

    let result = serving.await?;
    shutdown.abort();
    if let Some(shared) = shared {
        shared.close();
    }

    if let Err(e) = result {
        tracing::error!(error = %e, fatal = e.is_fatal(), "HTTP server failed");
        if e.is_fatal() {
            std::process::exit(1);
        }
        return Err(e.into());
    }
    Ok(())
}
