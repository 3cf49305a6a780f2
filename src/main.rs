//! serve: static file server binary.
//!
//! Serves one directory over HTTP or HTTPS. Reads are always allowed; uploads
//! and deletes are enabled with `--read-only false`. Every request passes the
//! request log, then optional basic auth, then the file handler, which only
//! touches the filesystem through the opened root directory.

mod app;
mod auth;
mod config;
mod error;
mod files;
mod http;
mod logging;
mod path;
mod root;
mod storage;
mod tls;

use axum_server::Handle;
use clap::Parser;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use hyper_util::server::conn::auto::Builder as HttpBuilder;
use shadow_rs::shadow;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tower_http::timeout::{RequestBodyTimeoutLayer, ResponseBodyTimeoutLayer};
use tracing::{error, info, warn};

use crate::config::Args;
use crate::files::FileAccess;
use crate::http::AccessLog;
use crate::storage::Storage;

shadow!(build);

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init_logging(args.log_format);

    if let Err(err) = run(args).await {
        error!(error = %err, "server stopped");
        std::process::exit(1);
    }
}

/// Validates configuration, opens the root and serves until shutdown.
async fn run(args: Args) -> Result<(), io::Error> {
    args.validate()
        .map_err(|err| io::Error::new(ErrorKind::InvalidInput, err.to_string()))?;

    let storage = Storage::open(&args.dir).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("failed to open root directory {:?}: {err}", args.dir),
        )
    })?;
    let tls_config = match args.tls_paths() {
        Some((crt, key)) => Some(tls::load_rustls_config(crt, key).await?),
        None => None,
    };

    info!(
        dir = ?args.dir,
        addr = %args.addr,
        tls = tls_config.is_some(),
        read_only = args.read_only,
        log_remote_addr = args.log_remote_addr,
        auth_user = args.auth.as_ref().map(|credentials| credentials.username()),
        "serving"
    );

    let app = app::build_router(
        FileAccess::new(storage.clone(), args.read_only),
        args.auth.clone(),
        AccessLog {
            log_remote_addr: args.log_remote_addr,
        },
    )
    .layer(RequestBodyTimeoutLayer::new(args.read_timeout.into()))
    .layer(ResponseBodyTimeoutLayer::new(args.write_timeout.into()));
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let header_timeout: Duration = args.read_header_timeout.into();

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    match tls_config {
        Some(tls_config) => {
            let mut server = axum_server::bind_rustls(args.addr, tls_config).handle(handle);
            configure_http(server.http_builder(), header_timeout);
            server.serve(make_service).await?;
        }
        None => {
            let mut server = axum_server::bind(args.addr).handle(handle);
            configure_http(server.http_builder(), header_timeout);
            server.serve(make_service).await?;
        }
    }

    if let Err(err) = storage.close() {
        warn!(error = %err, "failed to close root directory");
    }
    Ok(())
}

fn configure_http(builder: &mut HttpBuilder<TokioExecutor>, header_timeout: Duration) {
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(header_timeout);
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
