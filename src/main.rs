//! pdf-shelf server binary.
//!
//! Serves a directory of PDFs behind a shared-credential session cookie and
//! renders first-page thumbnails on demand, caching them on disk. The main
//! entry point loads configuration, binds the rasterizer, builds the Axum
//! router and runs the HTTP listener until a shutdown signal arrives.

mod app;
mod atomic;
mod auth;
mod background;
mod config;
mod documents;
mod error;
mod etag;
mod http;
mod library;
mod locking;
mod logging;
mod rasterizer;
mod thumbnail;
mod version;

use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use crate::auth::AuthConfig;
use crate::background::spawn_background_tasks;
use crate::config::Args;
use crate::library::Library;
use crate::rasterizer::build_rasterizer;
use crate::thumbnail::ThumbnailCache;

shadow!(build);

/// Starts the server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    if let Some(path) = config::load_env_file() {
        info!(path = %path.display(), "loaded environment file");
    }
    let args = Args::parse();
    let library = Arc::new(Library::new(PathBuf::from(&args.pdf_dir)));
    let rasterizer = build_rasterizer(&args).map_err(std::io::Error::other)?;
    let thumbnails = Arc::new(
        ThumbnailCache::new(
            library.clone(),
            PathBuf::from(&args.thumbnail_dir),
            rasterizer,
            args.thumbnail_dpi,
        )
        .with_render_wait(Duration::from_secs(args.render_wait_secs))
        .with_refresh_stale(args.refresh_stale_thumbnails),
    );
    thumbnails.ensure_cache_dir().await?;
    let auth_config = Arc::new(
        AuthConfig::new(
            args.auth_user.clone(),
            args.auth_pass.clone(),
            Duration::from_secs(args.session_ttl_secs),
        )
        .with_login_limits(
            args.login_max_attempts,
            Duration::from_secs(args.login_window_secs),
            Duration::from_secs(args.login_lockout_secs),
        ),
    );

    info!(
        pdf_dir = %library.root_path().display(),
        thumbnail_dir = %thumbnails.cache_dir().display(),
        rasterizer = ?args.rasterizer,
        dpi = args.thumbnail_dpi,
        "library configured"
    );

    let app = app::build_router(
        library,
        thumbnails.clone(),
        auth_config.clone(),
        Some(args.cors_origins.as_str()),
    );

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let listener = TcpListener::bind(addr).await?;

    info!("🚀 Starting HTTP server at {}", addr);

    spawn_background_tasks(auth_config, thumbnails);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
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
}
