//! 路由组装：处理器、认证中间件、追踪与共享状态。

use axum::extract::{Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::auth::{self, AuthConfig};
use crate::documents;
use crate::error::ApiError;
use crate::http::{self, build_cors_layer};
use crate::library::Library;
use crate::thumbnail::ThumbnailCache;
use crate::version;

/// 构建完整的应用路由。
pub fn build_router(
    library: Arc<Library>,
    thumbnails: Arc<ThumbnailCache>,
    auth_config: Arc<AuthConfig>,
    cors_origins: Option<&str>,
) -> Router {
    let mut app = Router::new()
        .route("/api/pdfs", get(documents::list_pdfs))
        .route("/api/pdfs/{filename}", get(documents::serve_pdf))
        .route(
            "/api/pdfs/thumbnails/{filename}",
            get(documents::serve_thumbnail),
        )
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/api/auth/status", get(auth::auth_status))
        .route("/api/version", get(version::get_version_info))
        .fallback(not_found)
        .layer(middleware::from_fn(auth::auth_middleware))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = http::resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(library))
        .layer(Extension(thumbnails))
        .layer(Extension(auth_config));

    if let Some(cors_layer) = build_cors_layer(cors_origins) {
        app = app.layer(cors_layer);
    }
    app
}

async fn not_found() -> ApiError {
    ApiError::NotFound("not found".into())
}
