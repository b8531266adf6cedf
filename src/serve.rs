//! HTTP serving of component assets.
//!
//! Exposes `GET /<namespace>/<component>/<relative-path>`, resolving the
//! relative path against the component's declared asset root with the same
//! validator the resolver uses. Unknown components and files are 404,
//! unsafe paths are 400.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::cors::CorsLayer;

use crate::config::Settings;
use crate::manager::ComponentManager;
use crate::resolve::{PathViolation, ensure_within_root, is_unsafe_pattern};

/// Build the asset router for the manager's namespace.
///
/// CORS is permissive: dashboard assets are fetched cross-origin during
/// development.
pub fn router(manager: Arc<ComponentManager>) -> Router {
    let namespace = manager.namespace().trim_matches('/').to_string();
    Router::new()
        .route(
            &format!("/{namespace}/{{component}}/{{*path}}"),
            get(serve_asset),
        )
        .layer(CorsLayer::permissive())
        .with_state(manager)
}

/// Bind the configured address and serve assets until shutdown.
pub async fn serve(settings: &Settings, manager: Arc<ComponentManager>) -> anyhow::Result<()> {
    let app = router(manager);
    let listener = tokio::net::TcpListener::bind(&settings.server.bind).await?;
    crate::log_event!("serve", "listening", "{}", settings.server.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn serve_asset(
    State(manager): State<Arc<ComponentManager>>,
    UrlPath((component, path)): UrlPath<(String, String)>,
) -> Response {
    if is_unsafe_pattern(&path) {
        return (StatusCode::BAD_REQUEST, "unsafe asset path").into_response();
    }

    let Some(root) = manager.asset_root(&component) else {
        return (StatusCode::NOT_FOUND, "unknown component").into_response();
    };

    let resolved = match ensure_within_root(&root.join(&path), &root) {
        Ok(resolved) => resolved,
        Err(PathViolation::Escapes) => {
            return (StatusCode::BAD_REQUEST, "unsafe asset path").into_response();
        }
        Err(PathViolation::NotFound | PathViolation::RootUnavailable(_)) => {
            return (StatusCode::NOT_FOUND, "no such asset").into_response();
        }
    };

    match tokio::fs::read(&resolved).await {
        Ok(bytes) => {
            // Markup is revalidated on every load so edits show up
            // immediately; everything else may be cached.
            let cache_control = if has_extension(&path, "html") {
                "no-cache"
            } else {
                "public"
            };
            (
                [
                    (header::CONTENT_TYPE, content_type(&path)),
                    (header::CACHE_CONTROL, cache_control),
                ],
                bytes,
            )
                .into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, "no such asset").into_response(),
    }
}

fn has_extension(path: &str, extension: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

fn content_type(path: &str) -> &'static str {
    let extension = std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" | "cjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}
