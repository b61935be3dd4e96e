//! Static file serving through the admission-controlled cache, plus the
//! favicon shortcut.

use crate::{
    errors::ServeError,
    fcache::FileCache,
    http::{
        request::Request,
        response::Response,
        types::{mime_for_path, IMAGE_SVG},
    },
    router::RouteHandler,
    AppState,
};
use async_trait::async_trait;
use std::path::Path;
use tracing::trace;

pub(crate) struct StaticHandler;

#[async_trait]
impl RouteHandler for StaticHandler {
    async fn call(
        &self,
        state: &AppState,
        request: &Request<'_>,
        response: &mut Response,
    ) -> Result<(), ServeError> {
        let rel = request
            .path
            .strip_prefix("/static/")
            .ok_or(ServeError::NotFound)?;

        // Traversal defense happens on the request text, before any
        // filesystem call.
        if rel.is_empty() || rel.contains("..") || rel.contains("//") {
            return Err(ServeError::Forbidden("path refused"));
        }

        let full = state.config.static_dir.join(rel);
        serve_file(state, &full, mime_for_path(rel), response).await
    }
}

pub(crate) struct FaviconHandler;

/// Served when the static tree carries no favicon of its own.
const FAVICON_FALLBACK: &[u8] = include_bytes!("../../static/assets/favicon.svg");

#[async_trait]
impl RouteHandler for FaviconHandler {
    async fn call(
        &self,
        state: &AppState,
        _request: &Request<'_>,
        response: &mut Response,
    ) -> Result<(), ServeError> {
        let path = state.config.static_dir.join("assets/favicon.svg");
        match serve_file(state, &path, IMAGE_SVG, response).await {
            Err(ServeError::NotFound) => {
                response
                    .status(200)
                    .content_type(IMAGE_SVG)
                    .body_static(FAVICON_FALLBACK);
                Ok(())
            }
            other => other,
        }
    }
}

/// Reads a file through the cache when its size qualifies; larger files
/// bypass the cache entirely.
async fn serve_file(
    state: &AppState,
    path: &Path,
    mime: &'static str,
    response: &mut Response,
) -> Result<(), ServeError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| ServeError::NotFound)?;
    if !meta.is_file() {
        return Err(ServeError::NotFound);
    }
    let mtime = meta
        .modified()
        .map_err(|_| ServeError::Internal("mtime unavailable"))?;

    let through_cache = FileCache::cacheable_size(meta.len());
    if through_cache {
        if let Some(bytes) = state.fcache.lookup(path, mtime) {
            trace!(path = %path.display(), "file cache hit");
            response.status(200).content_type(mime).body(bytes);
            return Ok(());
        }
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| ServeError::NotFound)?;
    if through_cache {
        state.fcache.store(path, mtime, &bytes);
    }

    response.status(200).content_type(mime).body(bytes);
    Ok(())
}
