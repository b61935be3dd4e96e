//! Manual-page endpoints: the JSON API under `/api/man` and the rendered
//! pages under `/man/{area}/{section}/{name}[.{fmt}]`.
//!
//! Page paths are resolved through `man -w` and rendered through mandoc;
//! every argument that reaches a subprocess is validated against the name
//! alphabet first.

use crate::{
    errors::ServeError,
    exec::{exec, ExecError},
    http::{
        request::Request,
        response::Response,
        types::{APPLICATION_JSON, APPLICATION_PDF, APPLICATION_POSTSCRIPT, TEXT_HTML, TEXT_PLAIN},
    },
    router::RouteHandler,
    text::{is_clean_name, is_section_token},
    AppState,
};
use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use tracing::debug;

const APROPOS_PATH: &str = "/usr/bin/apropos";

/// Byte caps on captured tool output.
const RESOLVE_OUTPUT_CAP: usize = 64 * 1024;
const RENDER_OUTPUT_CAP: usize = 2 * 1024 * 1024;

/// The manual areas the server exposes, each with its man tree root.
fn area_dir(area: &str) -> Option<&'static str> {
    match area {
        "system" => Some("/usr/share/man"),
        "packages" => Some("/usr/local/man"),
        "x11" => Some("/usr/X11R6/man"),
        _ => None,
    }
}

const SECTIONS: [(&str, &str); 9] = [
    ("1", "General commands"),
    ("2", "System calls"),
    ("3", "Library functions"),
    ("4", "Device drivers"),
    ("5", "File formats"),
    ("6", "Games"),
    ("7", "Miscellaneous"),
    ("8", "System administration"),
    ("9", "Kernel internals"),
];

// API

pub(crate) struct ManApiHandler;

#[async_trait]
impl RouteHandler for ManApiHandler {
    async fn call(
        &self,
        state: &AppState,
        request: &Request<'_>,
        response: &mut Response,
    ) -> Result<(), ServeError> {
        let rest = request
            .path
            .strip_prefix("/api/man")
            .ok_or(ServeError::NotFound)?;
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

        let doc = match segments.as_slice() {
            [] => sections_document(),
            ["search", query] => search(state, query).await?,
            [area, section] => list_section(area, section).await?,
            [area, section, name] => page_metadata(state, area, section, name).await?,
            _ => return Err(ServeError::NotFound),
        };

        response
            .status(200)
            .content_type(APPLICATION_JSON)
            .body(doc.to_string());
        Ok(())
    }
}

fn sections_document() -> serde_json::Value {
    let sections: Vec<_> = SECTIONS
        .iter()
        .map(|(number, name)| json!({ "number": number, "name": name }))
        .collect();
    json!({ "sections": sections })
}

async fn search(state: &AppState, query: &str) -> Result<serde_json::Value, ServeError> {
    if !is_clean_name(query) {
        return Err(ServeError::BadArgument("invalid search term"));
    }

    let results = match exec(
        Path::new(APROPOS_PATH),
        &[query],
        RESOLVE_OUTPUT_CAP,
        state.config.mandoc_timeout,
    )
    .await
    {
        Ok(out) => String::from_utf8_lossy(&out)
            .lines()
            .map(str::to_string)
            .collect(),
        // No matches: apropos exits non-zero with nothing on stdout.
        Err(ExecError::Empty { .. }) => Vec::new(),
        Err(e) => {
            debug!(error = %e, "apropos failed");
            return Err(ServeError::Internal("search failed"));
        }
    };

    Ok(json!({ "query": query, "results": results }))
}

async fn list_section(area: &str, section: &str) -> Result<serde_json::Value, ServeError> {
    let dir = validate_area(area)?;
    validate_section(section)?;

    let pages = list_section_dir(Path::new(dir), section).await;
    Ok(json!({ "area": area, "section": section, "pages": pages }))
}

/// Regular files named `*.{section}` under `{dir}/man{section}`;
/// subdirectories are excluded.
async fn list_section_dir(dir: &Path, section: &str) -> Vec<String> {
    let section_dir = dir.join(format!("man{section}"));
    let suffix = format!(".{section}");

    let mut pages = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(&section_dir).await else {
        return pages;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(page) = name.strip_suffix(&suffix) {
            pages.push(page.to_string());
        }
    }
    pages.sort();
    pages
}

async fn page_metadata(
    state: &AppState,
    area: &str,
    section: &str,
    name: &str,
) -> Result<serde_json::Value, ServeError> {
    let dir = validate_area(area)?;
    validate_section(section)?;
    validate_name(name)?;

    let path = resolve_page(state, dir, section, name).await?;
    Ok(json!({ "area": area, "section": section, "name": name, "path": path }))
}

// RENDERED PAGES

pub(crate) struct ManPageHandler;

#[async_trait]
impl RouteHandler for ManPageHandler {
    async fn call(
        &self,
        state: &AppState,
        request: &Request<'_>,
        response: &mut Response,
    ) -> Result<(), ServeError> {
        let rest = request
            .path
            .strip_prefix("/man/")
            .ok_or(ServeError::NotFound)?;
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        let [area, section, page] = segments.as_slice() else {
            return Err(ServeError::NotFound);
        };

        let dir = validate_area(area)?;
        validate_section(section)?;
        let (name, fmt) = split_format(page);
        validate_name(name)?;

        let path = resolve_page(state, dir, section, name).await?;
        let rendered = render_page(state, &path, fmt).await?;

        response.status(200).content_type(format_content_type(fmt));
        if fmt == "pdf" {
            response.header(
                "content-disposition",
                &format!("inline; filename=\"{name}.pdf\""),
            );
        }
        response.body(rendered);
        Ok(())
    }
}

/// Splits a trailing render-format extension off the page name; an
/// unrecognized extension stays part of the name.
fn split_format(page: &str) -> (&str, &str) {
    match page.rsplit_once('.') {
        Some((name, fmt)) if matches!(fmt, "html" | "pdf" | "ps" | "markdown" | "ascii") => {
            (name, fmt)
        }
        _ => (page, "html"),
    }
}

fn format_content_type(fmt: &str) -> &'static str {
    match fmt {
        "pdf" => APPLICATION_PDF,
        "ps" => APPLICATION_POSTSCRIPT,
        "markdown" | "ascii" => TEXT_PLAIN,
        _ => TEXT_HTML,
    }
}

/// `man -w` resolution: the first output line is the on-disk source path.
async fn resolve_page(
    state: &AppState,
    dir: &str,
    section: &str,
    name: &str,
) -> Result<String, ServeError> {
    let out = exec(
        &state.config.man_path,
        &["-w", "-M", dir, "-s", section, name],
        RESOLVE_OUTPUT_CAP,
        state.config.mandoc_timeout,
    )
    .await
    .map_err(|e| match e {
        ExecError::Empty { .. } => ServeError::NotFound,
        ExecError::Spawn { .. } => ServeError::Internal("man tool unavailable"),
        _ => ServeError::Internal("page resolution failed"),
    })?;

    let path = String::from_utf8_lossy(&out)
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    if path.is_empty() {
        return Err(ServeError::NotFound);
    }
    Ok(path)
}

async fn render_page(state: &AppState, path: &str, fmt: &str) -> Result<Vec<u8>, ServeError> {
    match render_once(state, path, fmt).await {
        Ok(out) => Ok(out),
        // Older mandoc builds lack the markdown formatter.
        Err(_) if fmt == "markdown" => {
            debug!(path, "markdown render failed, falling back to ascii");
            render_once(state, path, "ascii").await
        }
        Err(e) => Err(e),
    }
}

async fn render_once(state: &AppState, path: &str, fmt: &str) -> Result<Vec<u8>, ServeError> {
    let format_flag = format!("-T{fmt}");
    exec(
        &state.config.mandoc_path,
        &[&format_flag, path],
        RENDER_OUTPUT_CAP,
        state.config.mandoc_timeout,
    )
    .await
    .map_err(|e| match e {
        ExecError::Spawn { .. } => ServeError::Internal("mandoc unavailable"),
        _ => ServeError::Internal("render failed"),
    })
}

// VALIDATION

fn validate_area(area: &str) -> Result<&'static str, ServeError> {
    area_dir(area).ok_or(ServeError::BadArgument("unknown manual area"))
}

fn validate_section(section: &str) -> Result<(), ServeError> {
    if is_section_token(section) {
        Ok(())
    } else {
        Err(ServeError::BadArgument("invalid manual section"))
    }
}

fn validate_name(name: &str) -> Result<(), ServeError> {
    if is_clean_name(name) {
        Ok(())
    } else {
        Err(ServeError::BadArgument("invalid page name"))
    }
}
