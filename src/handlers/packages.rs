//! The package API: thin adapters around `pkg_info`, emitting a stable
//! JSON schema with the raw tool output escaped line by line.

use crate::{
    errors::ServeError,
    exec::{exec, ExecError},
    http::{request::Request, response::Response, types::APPLICATION_JSON},
    router::RouteHandler,
    text::{is_clean_abs_path, is_clean_name, json_escape, query_param},
    AppState,
};
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

const PKG_INFO_PATH: &str = "/usr/sbin/pkg_info";
const OUTPUT_CAP: usize = 512 * 1024;

pub(crate) struct PackagesHandler;

#[async_trait]
impl RouteHandler for PackagesHandler {
    async fn call(
        &self,
        state: &AppState,
        request: &Request<'_>,
        response: &mut Response,
    ) -> Result<(), ServeError> {
        let op = request
            .path
            .strip_prefix("/api/packages/")
            .ok_or(ServeError::NotFound)?;
        let query = request.query.unwrap_or("");

        let doc = match op {
            "search" => {
                let term = clean_name_param(query, "q")?;
                let lines = run_pkg_info(state, &["-Q", term]).await?;
                lines_document("query", term, "packages", &lines)
            }
            "info" => {
                let pkg = clean_name_param(query, "pkg")?;
                let lines = run_pkg_info(state, &[pkg]).await?;
                text_document("package", pkg, "info", &lines)
            }
            "which" => {
                let path = query_param(query, "path")
                    .ok_or(ServeError::BadArgument("missing path parameter"))?;
                if !is_clean_abs_path(path) {
                    return Err(ServeError::BadArgument("invalid path"));
                }
                let lines = run_pkg_info(state, &["-E", path]).await?;
                lines_document("path", path, "packages", &lines)
            }
            "files" => {
                let pkg = clean_name_param(query, "pkg")?;
                let lines = run_pkg_info(state, &["-L", pkg]).await?;
                lines_document("package", pkg, "files", &lines)
            }
            "list" => {
                let lines = run_pkg_info(state, &[]).await?;
                format!("{{\"packages\":[{}]}}", joined_lines(&lines))
            }
            _ => return Err(ServeError::NotFound),
        };

        response
            .status(200)
            .content_type(APPLICATION_JSON)
            .body(doc);
        Ok(())
    }
}

fn clean_name_param<'a>(query: &'a str, key: &str) -> Result<&'a str, ServeError> {
    let value = query_param(query, key).ok_or(ServeError::BadArgument("missing parameter"))?;
    if !is_clean_name(value) {
        return Err(ServeError::BadArgument("invalid package name"));
    }
    Ok(value)
}

/// Runs pkg_info; an empty result set (tool exits without output) is a
/// valid, empty answer rather than an error.
async fn run_pkg_info(state: &AppState, argv: &[&str]) -> Result<Vec<String>, ServeError> {
    match exec(
        Path::new(PKG_INFO_PATH),
        argv,
        OUTPUT_CAP,
        state.config.mandoc_timeout,
    )
    .await
    {
        Ok(out) => Ok(String::from_utf8_lossy(&out)
            .lines()
            .map(str::to_string)
            .collect()),
        Err(ExecError::Empty { .. }) => Ok(Vec::new()),
        Err(ExecError::Spawn { .. }) => Err(ServeError::Internal("package tool unavailable")),
        Err(e) => {
            debug!(error = %e, "pkg_info failed");
            Err(ServeError::Internal("package query failed"))
        }
    }
}

/// `{"<key>":"<subject>","<list_key>":["line",...]}`
fn lines_document(key: &str, subject: &str, list_key: &str, lines: &[String]) -> String {
    format!(
        "{{\"{key}\":\"{}\",\"{list_key}\":[{}]}}",
        json_escape(subject),
        joined_lines(lines),
    )
}

/// `{"<key>":"<subject>","<text_key>":"line\nline..."}`
fn text_document(key: &str, subject: &str, text_key: &str, lines: &[String]) -> String {
    format!(
        "{{\"{key}\":\"{}\",\"{text_key}\":\"{}\"}}",
        json_escape(subject),
        json_escape(&lines.join("\n")),
    )
}

fn joined_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| format!("\"{}\"", json_escape(line)))
        .collect::<Vec<_>>()
        .join(",")
}


#[cfg(test)]
mod validation_tests {
    use super::*;
    use crate::http::request::testutil::parse;
    use crate::testutil::state_with_templates;

    async fn call(state: &AppState, path_and_query: &str) -> Result<u16, ServeError> {
        let raw = format!("GET {path_and_query} HTTP/1.1\r\n\r\n").into_bytes();
        let request = parse(&raw)?;
        let mut response = Response::new();
        PackagesHandler.call(state, &request, &mut response).await?;
        Ok(response.status_code())
    }

    #[tokio::test]
    async fn rejects_dirty_arguments() {
        let (state, _dirs) = state_with_templates(&[("base.html", "x")]);

        #[rustfmt::skip]
        let cases = [
            "/api/packages/search",                       // missing q
            "/api/packages/search?q=rm%20-rf",            // bad alphabet
            "/api/packages/info?pkg=a;b",
            "/api/packages/files?pkg=",
            "/api/packages/which?path=usr/bin/vim",       // not absolute
            "/api/packages/which?path=/usr/../etc",       // climbs
            "/api/packages/which",                        // missing path
        ];

        for target in cases {
            let err = call(&state, target).await.unwrap_err();
            assert_eq!(err.status(), 400, "target {target:?}");
        }
    }

    #[tokio::test]
    async fn unknown_operation_is_not_found() {
        let (state, _dirs) = state_with_templates(&[("base.html", "x")]);
        let err = call(&state, "/api/packages/remove?pkg=vim").await.unwrap_err();
        assert_eq!(err.status(), 404);
    }
}
