//! Core HTTP protocol types shared by the parser, the router and the
//! response framer.

use crate::errors::ServeError;

// METHOD

/// HTTP request methods accepted by the parser.
///
/// `TRACE` and `CONNECT` are rejected at parse time; the diagnostics
/// surface is read-only and neither has a route.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    /// Maps the method token of a request line. The token must be followed
    /// by the SP separator; the returned offset points past it.
    #[inline]
    pub(crate) fn from_bytes(src: &[u8]) -> Result<(Self, usize), ServeError> {
        match src {
            [b'G', b'E', b'T', b' ', ..] => Ok((Method::Get, 4)),
            [b'P', b'U', b'T', b' ', ..] => Ok((Method::Put, 4)),
            [b'P', b'O', b'S', b'T', b' ', ..] => Ok((Method::Post, 5)),
            [b'H', b'E', b'A', b'D', b' ', ..] => Ok((Method::Head, 5)),
            [b'P', b'A', b'T', b'C', b'H', b' ', ..] => Ok((Method::Patch, 6)),
            [b'D', b'E', b'L', b'E', b'T', b'E', b' ', ..] => Ok((Method::Delete, 7)),
            [b'O', b'P', b'T', b'I', b'O', b'N', b'S', b' ', ..] => Ok((Method::Options, 8)),
            _ => Err(ServeError::Parse("unrecognized method")),
        }
    }
}

// STATUS

/// Reason phrase for the status codes the server emits; anything else is
/// framed as `Unknown` rather than dropped.
#[inline]
pub(crate) const fn reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

// CONTENT TYPES

pub(crate) const TEXT_HTML: &str = "text/html";
pub(crate) const TEXT_PLAIN: &str = "text/plain";
pub(crate) const APPLICATION_JSON: &str = "application/json";
pub(crate) const IMAGE_SVG: &str = "image/svg+xml";
pub(crate) const APPLICATION_PDF: &str = "application/pdf";
pub(crate) const APPLICATION_POSTSCRIPT: &str = "application/postscript";
pub(crate) const OCTET_STREAM: &str = "application/octet-stream";

/// MIME type from the file extension, for the static handler.
#[inline]
pub(crate) fn mime_for_path(path: &str) -> &'static str {
    let ext = match path.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => return OCTET_STREAM,
    };

    match ext {
        "html" => TEXT_HTML,
        "css" => "text/css",
        "js" => "application/javascript",
        "png" => "image/png",
        "svg" => IMAGE_SVG,
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "pdf" => APPLICATION_PDF,
        "ps" => APPLICATION_POSTSCRIPT,
        "md" => "text/markdown",
        "txt" => TEXT_PLAIN,
        _ => OCTET_STREAM,
    }
}

#[cfg(test)]
mod method_tests {
    use super::*;

    #[test]
    fn from_bytes() {
        #[rustfmt::skip]
        let cases = [
            ("GET /url",   Some((Method::Get, 4))),
            ("GET ",       Some((Method::Get, 4))),
            ("PUT ",       Some((Method::Put, 4))),
            ("POST ",      Some((Method::Post, 5))),
            ("HEAD ",      Some((Method::Head, 5))),
            ("PATCH ",     Some((Method::Patch, 6))),
            ("DELETE ",    Some((Method::Delete, 7))),
            ("OPTIONS ",   Some((Method::Options, 8))),

            ("GET",        None),
            ("get /",      None),
            ("TRACE /",    None),
            ("CONNECT /",  None),
            ("",           None),
        ];

        for (input, expected) in cases {
            let got = Method::from_bytes(input.as_bytes()).ok();
            assert_eq!(got, expected, "input {input:?}");
        }
    }
}
