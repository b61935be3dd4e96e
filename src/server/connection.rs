//! Per-connection lifecycle: Accepted → Reading → Parsed → Dispatched →
//! Closed, on one worker task. Always-close: one request per connection,
//! every response ends the conversation.

use crate::{
    errors::{error_page, ServeError},
    http::{
        request::{RecvBuffer, Request},
        response::Response,
        types::TEXT_HTML,
    },
    server::pool::ResponsePool,
    AppState,
};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

/// Drives one accepted connection to completion. Transport errors close
/// silently; every other failure is rendered as an HTML error shell.
pub(crate) async fn drive(
    state: &AppState,
    responses: &ResponsePool,
    stream: &mut TcpStream,
    peer: SocketAddr,
    created: Instant,
) {
    let deadline = created + state.config.conn_timeout;
    let mut buf = RecvBuffer::new(state.config.max_req_size);

    // Reading: accumulate until the header block terminator arrives.
    let head_end = loop {
        if let Some(end) = buf.head_end() {
            break end;
        }

        let Some(spare) = buf.spare() else {
            debug!(%peer, "request exceeds buffer without header terminator");
            respond_error(responses, stream, &ServeError::Parse("oversized request")).await;
            return;
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!(%peer, "connection deadline reached while reading");
            return;
        }

        match tokio::time::timeout(remaining, stream.read(spare)).await {
            Err(_) => {
                debug!(%peer, "connection deadline reached while reading");
                return;
            }
            Ok(Ok(0)) => {
                trace!(%peer, "peer closed before a full request");
                return;
            }
            Ok(Ok(n)) => buf.advance(n),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Ok(Err(e)) => {
                debug!(%peer, error = %e, "read failed");
                return;
            }
        }
    };

    // Parsed.
    let request = match Request::parse(buf.filled(), head_end, peer) {
        Ok(request) => request,
        Err(err) => {
            debug!(%peer, "malformed request line or headers");
            respond_error(responses, stream, &err).await;
            return;
        }
    };
    trace!(version = request.version, path = request.path, "request parsed");

    // Dispatched.
    let mut response = responses.acquire();
    let outcome = match state.router.find(request.method, request.path) {
        Some(handler) => handler.call(state, &request, &mut response).await,
        None => Err(ServeError::NotFound),
    };

    match outcome {
        Ok(()) => {}
        Err(ServeError::Transport(e)) => {
            debug!(%peer, error = %e, "transport error during dispatch");
            responses.release(response);
            return;
        }
        Err(err) => {
            response.reset();
            render_error(&mut response, &err);
        }
    }

    let status = response.status_code();
    if let Err(e) = response.send(stream).await {
        debug!(%peer, error = %e, "send failed");
    } else {
        info!(
            method = ?request.method,
            path = request.path,
            status,
            client = %request.client_ip(state.config.trusted_proxy),
            https = request.is_https(state.config.trusted_proxy),
            "request served"
        );
    }
    responses.release(response);
    // Closed: the stream drops with the caller.
}

/// Renders the error shell into a response record.
pub(crate) fn render_error(response: &mut Response, err: &ServeError) {
    let status = err.status();
    response
        .status(status)
        .content_type(TEXT_HTML)
        .body(error_page(status, err.message()));
}

async fn respond_error(responses: &ResponsePool, stream: &mut TcpStream, err: &ServeError) {
    let mut response = responses.acquire();
    render_error(&mut response, err);
    if let Err(e) = response.send(stream).await {
        debug!(error = %e, "error response not delivered");
    }
    responses.release(response);
}

#[cfg(test)]
mod render_tests {
    use super::*;

    #[test]
    fn error_shells_embed_status() {
        #[rustfmt::skip]
        let cases = [
            (ServeError::Parse("x"),       400, "400 Bad Request"),
            (ServeError::NotFound,         404, "404 Not Found"),
            (ServeError::Forbidden("x"),   403, "403 Forbidden"),
            (ServeError::Internal("x"),    500, "500 Internal Server Error"),
            (ServeError::Backpressure,     503, "503 Service Unavailable"),
        ];

        for (err, status, needle) in cases {
            let mut response = Response::new();
            render_error(&mut response, &err);
            assert_eq!(response.status_code(), status);
            let body = String::from_utf8(response.body_bytes().to_vec()).unwrap();
            assert!(body.contains(needle), "{err:?}");
        }
    }
}
