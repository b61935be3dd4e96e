//! Response records and wire framing.
//!
//! A record carries status, content type, an extra-header block and the
//! body; `send` assembles the header buffer and transmits header and body
//! as one vectorized write. Records are recycled through the engine's free
//! stack, so every field must be cleared by `reset`.

use crate::http::types::{reason, TEXT_HTML};
use std::borrow::Cow;
use std::io::{self, IoSlice};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

pub(crate) const SERVER_TOKEN: &str = concat!("miniweb/", env!("CARGO_PKG_VERSION"));

/// One write attempt per readiness wake; a stalled peer gets this many
/// before the connection is dropped.
const WRITE_ATTEMPTS: u32 = 256;
const WRITE_ATTEMPT_WINDOW: Duration = Duration::from_millis(100);

/// Body storage. Static bodies (canned pages, error shells baked into the
/// binary) avoid the copy; owned bodies are released on `reset`.
#[derive(Debug, Default)]
pub(crate) enum Body {
    #[default]
    Empty,
    Static(&'static [u8]),
    Owned(Vec<u8>),
}

impl Body {
    #[inline]
    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            Body::Empty => &[],
            Body::Static(b) => b,
            Body::Owned(b) => b,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Response {
    status: u16,
    content_type: Cow<'static, str>,
    extra: Vec<u8>,
    body: Body,
    head: Vec<u8>,
}

impl Response {
    pub(crate) fn new() -> Self {
        Self {
            status: 200,
            content_type: Cow::Borrowed(TEXT_HTML),
            extra: Vec::new(),
            body: Body::Empty,
            head: Vec::with_capacity(256),
        }
    }

    /// Returns the record to its post-`new` state for reuse.
    pub(crate) fn reset(&mut self) {
        self.status = 200;
        self.content_type = Cow::Borrowed(TEXT_HTML);
        self.extra.clear();
        self.body = Body::Empty;
        self.head.clear();
    }

    #[inline]
    pub(crate) fn status(&mut self, code: u16) -> &mut Self {
        self.status = code;
        self
    }

    #[inline]
    pub(crate) fn status_code(&self) -> u16 {
        self.status
    }

    #[inline]
    pub(crate) fn content_type(&mut self, ct: impl Into<Cow<'static, str>>) -> &mut Self {
        self.content_type = ct.into();
        self
    }

    /// Appends one extra header line. Content-Type, Content-Length,
    /// Connection and Server are emitted by the framer; adding them here
    /// would duplicate them.
    pub(crate) fn header(&mut self, name: &str, value: &str) -> &mut Self {
        self.extra.extend_from_slice(name.as_bytes());
        self.extra.extend_from_slice(b": ");
        self.extra.extend_from_slice(value.as_bytes());
        self.extra.extend_from_slice(b"\r\n");
        self
    }

    #[inline]
    pub(crate) fn body(&mut self, data: impl Into<Vec<u8>>) -> &mut Self {
        self.body = Body::Owned(data.into());
        self
    }

    #[inline]
    pub(crate) fn body_static(&mut self, data: &'static [u8]) -> &mut Self {
        self.body = Body::Static(data);
        self
    }

    #[inline]
    pub(crate) fn body_bytes(&self) -> &[u8] {
        self.body.as_slice()
    }

    /// Builds the header buffer. Content-Length is the exact byte length
    /// of the body, never a character count.
    fn assemble(&mut self) {
        let body_len = self.body.as_slice().len();

        self.head.clear();
        self.head.extend_from_slice(b"HTTP/1.1 ");
        self.head
            .extend_from_slice(self.status.to_string().as_bytes());
        self.head.push(b' ');
        self.head.extend_from_slice(reason(self.status).as_bytes());
        self.head.extend_from_slice(b"\r\nserver: ");
        self.head.extend_from_slice(SERVER_TOKEN.as_bytes());
        self.head.extend_from_slice(b"\r\ncontent-type: ");
        self.head.extend_from_slice(self.content_type.as_bytes());
        self.head.extend_from_slice(b"\r\ncontent-length: ");
        self.head
            .extend_from_slice(body_len.to_string().as_bytes());
        self.head.extend_from_slice(b"\r\nconnection: close\r\n");
        self.head.extend_from_slice(&self.extra);
        self.head.extend_from_slice(b"\r\n");
    }

    /// Transmits the response: header and body as a gathered write,
    /// retried on partial progress, bounded against stalled peers.
    pub(crate) async fn send(&mut self, stream: &mut TcpStream) -> io::Result<()> {
        self.assemble();

        let mut sent_head = 0usize;
        let mut sent_body = 0usize;
        let body = self.body.as_slice();

        for _ in 0..WRITE_ATTEMPTS {
            if sent_head >= self.head.len() && sent_body >= body.len() {
                stream.flush().await?;
                return Ok(());
            }

            let bufs = [
                IoSlice::new(&self.head[sent_head.min(self.head.len())..]),
                IoSlice::new(&body[sent_body.min(body.len())..]),
            ];

            let n = match tokio::time::timeout(
                WRITE_ATTEMPT_WINDOW,
                stream.write_vectored(&bufs),
            )
            .await
            {
                Ok(result) => result?,
                // Peer not accepting bytes this window; spend an attempt.
                Err(_) => continue,
            };

            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "peer stalled"));
            }

            let head_part = n.min(self.head.len() - sent_head);
            sent_head += head_part;
            sent_body += n - head_part;
        }

        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "send retry budget exhausted",
        ))
    }

    #[cfg(test)]
    pub(crate) fn frame(&mut self) -> Vec<u8> {
        self.assemble();
        let mut wire = self.head.clone();
        wire.extend_from_slice(self.body.as_slice());
        wire
    }
}
