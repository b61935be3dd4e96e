//! Fixed-buffer request reading and parsing.
//!
//! One connection carries exactly one request: bytes are accumulated into a
//! pre-sized buffer until the header terminator appears, then the request
//! line and header block are parsed in place. All request data borrows from
//! the connection buffer and is valid only for the handler invocation.

use crate::{errors::ServeError, http::types::Method};
use memchr::memmem;
use std::net::{IpAddr, SocketAddr};

/// Hard caps on the request-line tokens, independent of the buffer size.
pub(crate) const MAX_METHOD: usize = 31;
pub(crate) const MAX_URL: usize = 511;
pub(crate) const MAX_VERSION: usize = 31;

/// Accumulating read buffer for one connection.
#[derive(Debug)]
pub(crate) struct RecvBuffer {
    buf: Box<[u8]>,
    len: usize,
}

impl RecvBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// The writable tail, or `None` when the buffer is exhausted without a
    /// complete header block (the request is oversized).
    pub(crate) fn spare(&mut self) -> Option<&mut [u8]> {
        if self.len >= self.buf.len() {
            return None;
        }
        Some(&mut self.buf[self.len..])
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.len = (self.len + n).min(self.buf.len());
    }

    /// Offset just past `\r\n\r\n`, once the whole header block arrived.
    pub(crate) fn head_end(&self) -> Option<usize> {
        memmem::find(&self.buf[..self.len], b"\r\n\r\n").map(|pos| pos + 4)
    }

    pub(crate) fn filled(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// A parsed request, borrowing the connection buffer.
#[derive(Debug)]
pub(crate) struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub version: &'a str,
    head: &'a [u8],
    pub peer: SocketAddr,
}

impl<'a> Request<'a> {
    /// Parses `METHOD SP URL SP VERSION CRLF` plus the header block.
    /// `head_end` must point just past the `\r\n\r\n` terminator.
    pub(crate) fn parse(
        raw: &'a [u8],
        head_end: usize,
        peer: SocketAddr,
    ) -> Result<Self, ServeError> {
        let head = &raw[..head_end];

        // The request line and header names must be ASCII-clean UTF-8
        // before any &str is carved out of the buffer.
        simdutf8::basic::from_utf8(head).map_err(|_| ServeError::Parse("non-UTF-8 request"))?;

        let line_end = memmem::find(head, b"\r\n").ok_or(ServeError::Parse("no request line"))?;
        let line = &head[..line_end];

        if line.len() > MAX_METHOD + 1 + MAX_URL + 1 + MAX_VERSION {
            return Err(ServeError::Parse("request line too long"));
        }

        let (method, url_start) = Method::from_bytes(line)?;
        if url_start > MAX_METHOD + 1 {
            return Err(ServeError::Parse("method too long"));
        }

        let rest = &line[url_start..];
        let sp = memchr::memchr(b' ', rest).ok_or(ServeError::Parse("missing version"))?;
        let (url, version) = (&rest[..sp], &rest[sp + 1..]);

        if url.is_empty() || url.len() > MAX_URL || url[0] != b'/' {
            return Err(ServeError::Parse("bad url"));
        }
        if version.len() > MAX_VERSION || !version.starts_with(b"HTTP/") {
            return Err(ServeError::Parse("bad version"));
        }
        if memchr::memchr(b' ', version).is_some() {
            return Err(ServeError::Parse("bad version"));
        }

        // Both slices were validated as UTF-8 above.
        let url = std::str::from_utf8(url).map_err(|_| ServeError::Parse("bad url"))?;
        let version =
            std::str::from_utf8(version).map_err(|_| ServeError::Parse("bad version"))?;

        let (path, query) = match url.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (url, None),
        };

        Ok(Request {
            method,
            path,
            query,
            version,
            head: &head[line_end + 2..],
            peer,
        })
    }

    /// First value of `name`, case-insensitive on the name, with leading
    /// value whitespace trimmed. Linear scan of the header block.
    pub(crate) fn header(&self, name: &str) -> Option<&'a str> {
        let mut rest = self.head;
        loop {
            let line_end = memmem::find(rest, b"\r\n")?;
            let line = &rest[..line_end];
            if line.is_empty() {
                return None;
            }
            if let Some(colon) = memchr::memchr(b':', line) {
                let (h_name, h_value) = (&line[..colon], &line[colon + 1..]);
                if h_name.eq_ignore_ascii_case(name.as_bytes()) {
                    let value = std::str::from_utf8(h_value).ok()?;
                    return Some(value.trim_start());
                }
            }
            rest = &rest[line_end + 2..];
        }
    }

    /// Client address for logging and access decisions. Forwarded headers
    /// are trusted only when the socket peer is the configured proxy; the
    /// trust check comes before any header is consulted.
    pub(crate) fn client_ip(&self, trusted_proxy: Option<IpAddr>) -> String {
        if trusted_proxy == Some(self.peer.ip()) {
            if let Some(real) = self.header("x-real-ip") {
                if !real.is_empty() {
                    return real.trim().to_string();
                }
            }
            if let Some(fwd) = self.header("x-forwarded-for") {
                if let Some(first) = fwd.split(',').next() {
                    let first = first.trim();
                    if !first.is_empty() {
                        return first.to_string();
                    }
                }
            }
        }
        self.peer.ip().to_string()
    }

    /// True when the trusted proxy reports the client side as HTTPS.
    pub(crate) fn is_https(&self, trusted_proxy: Option<IpAddr>) -> bool {
        trusted_proxy == Some(self.peer.ip())
            && self.header("x-forwarded-proto") == Some("https")
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    pub(crate) const PEER: &str = "192.0.2.7:54321";

    pub(crate) fn parse(raw: &[u8]) -> Result<Request<'_>, ServeError> {
        let mut buf = RecvBuffer::new(16 * 1024);
        buf.spare().unwrap()[..raw.len()].copy_from_slice(raw);
        buf.advance(raw.len());
        let head_end = buf.head_end().expect("fixture lacks header terminator");
        Request::parse(raw, head_end, PEER.parse().unwrap())
    }
}




#[cfg(test)]
mod client_ip_tests {
    use super::testutil::{parse, PEER};
    use std::net::IpAddr;

    const PEER_IP: &str = "192.0.2.7";
    const TRUSTED: &str = "192.0.2.7";
    const UNTRUSTED: &str = "203.0.113.9";

    fn trusted() -> Option<IpAddr> {
        Some(TRUSTED.parse().unwrap())
    }

    fn untrusted() -> Option<IpAddr> {
        Some(UNTRUSTED.parse().unwrap())
    }

    #[test]
    fn x_real_ip_wins_from_trusted_proxy() {
        let req = parse(
            b"GET / HTTP/1.1\r\nX-Real-IP: 198.51.100.1\r\nX-Forwarded-For: 198.51.100.2\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.client_ip(trusted()), "198.51.100.1");
    }

    #[test]
    fn forwarded_for_first_token() {
        let req = parse(
            b"GET / HTTP/1.1\r\nX-Forwarded-For: 198.51.100.2, 10.0.0.1, 10.0.0.2\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.client_ip(trusted()), "198.51.100.2");
    }

    #[test]
    fn headers_ignored_without_trusted_proxy() {
        let req = parse(
            b"GET / HTTP/1.1\r\nX-Real-IP: 198.51.100.1\r\nX-Forwarded-For: 198.51.100.2\r\n\r\n",
        )
        .unwrap();

        assert_eq!(req.client_ip(None), PEER_IP);
        assert_eq!(req.client_ip(untrusted()), PEER_IP);
    }

    #[test]
    fn falls_back_to_peer() {
        let req = parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.client_ip(trusted()), PEER_IP);
        assert!(PEER.starts_with(PEER_IP));
    }

    #[test]
    fn https_detection_requires_trust() {
        let req = parse(b"GET / HTTP/1.1\r\nX-Forwarded-Proto: https\r\n\r\n").unwrap();
        assert!(req.is_https(trusted()));
        assert!(!req.is_https(untrusted()));
        assert!(!req.is_https(None));

        let plain = parse(b"GET / HTTP/1.1\r\nX-Forwarded-Proto: http\r\n\r\n").unwrap();
        assert!(!plain.is_https(trusted()));
    }
}
