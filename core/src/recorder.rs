//! In-memory response writer handed to a `Handler` for a single call.
//!
//! # Design
//! The recorder behaves like the writer side of a server connection. Headers
//! are mutable until the status line is written; at that point they are
//! snapshotted, and later edits no longer reach the finished response. Writing
//! body bytes without a status implies `200 OK`. A recorder is created per hop
//! and consumed by `finish`, so nothing carries over between calls.

use std::fmt;
use std::io;

use bytes::{Bytes, BytesMut};
use cookie::Cookie;
use http::header::{HeaderValue, LOCATION, SET_COOKIE};
use http::{HeaderMap, StatusCode};
use tracing::warn;

/// Records the status, headers and body a handler writes.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    snapshot: Option<HeaderMap>,
    body: BytesMut,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers that will be sent with the status line.
    ///
    /// Changes made after `write_header` (or the first body write) are not
    /// part of the finished response.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The headers as the response will carry them.
    pub fn headers(&self) -> &HeaderMap {
        self.snapshot.as_ref().unwrap_or(&self.headers)
    }

    /// Write the status line. Only the first call has an effect.
    pub fn write_header(&mut self, status: StatusCode) {
        if let Some(written) = self.status {
            warn!(%written, ignored = %status, "superfluous write_header call");
            return;
        }
        self.status = Some(status);
        self.snapshot = Some(self.headers.clone());
    }

    /// Append bytes to the body, writing `200 OK` first if no status was set.
    pub fn write(&mut self, buf: &[u8]) {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
    }

    /// Add a `Set-Cookie` header for `cookie`.
    pub fn set_cookie(&mut self, cookie: &Cookie<'_>) {
        match HeaderValue::try_from(cookie.to_string()) {
            Ok(value) => {
                self.headers.append(SET_COOKIE, value);
            }
            Err(err) => warn!(name = cookie.name(), %err, "dropping unencodable cookie"),
        }
    }

    /// Point the client at `location` with a 3xx `status`.
    pub fn redirect(&mut self, location: &str, status: StatusCode) {
        match HeaderValue::try_from(location) {
            Ok(value) => {
                self.headers.insert(LOCATION, value);
            }
            Err(err) => warn!(location, %err, "dropping unencodable redirect location"),
        }
        self.write_header(status);
    }

    /// The status written so far; `200` once a body has been written.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Turn the recording into a response.
    ///
    /// A handler that wrote nothing at all yields `200 OK` with an empty body.
    pub fn finish(self) -> http::Response<Bytes> {
        let headers = self.snapshot.unwrap_or(self.headers);
        let mut response = http::Response::new(self.body.freeze());
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = headers;
        response
    }
}

impl io::Write for ResponseRecorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ResponseRecorder::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Write for ResponseRecorder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        ResponseRecorder::write_str(self, s);
        Ok(())
    }
}
