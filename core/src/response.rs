//! The response handed back to callers of `Client`.
//!
//! # Design
//! The body is already in memory when a `Response` exists: the handler wrote
//! it into a recorder before the call returned. Accessors therefore borrow or
//! clone `Bytes` cheaply, and decoding helpers only fail on content, never on
//! I/O.

use bytes::Bytes;
use http::{HeaderMap, StatusCode, Uri, Version};
use serde::de::DeserializeOwned;

use crate::error::Error;

/// Final response of a request, after any redirects were followed.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    url: Uri,
}

impl Response {
    pub(crate) fn new(response: http::Response<Bytes>, url: Uri) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            body,
            url,
        }
    }

    /// Status code. Its `Display` form is the status line, e.g. `200 OK`.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// URI of the request that produced this response. Differs from the
    /// requested URI when redirects were followed.
    pub fn url(&self) -> &Uri {
        &self.url
    }

    pub fn content_length(&self) -> u64 {
        self.body.len() as u64
    }

    pub fn bytes(&self) -> Bytes {
        self.body.clone()
    }

    pub fn text(&self) -> Result<String, Error> {
        Ok(String::from_utf8(self.body.to_vec())?)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Convert back into an `http::Response`.
    pub fn into_http(self) -> http::Response<Bytes> {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers;
        response
    }
}
