//! Error type for the in-process client.
//!
//! # Design
//! There is no transport variant. Requests never leave the process, so the
//! failures a socket would produce (refused connection, timeout, TLS) cannot
//! happen here. A handler that wants to report a failure does so with an
//! ordinary status code in its response, which reaches the caller as `Ok`.
//!
//! What is left are construction failures (cookie jar, service runtime) and
//! client-side failures (bad request parts, redirects, body decoding).

use std::io;
use std::string::FromUtf8Error;

use thiserror::Error;

/// Errors returned by `Client`, its builders and `Response` helpers.
#[derive(Debug, Error)]
pub enum Error {
    /// The cookie jar could not be built from the supplied options.
    #[error("cookie jar: {0}")]
    CookieJar(String),

    /// The runtime backing a `ServiceHandler` could not be started.
    #[error("failed to start service runtime: {0}")]
    Runtime(#[source] io::Error),

    /// A method, URI or header handed to a builder was invalid.
    #[error("invalid request: {0}")]
    Http(#[from] http::Error),

    /// A redirect response carried a `Location` that does not resolve to a URI.
    #[error("invalid redirect location {location:?}")]
    InvalidLocation { location: String },

    /// The redirect policy limit was reached.
    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    /// A JSON body could not be encoded or decoded.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// `Response::text` was called on a body that is not UTF-8.
    #[error("response body is not valid UTF-8")]
    Utf8(#[from] FromUtf8Error),
}

impl From<http::uri::InvalidUri> for Error {
    fn from(err: http::uri::InvalidUri) -> Self {
        Error::Http(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_limit_message_names_the_limit() {
        assert_eq!(
            Error::TooManyRedirects(10).to_string(),
            "stopped after 10 redirects"
        );
    }

    #[test]
    fn invalid_uri_converts_to_http_error() {
        let err: Error = "http://[::1".parse::<http::Uri>().unwrap_err().into();
        assert!(matches!(err, Error::Http(_)));
        assert!(err.to_string().starts_with("invalid request"));
    }
}
