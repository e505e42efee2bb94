//! HTTP client that talks to a handler in the same process.
//!
//! # Overview
//! Tests often need to drive request-handling code through a real client:
//! redirects, cookies, status codes and bodies as a caller sees them. This
//! crate provides such a client without binding a socket. Its transport is an
//! interceptor that hands each request straight to a `Handler` and returns
//! what the handler wrote into a `ResponseRecorder`.
//!
//! ```
//! use httptestclient::{Client, Request, ResponseRecorder};
//! use http::StatusCode;
//!
//! let client = Client::new(|rec: &mut ResponseRecorder, req: Request| {
//!     match req.uri().path() {
//!         "/" => rec.write_str("Hello, World!"),
//!         _ => rec.write_header(StatusCode::NOT_FOUND),
//!     }
//! });
//!
//! let resp = client.get("/").send().unwrap();
//! assert_eq!(resp.status().to_string(), "200 OK");
//! ```
//!
//! # Design
//! - `Client::new` binds a handler through `interceptor::intercept`; the
//!   interceptor never fails, so there are no transport errors.
//! - `Client::with_cookie_jar` adds a `CookieJar`. Cookies need an absolute
//!   URL: path-only requests neither store nor send them.
//! - Redirects are followed by the client, one interceptor call per hop.
//! - `ServiceHandler` runs any tower service, such as an axum `Router`, as a
//!   handler.

pub mod client;
pub mod error;
pub mod handler;
pub mod interceptor;
pub mod jar;
pub mod recorder;
pub mod redirect;
pub mod response;
pub mod service;

/// Request type seen by handlers and transports.
pub type Request = http::Request<bytes::Bytes>;

pub use client::{Client, ClientBuilder, RequestBuilder};
pub use error::Error;
pub use handler::Handler;
pub use interceptor::{intercept, Transport};
pub use jar::{CookieJar, JarOptions};
pub use recorder::ResponseRecorder;
pub use response::Response;
pub use service::ServiceHandler;
