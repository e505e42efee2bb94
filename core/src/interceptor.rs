//! The transport seam of the client and the adapter that fills it.
//!
//! # Design
//! `Transport` is the single capability the client needs from whatever sits
//! under it: turn a request into a response. It is infallible because the
//! only implementation shipped here never touches a network.
//!
//! Closures implement `Transport` through a blanket impl, so `intercept` does
//! not need a named type: it returns the closure that records one handler
//! invocation per call.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::handler::Handler;
use crate::recorder::ResponseRecorder;
use crate::Request;

/// Performs one round trip for the client.
pub trait Transport: Send + Sync {
    fn round_trip(&self, request: Request) -> http::Response<Bytes>;
}

impl<F> Transport for F
where
    F: Fn(Request) -> http::Response<Bytes> + Send + Sync,
{
    fn round_trip(&self, request: Request) -> http::Response<Bytes> {
        self(request)
    }
}

/// Wrap `handler` as a transport.
///
/// Every call allocates a fresh `ResponseRecorder`, runs the handler on the
/// caller's thread and returns whatever the handler recorded.
pub fn intercept<H>(handler: Arc<H>) -> impl Transport
where
    H: Handler + ?Sized,
{
    move |request: Request| -> http::Response<Bytes> {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let mut recorder = ResponseRecorder::new();
        handler.serve(&mut recorder, request);
        let response = recorder.finish();
        debug!(%method, %uri, status = %response.status(), "intercepted request");
        response
    }
}
