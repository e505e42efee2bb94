//! Run a tower `Service` (an axum `Router`, for example) as a `Handler`.
//!
//! # Design
//! Handlers are synchronous; services return futures. `ServiceHandler` owns a
//! current-thread tokio runtime and drives each call to completion with
//! `block_on`, so the service still runs on the caller's thread. Because of
//! that, a `ServiceHandler` must not be called from inside another tokio
//! runtime; use plain `#[test]` functions, not `#[tokio::test]`.

use bytes::Bytes;
use http_body::Body as HttpBody;
use http_body_util::{BodyExt, Full};
use tokio::runtime::{Builder, Runtime};
use tower::{BoxError, Service, ServiceExt};
use tracing::error;

use crate::error::Error;
use crate::handler::Handler;
use crate::recorder::ResponseRecorder;
use crate::Request;

/// Adapts a `Service<http::Request<Full<Bytes>>>` to `Handler`.
pub struct ServiceHandler<S> {
    service: S,
    runtime: Runtime,
}

impl<S> ServiceHandler<S> {
    pub fn new(service: S) -> Result<Self, Error> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;
        Ok(Self { service, runtime })
    }
}

impl<S, B> Handler for ServiceHandler<S>
where
    S: Service<http::Request<Full<Bytes>>, Response = http::Response<B>>
        + Clone
        + Send
        + Sync,
    S::Error: Into<BoxError>,
    B: HttpBody,
    B::Error: Into<BoxError>,
{
    fn serve(&self, recorder: &mut ResponseRecorder, request: Request) {
        let service = self.service.clone();
        let outcome = self.runtime.block_on(async move {
            let response = service
                .oneshot(request.map(Full::new))
                .await
                .map_err(Into::<BoxError>::into)?;
            let (parts, body) = response.into_parts();
            let body = body.collect().await.map_err(Into::<BoxError>::into)?.to_bytes();
            Ok::<_, BoxError>((parts, body))
        });

        match outcome {
            Ok((parts, body)) => {
                recorder.headers_mut().extend(parts.headers);
                recorder.write_header(parts.status);
                recorder.write(&body);
            }
            Err(err) => {
                error!(%err, "service failed to produce a response");
                recorder.write_header(http::StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }
}
