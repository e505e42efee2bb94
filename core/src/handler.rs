use std::sync::Arc;

use crate::recorder::ResponseRecorder;
use crate::Request;

/// Request-handling logic under test.
///
/// A handler receives the request and writes its response into the
/// recorder. It is shared by every call made through a client, including
/// concurrent ones, hence `Send + Sync`.
///
/// Any closure of the right shape is a handler:
///
/// ```
/// use httptestclient::{Client, Request, ResponseRecorder};
///
/// let client = Client::new(|rec: &mut ResponseRecorder, _req: Request| {
///     rec.write_str("Hello, World!");
/// });
/// let resp = client.get("http://localhost/").send().unwrap();
/// assert_eq!(resp.text().unwrap(), "Hello, World!");
/// ```
pub trait Handler: Send + Sync {
    fn serve(&self, recorder: &mut ResponseRecorder, request: Request);
}

impl<F> Handler for F
where
    F: Fn(&mut ResponseRecorder, Request) + Send + Sync,
{
    fn serve(&self, recorder: &mut ResponseRecorder, request: Request) {
        self(recorder, request)
    }
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn serve(&self, recorder: &mut ResponseRecorder, request: Request) {
        (**self).serve(recorder, request)
    }
}
