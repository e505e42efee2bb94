//! Client whose transport is a handler running in the same process.
//!
//! # Design
//! `Client` has the call surface of an ordinary blocking HTTP client. The
//! only difference is underneath: its `Transport` is the interceptor, which
//! runs the handler on the calling thread instead of writing to a socket.
//!
//! Redirects and cookies live here, above the transport. Each redirect hop is
//! a separate round trip, and the cookie jar is consulted before and after
//! every hop, exactly where a networked client would do it. Follow-up hops
//! carry a `Referer` naming the previous hop, except from `https` to `http`;
//! a `Referer` the caller set is kept.
//!
//! `Client` is a cheap handle around an `Arc`; clones share the handler and
//! the cookie jar.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, REFERER};
use http::{Method, Uri};
use serde::Serialize;
use tracing::debug;

use crate::error::Error;
use crate::handler::Handler;
use crate::interceptor::{intercept, Transport};
use crate::jar::{CookieJar, JarOptions};
use crate::redirect::{self, Policy};
use crate::response::Response;
use crate::Request;

/// In-process HTTP client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientRef>,
}

struct ClientRef {
    transport: Box<dyn Transport>,
    jar: Option<CookieJar>,
    redirect: Policy,
    default_headers: HeaderMap,
}

impl Client {
    /// A client that sends every request to `handler`. No cookie persistence.
    pub fn new<H>(handler: H) -> Self
    where
        H: Handler + 'static,
    {
        Self::from_parts(
            Box::new(intercept(Arc::new(handler))),
            None,
            Policy::default(),
            HeaderMap::new(),
        )
    }

    /// A client that sends every request to `handler` and keeps cookies
    /// between requests made with absolute URLs.
    pub fn with_cookie_jar<H>(handler: H) -> Result<Self, Error>
    where
        H: Handler + 'static,
    {
        Self::builder().cookie_jar(JarOptions::default()).build(handler)
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    fn from_parts(
        transport: Box<dyn Transport>,
        jar: Option<CookieJar>,
        redirect: Policy,
        default_headers: HeaderMap,
    ) -> Self {
        Self {
            inner: Arc::new(ClientRef {
                transport,
                jar,
                redirect,
                default_headers,
            }),
        }
    }

    pub fn get(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::DELETE, url)
    }

    pub fn head(&self, url: &str) -> RequestBuilder<'_> {
        self.request(Method::HEAD, url)
    }

    /// Start a request. `url` may be absolute (`http://localhost/x`) or
    /// path-only (`/x`); path-only requests never carry jar cookies.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder<'_> {
        let request = url.parse::<Uri>().map_err(Error::from).map(|uri| {
            let mut request = http::Request::new(Bytes::new());
            *request.method_mut() = method;
            *request.uri_mut() = uri;
            request
        });
        RequestBuilder {
            client: self,
            request,
        }
    }

    /// The jar attached to this client, if it was built with one.
    pub fn cookie_jar(&self) -> Option<&CookieJar> {
        self.inner.jar.as_ref()
    }

    /// Send a prebuilt request, following redirects per the client's policy.
    ///
    /// Fails only on redirect handling; a handler's error status is returned
    /// as an `Ok` response.
    pub fn execute(&self, request: Request) -> Result<Response, Error> {
        let (parts, mut body) = request.into_parts();
        let mut method = parts.method;
        let mut uri = parts.uri;
        let mut headers = parts.headers;
        let defaults = &self.inner.default_headers;
        let missing: Vec<&HeaderName> = defaults
            .keys()
            .filter(|name| !headers.contains_key(*name))
            .collect();
        for name in missing {
            for value in defaults.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        let explicit_referer = headers.contains_key(REFERER);

        let mut followed = 0;
        loop {
            let mut hop = http::Request::new(body.clone());
            *hop.method_mut() = method.clone();
            *hop.uri_mut() = uri.clone();
            *hop.version_mut() = parts.version;
            *hop.headers_mut() = headers.clone();
            *hop.extensions_mut() = parts.extensions.clone();
            if let Some(jar) = &self.inner.jar {
                jar.apply(&uri, hop.headers_mut());
            }

            let response = self.inner.transport.round_trip(hop);
            if let Some(jar) = &self.inner.jar {
                jar.store(&uri, response.headers());
            }

            let Some(location) = redirect::location(response.status(), response.headers()) else {
                return Ok(Response::new(response, uri));
            };
            if !self.inner.redirect.check(followed)? {
                return Ok(Response::new(response, uri));
            }

            let next = redirect::followup(response.status(), &uri, location)?;
            debug!(from = %uri, to = %next.uri, status = %response.status(), "following redirect");
            redirect::strip_headers(&mut headers, &uri, &next.uri, next.drop_body);
            match redirect::referer(&uri, &next.uri) {
                Some(_) if explicit_referer => {}
                Some(referer) => {
                    headers.insert(REFERER, referer);
                }
                None => {
                    headers.remove(REFERER);
                }
            }
            method = redirect::followup_method(&method, next.drop_body);
            if next.drop_body {
                body = Bytes::new();
            }
            uri = next.uri;
            followed += 1;
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("redirect", &self.inner.redirect)
            .field("cookie_jar", &self.inner.jar.is_some())
            .finish()
    }
}

/// Configuration for a `Client`.
#[derive(Debug, Default)]
pub struct ClientBuilder {
    redirect: Policy,
    default_headers: HeaderMap,
    jar: Option<JarOptions>,
}

impl ClientBuilder {
    pub fn redirect(mut self, policy: Policy) -> Self {
        self.redirect = policy;
        self
    }

    /// Headers added to every request that does not set them itself.
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// Attach a cookie jar built from `options`.
    pub fn cookie_jar(mut self, options: JarOptions) -> Self {
        self.jar = Some(options);
        self
    }

    /// Bind the client to `handler` through the interceptor.
    pub fn build<H>(self, handler: H) -> Result<Client, Error>
    where
        H: Handler + 'static,
    {
        self.build_with_transport(intercept(Arc::new(handler)))
    }

    /// Bind the client to an arbitrary transport.
    pub fn build_with_transport<T>(self, transport: T) -> Result<Client, Error>
    where
        T: Transport + 'static,
    {
        let jar = self.jar.map(CookieJar::new).transpose()?;
        Ok(Client::from_parts(
            Box::new(transport),
            jar,
            self.redirect,
            self.default_headers,
        ))
    }
}

/// A request being assembled. Errors are held until `send`.
#[must_use = "a request does nothing until it is sent"]
pub struct RequestBuilder<'a> {
    client: &'a Client,
    request: Result<Request, Error>,
}

impl RequestBuilder<'_> {
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        if let Ok(request) = &mut self.request {
            let parsed: Result<(HeaderName, HeaderValue), http::Error> = HeaderName::try_from(key)
                .map_err(Into::into)
                .and_then(|name| {
                    HeaderValue::try_from(value)
                        .map(|value| (name, value))
                        .map_err(Into::into)
                });
            match parsed {
                Ok((name, value)) => {
                    request.headers_mut().append(name, value);
                }
                Err(err) => self.request = Err(Error::Http(err)),
            }
        }
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        if let Ok(request) = &mut self.request {
            request.headers_mut().extend(headers);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        if let Ok(request) = &mut self.request {
            *request.body_mut() = body.into();
        }
        self
    }

    /// Serialize `value` as the body and set `Content-Type: application/json`
    /// unless a content type was already given.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        if let Ok(request) = &mut self.request {
            match serde_json::to_vec(value) {
                Ok(body) => {
                    *request.body_mut() = body.into();
                    request
                        .headers_mut()
                        .entry(CONTENT_TYPE)
                        .or_insert(HeaderValue::from_static("application/json"));
                }
                Err(err) => self.request = Err(Error::Json(err)),
            }
        }
        self
    }

    /// Access the request as built so far.
    pub fn build(self) -> Result<Request, Error> {
        self.request
    }

    pub fn send(self) -> Result<Response, Error> {
        let client = self.client;
        client.execute(self.request?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::header::{AUTHORIZATION, COOKIE, LOCATION, SET_COOKIE, USER_AGENT};
    use http::StatusCode;

    use super::*;
    use crate::recorder::ResponseRecorder;

    type Seen = Arc<Mutex<Vec<Request>>>;

    /// A transport that records each hop and answers from `respond`.
    fn recording<F>(respond: F) -> (Seen, impl Transport)
    where
        F: Fn(&Request) -> http::Response<Bytes> + Send + Sync + 'static,
    {
        let seen: Seen = Arc::default();
        let log = seen.clone();
        let transport = move |req: Request| -> http::Response<Bytes> {
            let response = respond(&req);
            log.lock().unwrap().push(req);
            response
        };
        (seen, transport)
    }

    fn reply(status: StatusCode, headers: &[(HeaderName, &'static str)]) -> http::Response<Bytes> {
        let mut response = http::Response::new(Bytes::new());
        *response.status_mut() = status;
        for (name, value) in headers {
            response
                .headers_mut()
                .append(name.clone(), HeaderValue::from_static(*value));
        }
        response
    }

    #[test]
    fn builder_error_surfaces_on_send() {
        let client = Client::new(|_: &mut ResponseRecorder, _: Request| {});
        let err = client.get("http://[::1").send().unwrap_err();
        assert!(matches!(err, Error::Http(_)));

        let err = client
            .get("/")
            .header("bad header", "x")
            .send()
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }

    #[test]
    fn request_parts_reach_the_handler() {
        let (seen, transport) = recording(|_| reply(StatusCode::OK, &[]));
        let client = Client::builder().build_with_transport(transport).unwrap();
        client
            .post("http://localhost/echo")
            .header("x-trace", "abc")
            .json(&serde_json::json!({ "name": "fish" }))
            .send()
            .unwrap();

        let seen = seen.lock().unwrap();
        let req = &seen[0];
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri(), "http://localhost/echo");
        assert_eq!(req.headers()["x-trace"], "abc");
        assert_eq!(req.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(req.body().as_ref(), br#"{"name":"fish"}"#);
    }

    #[test]
    fn default_headers_do_not_override_request_headers() {
        let mut defaults = HeaderMap::new();
        defaults.insert(USER_AGENT, HeaderValue::from_static("httptestclient"));
        defaults.insert("x-env", HeaderValue::from_static("test"));
        let (seen, transport) = recording(|_| reply(StatusCode::OK, &[]));
        let client = Client::builder()
            .default_headers(defaults)
            .build_with_transport(transport)
            .unwrap();
        client.get("/").header(USER_AGENT, "custom").send().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].headers()[USER_AGENT], "custom");
        assert_eq!(seen[0].headers()["x-env"], "test");
    }

    #[test]
    fn multi_valued_default_header_is_sent_whole() {
        let mut defaults = HeaderMap::new();
        defaults.append("x-multi", HeaderValue::from_static("one"));
        defaults.append("x-multi", HeaderValue::from_static("two"));
        defaults.append("x-kept", HeaderValue::from_static("default"));
        let (seen, transport) = recording(|_| reply(StatusCode::OK, &[]));
        let client = Client::builder()
            .default_headers(defaults)
            .build_with_transport(transport)
            .unwrap();
        client.get("/").header("x-kept", "mine").send().unwrap();

        let seen = seen.lock().unwrap();
        let multi: Vec<_> = seen[0].headers().get_all("x-multi").iter().collect();
        assert_eq!(multi, ["one", "two"]);
        let kept: Vec<_> = seen[0].headers().get_all("x-kept").iter().collect();
        assert_eq!(kept, ["mine"]);
    }

    #[test]
    fn jar_cookie_joins_the_caller_cookie_line() {
        let (seen, transport) = recording(|_| reply(StatusCode::OK, &[]));
        let client = Client::builder()
            .cookie_jar(JarOptions::default())
            .build_with_transport(transport)
            .unwrap();
        let jar = client.cookie_jar().unwrap();
        jar.set_cookies(
            &"http://localhost/".parse().unwrap(),
            [cookie::Cookie::new("session", "abc")],
        );

        client
            .get("http://localhost/page")
            .header(COOKIE, "pref=dark")
            .send()
            .unwrap();

        let seen = seen.lock().unwrap();
        let lines: Vec<_> = seen[0].headers().get_all(COOKIE).iter().collect();
        assert_eq!(lines, ["pref=dark; session=abc"]);
    }

    #[test]
    fn followup_hops_carry_referer() {
        let (seen, transport) = recording(|req| match req.uri().path() {
            "/redirect" => reply(StatusCode::FOUND, &[(LOCATION, "/fish")]),
            _ => reply(StatusCode::OK, &[]),
        });
        let client = Client::builder().build_with_transport(transport).unwrap();
        client.get("http://localhost/redirect").send().unwrap();

        let seen = seen.lock().unwrap();
        assert!(!seen[0].headers().contains_key(REFERER));
        assert_eq!(seen[1].headers()[REFERER], "http://localhost/redirect");
    }

    #[test]
    fn no_referer_from_https_to_http() {
        let (seen, transport) = recording(|req| match req.uri().scheme_str() {
            Some("https") => reply(StatusCode::FOUND, &[(LOCATION, "http://localhost/plain")]),
            _ => reply(StatusCode::OK, &[]),
        });
        let client = Client::builder().build_with_transport(transport).unwrap();
        client
            .get("https://localhost/secure")
            .header(REFERER, "https://origin.test/")
            .send()
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].headers()[REFERER], "https://origin.test/");
        assert!(!seen[1].headers().contains_key(REFERER));
    }

    #[test]
    fn caller_referer_is_kept_across_hops() {
        let (seen, transport) = recording(|req| match req.uri().path() {
            "/redirect" => reply(StatusCode::FOUND, &[(LOCATION, "/fish")]),
            _ => reply(StatusCode::OK, &[]),
        });
        let client = Client::builder().build_with_transport(transport).unwrap();
        client
            .get("http://localhost/redirect")
            .header(REFERER, "http://origin.test/")
            .send()
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[1].headers()[REFERER], "http://origin.test/");
    }

    #[test]
    fn redirect_hops_are_separate_round_trips() {
        let (seen, transport) = recording(|req| match req.uri().path() {
            "/redirect" => reply(StatusCode::FOUND, &[(LOCATION, "/fish")]),
            _ => reply(StatusCode::OK, &[]),
        });
        let client = Client::builder().build_with_transport(transport).unwrap();
        let resp = client.get("http://localhost/redirect").send().unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.url(), "http://localhost/fish");
        let uris: Vec<String> = seen.lock().unwrap().iter().map(|r| r.uri().to_string()).collect();
        assert_eq!(uris, ["http://localhost/redirect", "http://localhost/fish"]);
    }

    #[test]
    fn found_rewrites_post_and_drops_body() {
        let (seen, transport) = recording(|req| match req.uri().path() {
            "/submit" => reply(StatusCode::FOUND, &[(LOCATION, "/done")]),
            _ => reply(StatusCode::OK, &[]),
        });
        let client = Client::builder().build_with_transport(transport).unwrap();
        client
            .post("http://localhost/submit")
            .header(CONTENT_TYPE, "text/plain")
            .body("payload")
            .send()
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[1].method(), Method::GET);
        assert!(seen[1].body().is_empty());
        assert!(!seen[1].headers().contains_key(CONTENT_TYPE));
    }

    #[test]
    fn permanent_redirect_replays_method_and_body() {
        let (seen, transport) = recording(|req| match req.uri().path() {
            "/old" => reply(StatusCode::PERMANENT_REDIRECT, &[(LOCATION, "/new")]),
            _ => reply(StatusCode::CREATED, &[]),
        });
        let client = Client::builder().build_with_transport(transport).unwrap();
        let resp = client.put("/old").body("payload").send().unwrap();

        assert_eq!(resp.status(), StatusCode::CREATED);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[1].method(), Method::PUT);
        assert_eq!(seen[1].uri(), "/new");
        assert_eq!(seen[1].body().as_ref(), b"payload");
    }

    #[test]
    fn authorization_is_not_sent_to_another_host() {
        let (seen, transport) = recording(|req| match req.uri().host() {
            Some("a.test") => reply(StatusCode::FOUND, &[(LOCATION, "http://b.test/")]),
            _ => reply(StatusCode::OK, &[]),
        });
        let client = Client::builder().build_with_transport(transport).unwrap();
        client
            .get("http://a.test/")
            .header(AUTHORIZATION, "Bearer secret")
            .send()
            .unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen[0].headers().contains_key(AUTHORIZATION));
        assert!(!seen[1].headers().contains_key(AUTHORIZATION));
    }

    #[test]
    fn redirect_loop_hits_the_limit() {
        let (seen, transport) =
            recording(|_| reply(StatusCode::FOUND, &[(LOCATION, "/again")]));
        let client = Client::builder()
            .redirect(Policy::limited(3))
            .build_with_transport(transport)
            .unwrap();
        let err = client.get("/again").send().unwrap_err();

        assert!(matches!(err, Error::TooManyRedirects(3)));
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[test]
    fn policy_none_returns_the_redirect() {
        let (_, transport) = recording(|_| reply(StatusCode::FOUND, &[(LOCATION, "/fish")]));
        let client = Client::builder()
            .redirect(Policy::none())
            .build_with_transport(transport)
            .unwrap();
        let resp = client.get("/redirect").send().unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[LOCATION], "/fish");
    }

    #[test]
    fn redirect_without_location_is_returned() {
        let (seen, transport) = recording(|_| reply(StatusCode::MOVED_PERMANENTLY, &[]));
        let client = Client::builder().build_with_transport(transport).unwrap();
        let resp = client.get("/moved").send().unwrap();
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn cookies_set_during_a_redirect_reach_the_next_hop() {
        let (seen, transport) = recording(|req| match req.uri().path() {
            "/login" => reply(
                StatusCode::SEE_OTHER,
                &[(LOCATION, "/home"), (SET_COOKIE, "session=1")],
            ),
            _ => reply(StatusCode::OK, &[]),
        });
        let client = Client::builder()
            .cookie_jar(JarOptions::default())
            .build_with_transport(transport)
            .unwrap();
        client.post("http://localhost/login").send().unwrap();

        let seen = seen.lock().unwrap();
        assert!(!seen[0].headers().contains_key(COOKIE));
        assert_eq!(seen[1].headers()[COOKIE], "session=1");
        assert_eq!(client.cookie_jar().map(CookieJar::len), Some(1));
    }

    #[test]
    fn bad_jar_options_fail_the_build() {
        let err = Client::builder()
            .cookie_jar(JarOptions::new().public_suffixes([""]))
            .build(|_: &mut ResponseRecorder, _: Request| {})
            .unwrap_err();
        assert!(matches!(err, Error::CookieJar(_)));
    }

    #[test]
    fn clones_share_the_jar() {
        let client = Client::with_cookie_jar(|rec: &mut ResponseRecorder, _: Request| {
            rec.headers_mut()
                .append(SET_COOKIE, HeaderValue::from_static("a=1"));
        })
        .unwrap();
        let clone = client.clone();
        clone.get("http://localhost/").send().unwrap();
        assert_eq!(client.cookie_jar().map(CookieJar::len), Some(1));
    }
}
