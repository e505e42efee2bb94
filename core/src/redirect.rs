//! Redirect policy and `Location` resolution.
//!
//! # Design
//! The interceptor knows nothing about redirects; the client follows them by
//! issuing a fresh request per hop. This module decides whether a response is
//! a redirect worth following, where it points, and how the follow-up request
//! differs from the one that produced it.
//!
//! Follow-ups name the previous hop in `Referer`, except when going from
//! `https` to `http`, where any `Referer` is dropped.

use http::header::{
    HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_ENCODING, CONTENT_LANGUAGE, CONTENT_LENGTH, CONTENT_TYPE,
    COOKIE, LOCATION, WWW_AUTHENTICATE,
};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{Method, StatusCode, Uri};

use crate::error::Error;

const DEFAULT_MAX_REDIRECTS: usize = 10;

/// How many redirects a client follows before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    max: Option<usize>,
}

impl Policy {
    /// Follow at most `max` redirects; the next one fails with
    /// `Error::TooManyRedirects`.
    pub fn limited(max: usize) -> Self {
        Self { max: Some(max) }
    }

    /// Never follow; 3xx responses are returned to the caller as they are.
    pub fn none() -> Self {
        Self { max: None }
    }

    pub(crate) fn check(&self, followed: usize) -> Result<bool, Error> {
        match self.max {
            None => Ok(false),
            Some(max) if followed >= max => Err(Error::TooManyRedirects(max)),
            Some(_) => Ok(true),
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::limited(DEFAULT_MAX_REDIRECTS)
    }
}

/// What the next hop looks like after a redirect.
#[derive(Debug)]
pub(crate) struct Followup {
    pub uri: Uri,
    /// The follow-up is sent as GET (or HEAD) without a body.
    pub drop_body: bool,
}

/// The `Location` of a followable redirect, if `status` is one and the header
/// is present.
pub(crate) fn location(status: StatusCode, headers: &HeaderMap) -> Option<&str> {
    match status {
        StatusCode::MOVED_PERMANENTLY
        | StatusCode::FOUND
        | StatusCode::SEE_OTHER
        | StatusCode::TEMPORARY_REDIRECT
        | StatusCode::PERMANENT_REDIRECT => headers.get(LOCATION)?.to_str().ok(),
        _ => None,
    }
}

pub(crate) fn followup(
    status: StatusCode,
    base: &Uri,
    location: &str,
) -> Result<Followup, Error> {
    let uri = resolve_location(base, location)?;
    let drop_body = !matches!(
        status,
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
    );
    Ok(Followup { uri, drop_body })
}

/// Method used for the follow-up hop.
pub(crate) fn followup_method(method: &Method, drop_body: bool) -> Method {
    if drop_body && method != Method::GET && method != Method::HEAD {
        Method::GET
    } else {
        method.clone()
    }
}

/// Remove caller headers that must not survive this hop.
pub(crate) fn strip_headers(headers: &mut HeaderMap, from: &Uri, to: &Uri, drop_body: bool) {
    if drop_body {
        for name in [CONTENT_TYPE, CONTENT_LENGTH, CONTENT_ENCODING, CONTENT_LANGUAGE] {
            headers.remove(name);
        }
    }
    if from.host().map(str::to_ascii_lowercase) != to.host().map(str::to_ascii_lowercase) {
        for name in [AUTHORIZATION, WWW_AUTHENTICATE, COOKIE] {
            headers.remove(name);
        }
    }
}

/// `Referer` for a hop from `from` to `to`: the previous URI without user
/// info, or `None` when leaving `https` for `http`.
pub(crate) fn referer(from: &Uri, to: &Uri) -> Option<HeaderValue> {
    if from.scheme() == Some(&Scheme::HTTPS) && to.scheme() == Some(&Scheme::HTTP) {
        return None;
    }
    let value = match (from.scheme(), from.authority()) {
        (Some(scheme), Some(authority)) => {
            let host = authority
                .as_str()
                .rsplit_once('@')
                .map_or(authority.as_str(), |(_, host)| host);
            let path = from.path_and_query().map_or("/", PathAndQuery::as_str);
            format!("{scheme}://{host}{path}")
        }
        _ => from.to_string(),
    };
    HeaderValue::try_from(value).ok()
}

/// Resolve a `Location` value against the URI of the request that received it.
///
/// Handles absolute URIs, scheme-relative (`//host/p`), path-absolute (`/p`),
/// query-only (`?q`) and relative-path references, removing dot segments.
/// A relative base (no scheme or authority) yields a relative result.
pub fn resolve_location(base: &Uri, location: &str) -> Result<Uri, Error> {
    let invalid = || Error::InvalidLocation {
        location: location.to_string(),
    };
    let reference = location.split('#').next().unwrap_or_default().trim();
    if reference.is_empty() {
        return Ok(base.clone());
    }

    if has_scheme(reference) {
        return reference.parse::<Uri>().map_err(|_| invalid());
    }

    if let Some(rest) = reference.strip_prefix("//") {
        let scheme = base.scheme_str().unwrap_or("http");
        return format!("{scheme}://{rest}")
            .parse::<Uri>()
            .map_err(|_| invalid());
    }

    let base_path = match base.path() {
        "" => "/",
        path => path,
    };
    let (ref_path, ref_query) = match reference.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (reference, None),
    };

    let (path, query) = if ref_path.is_empty() {
        (base_path.to_string(), ref_query.or(base.query()))
    } else if ref_path.starts_with('/') {
        (remove_dot_segments(ref_path), ref_query)
    } else {
        let dir = match base_path.rfind('/') {
            Some(pos) => &base_path[..=pos],
            None => "/",
        };
        (remove_dot_segments(&format!("{dir}{ref_path}")), ref_query)
    };

    let path_and_query = match query {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };
    let path_and_query = PathAndQuery::try_from(path_and_query).map_err(|_| invalid())?;

    match (base.scheme(), base.authority()) {
        (Some(scheme), Some(authority)) => build(scheme.clone(), authority.clone(), path_and_query)
            .map_err(|_| invalid()),
        _ => Uri::try_from(path_and_query.as_str()).map_err(|_| invalid()),
    }
}

fn build(scheme: Scheme, authority: Authority, path_and_query: PathAndQuery) -> Result<Uri, http::Error> {
    Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
}

fn has_scheme(reference: &str) -> bool {
    match reference.find(':') {
        Some(0) | None => false,
        Some(pos) => {
            let scheme = &reference[..pos];
            !scheme.contains('/')
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
    }
}

/// RFC 3986 §5.2.4 on an absolute path.
fn remove_dot_segments(path: &str) -> String {
    let mut output: Vec<&str> = Vec::new();
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    let last = segments.len().saturating_sub(1);
    for (i, segment) in segments.iter().enumerate() {
        match *segment {
            "." => {
                if i == last {
                    output.push("");
                }
            }
            ".." => {
                output.pop();
                if i == last {
                    output.push("");
                }
            }
            segment => output.push(segment),
        }
    }
    format!("/{}", output.join("/"))
}
