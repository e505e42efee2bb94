//! Per-client cookie storage.
//!
//! # Design
//! Cookies are associated with the scheme and host of an absolute request
//! URI. A path-only URI such as `/set-cookie` has no host to key against, so
//! the jar neither stores cookies from it nor attaches cookies to it.
//!
//! Storage follows RFC 6265 closely enough for session tests: host-only and
//! domain cookies, default and explicit paths, `Secure`, and expiry through
//! `Max-Age`/`Expires`. The store sits behind a `Mutex` that is only held
//! while reading or writing entries, never across a handler call.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use cookie::Cookie;
use http::header::{HeaderMap, HeaderValue, COOKIE, SET_COOKIE};
use http::Uri;
use time::{Duration, OffsetDateTime};
use tracing::{debug, trace};

use crate::error::Error;

/// Options accepted by `CookieJar::new`.
#[derive(Debug, Clone, Default)]
pub struct JarOptions {
    public_suffixes: Vec<String>,
}

impl JarOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suffixes (such as `com` or `co.uk`) under which a `Domain` attribute
    /// is refused, so one site cannot set cookies for its neighbours.
    pub fn public_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.public_suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    value: String,
    domain: String,
    host_only: bool,
    path: String,
    secure: bool,
    expires: Option<OffsetDateTime>,
    seq: u64,
}

impl Entry {
    fn same_slot(&self, other: &Entry) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    fn expired(&self, now: OffsetDateTime) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    fn matches(&self, origin: &Origin<'_>) -> bool {
        let domain_ok = if self.host_only {
            origin.host == self.domain
        } else {
            domain_match(&origin.host, &self.domain)
        };
        domain_ok && path_match(origin.path, &self.path) && (!self.secure || origin.secure)
    }
}

#[derive(Debug, Default)]
struct Store {
    entries: Vec<Entry>,
    next_seq: u64,
}

/// In-memory cookie store shared by every request a client makes.
#[derive(Debug)]
pub struct CookieJar {
    public_suffixes: HashSet<String>,
    store: Mutex<Store>,
}

impl CookieJar {
    /// Build an empty jar.
    ///
    /// Fails with `Error::CookieJar` if a public suffix is empty or is not a
    /// dot-separated list of letter, digit and hyphen labels.
    pub fn new(options: JarOptions) -> Result<Self, Error> {
        let public_suffixes = options
            .public_suffixes
            .iter()
            .map(|suffix| normalize_suffix(suffix))
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(Self {
            public_suffixes,
            store: Mutex::new(Store::default()),
        })
    }

    /// Cookies that would be sent to `uri`, as `(name, value)` pairs.
    pub fn cookies(&self, uri: &Uri) -> Vec<(String, String)> {
        let Some(origin) = Origin::of(uri) else {
            debug!(%uri, "no scheme and host, not attaching cookies");
            return Vec::new();
        };
        let now = OffsetDateTime::now_utc();
        let mut store = self.lock();
        store.entries.retain(|entry| !entry.expired(now));

        let mut matched: Vec<&Entry> = store
            .entries
            .iter()
            .filter(|entry| entry.matches(&origin))
            .collect();
        matched.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.seq.cmp(&b.seq)));
        matched
            .into_iter()
            .map(|entry| (entry.name.clone(), entry.value.clone()))
            .collect()
    }

    /// Store cookies received in a response to `uri`.
    pub fn set_cookies<'c, I>(&self, uri: &Uri, cookies: I)
    where
        I: IntoIterator<Item = Cookie<'c>>,
    {
        let Some(origin) = Origin::of(uri) else {
            debug!(%uri, "no scheme and host, not storing cookies");
            return;
        };
        let now = OffsetDateTime::now_utc();
        let mut store = self.lock();
        for cookie in cookies {
            let Some((domain, host_only)) = self.cookie_domain(&cookie, &origin) else {
                debug!(name = cookie.name(), host = %origin.host, "rejecting cookie domain");
                continue;
            };
            let path = match cookie.path() {
                Some(path) if path.starts_with('/') => path.to_string(),
                _ => default_path(origin.path),
            };
            let expires = match (cookie.max_age(), cookie.expires_datetime()) {
                (Some(max_age), _) if max_age <= Duration::ZERO => Some(now),
                (Some(max_age), _) => now.checked_add(max_age),
                (None, Some(at)) => Some(at),
                (None, None) => None,
            };
            let mut entry = Entry {
                name: cookie.name().to_string(),
                value: cookie.value().to_string(),
                domain,
                host_only,
                path,
                secure: cookie.secure().unwrap_or(false),
                expires,
                seq: store.next_seq,
            };

            let existing = store.entries.iter().position(|e| e.same_slot(&entry));
            if entry.expired(now) {
                if let Some(index) = existing {
                    store.entries.remove(index);
                }
                trace!(name = %entry.name, "cookie expired on arrival");
                continue;
            }
            match existing {
                Some(index) => {
                    entry.seq = store.entries[index].seq;
                    store.entries[index] = entry;
                }
                None => {
                    store.next_seq += 1;
                    store.entries.push(entry);
                }
            }
        }
    }

    /// Number of cookies currently held, expired ones included until the
    /// next lookup purges them.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Add the cookies for `uri` to an outgoing request.
    ///
    /// A request carries at most one `Cookie` line: jar cookies are appended
    /// after any the caller set, and extra caller lines are folded in.
    pub(crate) fn apply(&self, uri: &Uri, headers: &mut HeaderMap) {
        let pairs = self.cookies(uri);
        if pairs.is_empty() {
            return;
        }
        let existing = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(|line| line.trim().trim_end_matches(';').to_string())
            .filter(|line| !line.is_empty());
        let line = existing
            .chain(pairs.iter().map(|(name, value)| format!("{name}={value}")))
            .collect::<Vec<_>>()
            .join("; ");
        match HeaderValue::try_from(line) {
            Ok(value) => {
                trace!(%uri, count = pairs.len(), "attaching cookies");
                headers.insert(COOKIE, value);
            }
            Err(err) => debug!(%uri, %err, "cookie header is not a valid header value"),
        }
    }

    /// Store every parseable `Set-Cookie` header of a response to `uri`.
    pub(crate) fn store(&self, uri: &Uri, headers: &HeaderMap) {
        let cookies = headers.get_all(SET_COOKIE).iter().filter_map(|value| {
            let raw = value.to_str().ok()?;
            match Cookie::parse(raw) {
                Ok(cookie) => Some(cookie),
                Err(err) => {
                    debug!(%err, "ignoring malformed Set-Cookie");
                    None
                }
            }
        });
        self.set_cookies(uri, cookies);
    }

    fn cookie_domain(&self, cookie: &Cookie<'_>, origin: &Origin<'_>) -> Option<(String, bool)> {
        let Some(domain) = cookie.domain().filter(|d| !d.is_empty()) else {
            return Some((origin.host.clone(), true));
        };
        let domain = domain.trim_start_matches('.').to_ascii_lowercase();
        if origin.host.parse::<IpAddr>().is_ok() {
            return (domain == origin.host).then(|| (domain, true));
        }
        if self.public_suffixes.contains(&domain) {
            return (domain == origin.host).then(|| (domain, true));
        }
        domain_match(&origin.host, &domain).then_some((domain, false))
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The parts of a request URI that decide which cookies apply.
struct Origin<'a> {
    host: String,
    path: &'a str,
    secure: bool,
}

impl<'a> Origin<'a> {
    fn of(uri: &'a Uri) -> Option<Self> {
        let secure = match uri.scheme_str()? {
            "https" => true,
            "http" => false,
            _ => return None,
        };
        let host = uri
            .host()?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_ascii_lowercase();
        Some(Self {
            host,
            path: uri.path(),
            secure,
        })
    }
}

fn normalize_suffix(suffix: &str) -> Result<String, Error> {
    let normalized = suffix.trim().trim_start_matches('.').to_ascii_lowercase();
    let valid = !normalized.is_empty()
        && normalized.split('.').all(|label| {
            !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if valid {
        Ok(normalized)
    } else {
        Err(Error::CookieJar(format!("invalid public suffix {suffix:?}")))
    }
}

fn domain_match(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
            && host.parse::<IpAddr>().is_err())
}

/// RFC 6265 §5.1.4 default-path.
fn default_path(request_path: &str) -> String {
    if !request_path.starts_with('/') {
        return "/".to_string();
    }
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => request_path[..pos].to_string(),
    }
}

fn path_match(request_path: &str, cookie_path: &str) -> bool {
    let request_path = if request_path.is_empty() { "/" } else { request_path };
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/')))
}
