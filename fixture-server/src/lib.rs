use std::sync::Arc;

use axum::{
    extract::State,
    http::{
        header::{COOKIE, LOCATION, SET_COOKIE},
        HeaderMap, Method, StatusCode,
    },
    routing::{get, post},
    Json, Router,
};
use cookie::Cookie;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};

pub const COOKIE_NAME: &str = "testcookie";
pub const COOKIE_VALUE: &str = "testvalue";

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Visits {
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub body: serde_json::Value,
}

pub type Counter = Arc<RwLock<Visits>>;

pub fn app() -> Router {
    let counter: Counter = Arc::default();
    Router::new()
        .route("/", get(hello))
        .route("/error", get(internal_error))
        .route("/redirect", get(redirect))
        .route("/fish", get(fish))
        .route("/set-cookie", get(set_cookie))
        .route("/get-cookie", get(get_cookie))
        .route("/visits", get(visits).post(visit))
        .route("/echo", post(echo))
        .with_state(counter)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "fixture server listening");
    }
    axum::serve(listener, app()).await
}

async fn hello() -> &'static str {
    "Hello, World!"
}

async fn internal_error() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

async fn redirect() -> (StatusCode, [(axum::http::HeaderName, &'static str); 1]) {
    (StatusCode::FOUND, [(LOCATION, "/fish")])
}

async fn fish() -> &'static str {
    "Fish"
}

async fn set_cookie() -> ([(axum::http::HeaderName, String); 1], &'static str) {
    (
        [(SET_COOKIE, format!("{COOKIE_NAME}={COOKIE_VALUE}"))],
        "Cookie Set",
    )
}

async fn get_cookie(headers: HeaderMap) -> (StatusCode, String) {
    match cookie_value(&headers, COOKIE_NAME) {
        Some(value) => (StatusCode::OK, format!("Cookie Value: {value}")),
        None => (StatusCode::BAD_REQUEST, "No Cookie Found".to_string()),
    }
}

async fn visits(State(counter): State<Counter>) -> Json<Visits> {
    Json(counter.read().await.clone())
}

async fn visit(State(counter): State<Counter>) -> Json<Visits> {
    let mut visits = counter.write().await;
    visits.count += 1;
    Json(visits.clone())
}

async fn echo(method: Method, Json(body): Json<serde_json::Value>) -> Json<Echo> {
    Json(Echo {
        method: method.to_string(),
        body,
    })
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}
