#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use iptv_merge::settings::SpeedTestSettings;

pub async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Never-ending body: `chunk` bytes every `every`.
pub fn endless_body(chunk: usize, every: Duration) -> Body {
    let stream = futures::stream::unfold((), move |_| async move {
        tokio::time::sleep(every).await;
        Some((Ok::<_, std::io::Error>(Bytes::from(vec![0u8; chunk])), ()))
    });
    Body::from_stream(stream)
}

async fn endless() -> Response {
    endless_body(64 * 1024, Duration::from_millis(5)).into_response()
}

async fn short() -> &'static str {
    "too short to measure"
}

async fn missing() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// `/live/*` streams forever, `/short/*` ends at once, `/missing` is a 404.
pub fn stream_router() -> Router {
    Router::new()
        .route("/live/{name}", get(endless))
        .route("/short/{name}", get(short))
        .route("/missing", get(missing))
}

pub fn fast_speed_test() -> SpeedTestSettings {
    SpeedTestSettings {
        budget_ms: 300,
        trials: 2,
        timeout_secs: 2,
    }
}
