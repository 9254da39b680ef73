//! HTTP routes: `/system` and `/proc` push streams, one-shot `/disk`, and a
//! `/health` liveness check.

use std::io::Write;

use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Version};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

use crate::error::StreamError;
use crate::interval::parse_interval;
use crate::session::{Session, StreamKind};
use crate::snapshot::NameFilter;
use crate::sse::{event_stream_headers, EventSink};
use crate::state::AppState;

const DISK_CACHE_CONTROL: &str = "public, max-age=60";

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/system", get(system_handler))
        .route("/proc", get(proc_handler))
        .route("/disk", get(disk_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve until the state's shutdown signal fires. Open streams see the same
/// signal and end on their own, which lets the graceful drain complete.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let mut shutdown = state.shutdown.clone();
    let router = create_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
            info!("HTTP server shutting down");
        })
        .await
}

/// Decoded query string; repeated keys are kept in order.
struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    fn parse(raw: Option<&str>) -> Self {
        let raw = raw.unwrap_or_default();
        Self(url::form_urlencoded::parse(raw.as_bytes()).into_owned().collect())
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn all(&self, key: &str) -> Option<Vec<&str>> {
        let values: Vec<&str> = self
            .0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect();
        (!values.is_empty()).then_some(values)
    }
}

fn check_streaming(version: Version) -> Result<(), StreamError> {
    // chunked transfer encoding starts at HTTP/1.1
    if version < Version::HTTP_11 {
        return Err(StreamError::Unsupported(format!("{version:?}")));
    }
    Ok(())
}

fn open_stream(
    state: &AppState,
    version: Version,
    kind: StreamKind,
    params: &QueryParams,
) -> Response {
    if let Err(e) = check_streaming(version) {
        error!(error = %e, "cannot open push stream");
        return (StatusCode::INTERNAL_SERVER_ERROR, "streaming unsupported").into_response();
    }

    let interval = parse_interval(params.first("interval"), state.default_interval);
    let (sink, body) = EventSink::channel();
    Session::new(kind, interval, state, sink).spawn(state.active_sessions.clone());

    (StatusCode::OK, event_stream_headers(), body).into_response()
}

async fn system_handler(
    State(state): State<AppState>,
    version: Version,
    RawQuery(query): RawQuery,
) -> Response {
    let params = QueryParams::parse(query.as_deref());
    open_stream(&state, version, StreamKind::System, &params)
}

async fn proc_handler(
    State(state): State<AppState>,
    version: Version,
    RawQuery(query): RawQuery,
) -> Response {
    let params = QueryParams::parse(query.as_deref());
    let filter = params.all("name").map(NameFilter::new);
    debug!(filter = ?filter, "proc stream requested");
    open_stream(&state, version, StreamKind::Process(filter), &params)
}

async fn disk_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let params = QueryParams::parse(query.as_deref());
    let path = params.first("path").filter(|p| !p.is_empty()).unwrap_or("/");

    let usage = match state.provider.disk_usage(path).await {
        Ok(u) => u,
        Err(e) => {
            error!(path = %path, error = %e, "disk usage failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let gzip = accepts_gzip(&headers);
    match json_body(&usage, gzip) {
        Ok(body) => {
            let mut resp = (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/json"),
                    (header::CACHE_CONTROL, DISK_CACHE_CONTROL),
                ],
                body,
            )
                .into_response();
            if gzip {
                resp.headers_mut()
                    .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            }
            resp.headers_mut()
                .insert(header::VARY, HeaderValue::from_static("accept-encoding"));
            resp
        }
        Err(e) => {
            error!(path = %path, error = %e, "encode disk usage");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let body = format!("ok\nactive_sessions {}\n", state.active_sessions());
    (StatusCode::OK, body).into_response()
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("gzip"))
}

fn json_body<T: Serialize>(value: &T, gzip: bool) -> std::io::Result<Vec<u8>> {
    let json = serde_json::to_vec(value)?;
    if !gzip {
        return Ok(json);
    }
    let mut enc = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
    enc.write_all(&json)?;
    enc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_query_keys_are_kept() {
        let q = QueryParams::parse(Some("interval=2s&name=chrome&name=bash%20-l"));
        assert_eq!(q.first("interval"), Some("2s"));
        assert_eq!(q.all("name"), Some(vec!["chrome", "bash -l"]));
        assert_eq!(q.all("path"), None);
        assert_eq!(q.first("path"), None);
    }

    #[test]
    fn empty_query() {
        let q = QueryParams::parse(None);
        assert_eq!(q.first("interval"), None);
        assert_eq!(q.all("name"), None);
    }

    #[test]
    fn http10_cannot_stream() {
        assert!(check_streaming(Version::HTTP_10).is_err());
        assert!(check_streaming(Version::HTTP_11).is_ok());
        assert!(check_streaming(Version::HTTP_2).is_ok());
    }

    #[test]
    fn gzip_detection() {
        let mut h = HeaderMap::new();
        assert!(!accepts_gzip(&h));
        h.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("deflate, gzip;q=0.8"));
        assert!(accepts_gzip(&h));
    }
}
