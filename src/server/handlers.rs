//! Route handlers for the producer and consumer endpoints.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{stream, TryStreamExt};
use tokio::sync::oneshot;

use super::error::ApiError;
use super::metrics::Metrics;
use crate::range::ByteRange;
use crate::stream::{LogStream, StreamReader};

const X_STREAMING: HeaderName = HeaderName::from_static("x-streaming");

/// Shared application state for both listeners.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

struct StateInner {
    access_token: String,
    /// Single-producer latch: taken before consume starts, released only
    /// when stream preparation fails (the process is one job long).
    ingesting: AtomicBool,
    reader: OnceLock<StreamReader>,
    metrics: Arc<Metrics>,
    started: Instant,
}

impl AppState {
    pub fn new(access_token: String, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Arc::new(StateInner {
                access_token,
                ingesting: AtomicBool::new(false),
                reader: OnceLock::new(),
                metrics,
                started: Instant::now(),
            }),
        }
    }

    /// The reader for the active stream, once an upload has started.
    pub fn reader(&self) -> Option<&StreamReader> {
        self.inner.reader.get()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.inner.started.elapsed()
    }
}

/// Handle PUT /log
///
/// Accepts the single upload for this process. The `201 Created` ack goes
/// out as soon as the stream is prepared; the response body stays open until
/// ingestion finishes. A producer failure errors the response body, which
/// tears the connection down abruptly so the producer can tell the upload
/// did not complete cleanly.
pub async fn handle_put(State(state): State<AppState>, request: Request) -> Response {
    if state
        .inner
        .ingesting
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        tracing::debug!("rejecting concurrent upload");
        return ApiError::AlreadyStreaming.into_response();
    }

    let ingested = state.inner.metrics.ingest_bytes_total.clone();
    let source = request
        .into_body()
        .into_data_stream()
        .inspect_ok(move |chunk| { ingested.inc_by(chunk.len() as u64); });

    let stream = match LogStream::open(source) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(error = %err, "could not open stream for upload");
            // Release the latch so the producer can retry the initial PUT.
            state.inner.ingesting.store(false, Ordering::SeqCst);
            return ApiError::StreamOpenFailed.into_response();
        }
    };
    let _ = state.inner.reader.set(stream.reader());

    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = stream.consume().await;
        match &result {
            Ok(total) => tracing::info!(bytes = *total, "upload complete"),
            Err(err) => tracing::warn!(error = %err, "producer failed mid-stream"),
        }
        let _ = done_tx.send(result);
    });

    let body = Body::from_stream(stream::once(async move {
        match done_rx.await {
            Ok(Ok(_)) => Ok(Bytes::new()),
            Ok(Err(err)) => Err(std::io::Error::other(err.to_string())),
            Err(_) => Err(std::io::Error::other("ingest task went away")),
        }
    }));
    (StatusCode::CREATED, body).into_response()
}

/// Handle GET and HEAD on /log/{token}
///
/// The token is checked before anything else; a mismatch is a 401 no matter
/// the method. HEAD returns the headers a GET would carry. GET parses the
/// optional `Range` header and streams the observer's bytes as the body.
pub async fn handle_log(
    State(state): State<AppState>,
    method: Method,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Response {
    if token != state.inner.access_token {
        tracing::debug!("token mismatch on consumer request");
        let mut response = ApiError::AuthDenied.into_response();
        streaming_headers(response.headers_mut());
        return response;
    }

    match method {
        Method::HEAD => {
            let mut response = StatusCode::OK.into_response();
            streaming_headers(response.headers_mut());
            response.headers_mut().insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("X-Streaming"),
            );
            response
        }
        Method::GET => serve_log(&state, &headers),
        _ => ApiError::MethodNotAllowed.into_response(),
    }
}

/// Attach an observer for one consumer and stream its range.
fn serve_log(state: &AppState, headers: &HeaderMap) -> Response {
    let range_header = match headers.get(header::RANGE).map(|v| v.to_str()) {
        Some(Ok(value)) => Some(value),
        Some(Err(_)) => {
            return ApiError::InvalidRange(crate::range::RangeError::Malformed).into_response()
        }
        None => None,
    };
    let range = match ByteRange::parse(range_header) {
        Ok(range) => range,
        Err(err) => {
            tracing::debug!(error = %err, "unsatisfiable range header");
            return ApiError::InvalidRange(err).into_response();
        }
    };

    let Some(reader) = state.inner.reader.get() else {
        return ApiError::NoStream.into_response();
    };

    let observer = reader.observe(range);
    let delivered = state.inner.metrics.delivered_bytes_total.clone();
    let tracker = state.inner.metrics.track_observer();
    let chunks = observer.into_stream().inspect_ok(move |chunk| {
        // The tracker rides along with the body stream; when the consumer
        // disconnects it drops with the stream and the gauge falls.
        let _ = &tracker;
        delivered.inc_by(chunk.len() as u64);
    });

    let mut response = (StatusCode::OK, Body::from_stream(chunks)).into_response();
    streaming_headers(response.headers_mut());
    response
}

/// Handle GET /metrics
pub async fn handle_metrics(State(state): State<AppState>) -> String {
    state.inner.metrics.encode()
}

fn streaming_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(X_STREAMING, HeaderValue::from_static("true"));
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("X-Streaming"),
    );
}
