//! Request telemetry middleware.
//!
//! One tower layer covers both listeners: it counts every request in
//! `livelog_http_requests_total` and logs method, endpoint, status, and
//! duration at debug level.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};

use super::metrics::{HttpLabels, HttpMethod, Metrics};

/// Layer that wraps services with request counting and logging.
#[derive(Clone)]
pub struct TelemetryLayer {
    metrics: Arc<Metrics>,
}

impl TelemetryLayer {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for TelemetryLayer {
    type Service = TelemetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TelemetryService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Clone)]
pub struct TelemetryService<S> {
    inner: S,
    metrics: Arc<Metrics>,
}

impl<S, ResBody> Service<Request<Body>> for TelemetryService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ResBody: Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let method = request.method().clone();
        let method_label = HttpMethod::from(request.method());
        let endpoint = normalize_endpoint(request.uri().path());
        let metrics = self.metrics.clone();
        let started = Instant::now();

        let future = self.inner.call(request);

        Box::pin(async move {
            let response = future.await?;
            let status = response.status().as_u16();

            metrics
                .http_requests_total
                .get_or_create(&HttpLabels {
                    method: method_label,
                    endpoint: endpoint.clone(),
                    status,
                })
                .inc();

            tracing::debug!(
                method = %method,
                endpoint = %endpoint,
                status,
                duration_ms = started.elapsed().as_millis() as u64,
                "request completed"
            );

            Ok(response)
        })
    }
}

/// Collapse consumer paths so the access token never becomes a label value.
fn normalize_endpoint(path: &str) -> String {
    match path.strip_prefix("/log/") {
        Some(rest) if !rest.is_empty() => "/log/{token}".to_string(),
        _ => path.to_string(),
    }
}
