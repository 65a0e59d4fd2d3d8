//! Prometheus metrics for the relay.

use axum::http::Method;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Labels for HTTP request metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    pub method: HttpMethod,
    pub endpoint: String,
    pub status: u16,
}

/// HTTP method label value.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum HttpMethod {
    Get,
    Put,
    Head,
    Other,
}

impl From<&Method> for HttpMethod {
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET => HttpMethod::Get,
            Method::PUT => HttpMethod::Put,
            Method::HEAD => HttpMethod::Head,
            _ => HttpMethod::Other,
        }
    }
}

/// Container for all Prometheus metrics.
pub struct Metrics {
    registry: Registry,

    /// Bytes accepted from the producer.
    pub ingest_bytes_total: Counter,

    /// Bytes handed to consumer response bodies.
    pub delivered_bytes_total: Counter,

    /// Observers currently registered on the stream.
    pub observers_active: Gauge,

    /// Counter of HTTP requests.
    pub http_requests_total: Family<HttpLabels, Counter>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let ingest_bytes_total = Counter::default();
        registry.register(
            "livelog_ingest_bytes_total",
            "Total bytes accepted from the producer upload",
            ingest_bytes_total.clone(),
        );

        let delivered_bytes_total = Counter::default();
        registry.register(
            "livelog_delivered_bytes_total",
            "Total bytes delivered to consumers",
            delivered_bytes_total.clone(),
        );

        let observers_active = Gauge::default();
        registry.register(
            "livelog_observers_active",
            "Observers currently attached to the stream",
            observers_active.clone(),
        );

        let http_requests_total = Family::<HttpLabels, Counter>::default();
        registry.register(
            "livelog_http_requests_total",
            "Total number of HTTP requests",
            http_requests_total.clone(),
        );

        Self {
            registry,
            ingest_bytes_total,
            delivered_bytes_total,
            observers_active,
            http_requests_total,
        }
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)
            .expect("encoding metrics should not fail");
        buffer
    }

    /// Counts an observer as active until the returned tracker is dropped.
    pub fn track_observer(&self) -> ObserverTracker {
        self.observers_active.inc();
        ObserverTracker {
            gauge: self.observers_active.clone(),
        }
    }
}

/// Keeps `observers_active` raised for the lifetime of one observer.
pub struct ObserverTracker {
    gauge: Gauge,
}

impl Drop for ObserverTracker {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_register_all_metrics() {
        // given/when
        let metrics = Metrics::new();

        // then
        let encoded = metrics.encode();
        assert!(encoded.contains("# HELP livelog_ingest_bytes_total"));
        assert!(encoded.contains("# HELP livelog_delivered_bytes_total"));
        assert!(encoded.contains("# HELP livelog_observers_active"));
        assert!(encoded.contains("# HELP livelog_http_requests_total"));
    }

    #[test]
    fn should_lower_gauge_when_tracker_drops() {
        // given
        let metrics = Metrics::new();

        // when
        let tracker = metrics.track_observer();
        let during = metrics.observers_active.get();
        drop(tracker);

        // then
        assert_eq!(during, 1);
        assert_eq!(metrics.observers_active.get(), 0);
    }

    #[test]
    fn should_convert_http_method_to_label() {
        assert!(matches!(HttpMethod::from(&Method::PUT), HttpMethod::Put));
        assert!(matches!(HttpMethod::from(&Method::POST), HttpMethod::Other));
    }
}
