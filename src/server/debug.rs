//! Diagnostics routes, mounted on the input port when `DEBUG` is set.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use super::handlers::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/debug/pprof/", get(index))
        .route("/debug/pprof/cmdline", get(cmdline))
        .route("/debug/vars", get(vars))
}

async fn index() -> &'static str {
    "livelog diagnostics:\n\
     /debug/pprof/cmdline\n\
     /debug/vars\n\
     /metrics\n"
}

/// The process command line, NUL-separated like the usual profiler endpoint.
async fn cmdline() -> String {
    std::env::args().collect::<Vec<_>>().join("\0")
}

/// Live process and stream state as a JSON document.
async fn vars(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stream = state.reader().map(|reader| {
        let snapshot = reader.state();
        serde_json::json!({
            "length": snapshot.length,
            "closed": snapshot.closed,
            "observers": reader.observer_count(),
        })
    });

    Json(serde_json::json!({
        "uptime_seconds": state.uptime().as_secs(),
        "stream": stream,
    }))
}
