//! HTTP surface for the live log relay.
//!
//! Two listeners: the producer uploads to `PUT /log` on the input port, and
//! consumers stream from `GET /log/<token>` on the output port (optionally
//! TLS). The input port also carries `/metrics` and, when debugging is
//! enabled, the diagnostics routes.

mod debug;
mod error;
pub mod handlers;
mod http;
pub mod metrics;
mod middleware;

pub use handlers::AppState;
pub use http::RelayServer;
