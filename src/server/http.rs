//! Listener setup and serving for the relay.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::routing::{any, get, put};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;

use super::debug;
use super::handlers::{self, AppState};
use super::metrics::Metrics;
use super::middleware::TelemetryLayer;
use crate::config::Config;

/// The upload listener binds loopback only; uploads come from the local
/// job runner. The consumer listener is reachable from outside.
const PUT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const GET_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

enum GetListener {
    Plain(tokio::net::TcpListener),
    Tls(std::net::TcpListener, RustlsConfig),
}

/// The relay's two HTTP servers, bound and ready to run.
///
/// Binding is separate from serving so tests can bind port 0 and read the
/// assigned addresses before the servers start.
pub struct RelayServer {
    put_listener: tokio::net::TcpListener,
    get_listener: GetListener,
    put_router: Router,
    get_router: Router,
    put_addr: SocketAddr,
    get_addr: SocketAddr,
}

impl RelayServer {
    /// Binds both listeners and builds the routers.
    pub async fn bind(config: &Config) -> io::Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let state = AppState::new(config.access_token.clone(), metrics.clone());

        let put_router = Router::new()
            .route("/log", put(handlers::handle_put))
            .route("/metrics", get(handlers::handle_metrics));
        let put_router = if config.debug {
            put_router.merge(debug::router())
        } else {
            put_router
        };
        let put_router = put_router
            .layer(TelemetryLayer::new(metrics.clone()))
            .with_state(state.clone());

        let get_router = Router::new()
            .route("/log/{token}", any(handlers::handle_log))
            .layer(TelemetryLayer::new(metrics))
            .with_state(state);

        let put_listener =
            tokio::net::TcpListener::bind(SocketAddr::new(PUT_ADDR, config.put_port)).await?;
        let put_addr = put_listener.local_addr()?;

        let (get_listener, get_addr) = match &config.tls {
            None => {
                let listener =
                    tokio::net::TcpListener::bind(SocketAddr::new(GET_ADDR, config.get_port))
                        .await?;
                let addr = listener.local_addr()?;
                (GetListener::Plain(listener), addr)
            }
            Some(tls) => {
                let rustls = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file).await?;
                let listener =
                    std::net::TcpListener::bind(SocketAddr::new(GET_ADDR, config.get_port))?;
                listener.set_nonblocking(true)?;
                let addr = listener.local_addr()?;
                (GetListener::Tls(listener, rustls), addr)
            }
        };

        Ok(Self {
            put_listener,
            get_listener,
            put_router,
            get_router,
            put_addr,
            get_addr,
        })
    }

    /// Address the upload listener is bound to.
    pub fn put_addr(&self) -> SocketAddr {
        self.put_addr
    }

    /// Address the consumer listener is bound to.
    pub fn get_addr(&self) -> SocketAddr {
        self.get_addr
    }

    /// Serves both listeners until a shutdown signal arrives.
    pub async fn run(self) -> io::Result<()> {
        let RelayServer {
            put_listener,
            get_listener,
            put_router,
            get_router,
            put_addr,
            get_addr,
        } = self;

        let get_server = tokio::spawn(async move {
            let served = match get_listener {
                GetListener::Plain(listener) => {
                    tracing::info!(addr = %get_addr, "output listener started");
                    axum::serve(listener, get_router).await
                }
                GetListener::Tls(listener, rustls) => {
                    tracing::info!(addr = %get_addr, "output listener started (tls)");
                    axum_server::from_tcp_rustls(listener, rustls)
                        .serve(get_router.into_make_service())
                        .await
                }
            };
            if let Err(err) = served {
                tracing::error!(error = %err, "output listener failed");
            }
        });

        tracing::info!(addr = %put_addr, "input listener started");
        let result = axum::serve(put_listener, put_router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        get_server.abort();
        result
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            access_token: "tok".to_string(),
            put_port: 0,
            get_port: 0,
            tls: None,
            debug: true,
        }
    }

    #[tokio::test]
    async fn should_bind_ephemeral_ports() {
        // given/when
        let server = RelayServer::bind(&test_config()).await.unwrap();

        // then
        assert_ne!(server.put_addr().port(), 0);
        assert_ne!(server.get_addr().port(), 0);
        assert_ne!(server.put_addr().port(), server.get_addr().port());
        assert!(server.put_addr().ip().is_loopback());
    }
}
