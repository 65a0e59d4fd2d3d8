//! Relay entry point: read the environment, bind the listeners, serve.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use livelog::server::RelayServer;
use livelog::Config;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("livelog: {}", err);
            std::process::exit(err.exit_code());
        }
    };

    init_tracing(config.debug);

    let server = match RelayServer::bind(&config).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "failed to bind listeners");
            std::process::exit(1);
        }
    };

    if let Err(err) = server.run().await {
        tracing::error!(error = %err, "server failed");
        std::process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "livelog=debug,info" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}
