//! Llamagate server library.
//!
//! Provides a reusable server function to serve the gateway either for the
//! binary, or for the integration tests.

#![deny(missing_docs)]

mod access_log;
mod cors;
mod health;

use std::net::SocketAddr;

use anyhow::anyhow;
use axum::{Router, middleware, routing::get};
use axum_server::tls_rustls::RustlsConfig;
use config::Config;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// Configuration for serving the gateway.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// The deserialized llamagate TOML configuration.
    pub config: Config,
}

/// Starts and runs the gateway server with the provided configuration.
pub async fn serve(ServeConfig { listen_address, config }: ServeConfig) -> anyhow::Result<()> {
    let cors = match &config.server.cors {
        Some(cors_config) => cors::generate(cors_config),
        None => CorsLayer::permissive(),
    };

    let gateway_router = gateway::router(config.backend.clone())?;

    let mut app = Router::new().merge(gateway_router.layer(cors.clone()));

    if config.server.health.enabled {
        if let Some(listen) = config.server.health.listen {
            tokio::spawn(health::bind_health_endpoint(
                listen,
                config.server.tls.clone(),
                config.server.health.clone(),
            ));
        } else {
            let health_router = Router::new()
                .route(&config.server.health.path, get(health::health))
                .layer(cors);

            app = app.merge(health_router);
        }
    }

    let app = app.layer(middleware::from_fn(access_log::access_log));

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("failed to bind to {listen_address}: {e}"))?;

    match &config.server.tls {
        Some(tls_config) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls_config.certificate, &tls_config.key)
                .await
                .map_err(|e| anyhow!("failed to load TLS certificate and key: {e}"))?;

            log::info!("chat endpoints available at: https://{listen_address}/chat");

            axum_server::from_tcp_rustls(listener.into_std()?, rustls_config)
                .serve(app.into_make_service())
                .await
                .map_err(|e| anyhow!("failed to start HTTPS server: {e}"))?;
        }
        None => {
            log::info!("chat endpoints available at: http://{listen_address}/chat");

            axum::serve(listener, app)
                .await
                .map_err(|e| anyhow!("failed to start HTTP server: {e}"))?;
        }
    }

    Ok(())
}
