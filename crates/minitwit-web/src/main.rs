mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use minitwit_web::client::ApiClient;
use minitwit_web::{WebState, WebStateInner};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minitwit=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let api = ApiClient::new(&config.endpoint)?;
    info!("Using API at {}", config.endpoint);

    let state: WebState = Arc::new(WebStateInner {
        api,
        session_secret: config.session_secret,
    });

    let app = minitwit_web::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("MiniTwit front end listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received Ctrl+C, shutting down...");
        })
        .await?;

    Ok(())
}
