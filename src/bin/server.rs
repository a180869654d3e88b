//! athenaeum-server: binds the web, MCP, and WebSocket listeners and runs
//! the janitor sweep in the background.

use std::sync::Arc;

use athenaeum::config::Config;
use athenaeum::mcp::transport;
use athenaeum::state::AppState;
use axum::routing::{get, post};
use axum::Router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    init_tracing(&config);

    let state = Arc::new(AppState::new(config)?);

    let web_addr = state.config.web_server_addr().socket_addr()?;
    let mcp_addr = state.config.mcp_server_addr().socket_addr()?;
    let ws_addr = state.config.ws_server_addr().socket_addr()?;

    let web_router = athenaeum::http::router(state.clone());
    let ws_router = Router::new()
        .route("/ws", get(athenaeum::http::ws_upgrade))
        .with_state(state.clone());
    let mcp_router = Router::new()
        .route("/mcp", post(transport::post).get(transport::get).delete(transport::delete))
        .with_state(state.clone());

    let janitor_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            ticker.tick().await;
            janitor_state.purge_expired();
        }
    });

    tracing::info!(%web_addr, %mcp_addr, %ws_addr, "starting athenaeum");

    let web = async {
        let listener = tokio::net::TcpListener::bind(web_addr).await?;
        axum::serve(listener, web_router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };
    let mcp = async {
        let listener = tokio::net::TcpListener::bind(mcp_addr).await?;
        axum::serve(listener, mcp_router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };
    let ws = async {
        let listener = tokio::net::TcpListener::bind(ws_addr).await?;
        axum::serve(listener, ws_router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };

    tokio::try_join!(web, mcp, ws)?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
