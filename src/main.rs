mod config;
mod heartbeat;
mod rate_limit;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::RelayConfig::from_env().expect("invalid relay configuration");
    let port = config.port;
    tracing::info!(
        max_content_bytes = config.max_content_bytes,
        ping_interval_ms = config.heartbeat.ping_interval.as_millis(),
        ping_timeout_ms = config.heartbeat.ping_timeout.as_millis(),
        "relay configured"
    );

    let state = state::AppState::new(config);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, path = routes::SOCKET_PATH, "chat relay listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
