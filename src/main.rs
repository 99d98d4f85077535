mod api_doc;
mod app;
mod config;
mod error;
mod gateway;
mod handlers;
mod models;
mod record;
mod routes;
mod state;
mod store;

use anyhow::Context;
use tokio::net::TcpListener;

use config::{Config, RunMode};
use state::AppState;
use store::RecordClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("user_router=info,tower_http=info")
            }),
        )
        .init();

    tracing::info!("user-router starting");

    let config = Config::from_env()?;
    config.log_startup();

    let records = RecordClient::new(store::connect(&config).await?);
    match records.health_check().await {
        Ok(()) => tracing::info!("Record store '{}' is reachable", records.backend_name()),
        Err(err) => tracing::warn!(
            "Record store '{}' failed its health check: {}",
            records.backend_name(),
            err
        ),
    }

    let app = app::build_router(AppState { records }, config.swagger_ui);

    match config.run_mode {
        RunMode::Lambda => gateway::run(app).await,
        RunMode::Serve => {
            let addr = format!("{}:{}", config.service_host, config.service_port);
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            tracing::info!("Listening on http://{}", listener.local_addr()?);
            if config.swagger_ui {
                tracing::info!("Swagger UI available at {}", app::SWAGGER_UI_PATH);
            }
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("HTTP server failed")?;
            tracing::info!("Shut down");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}
