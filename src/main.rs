//! webpilot server binary: binds the WebSocket endpoint and serves until
//! interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webpilot::browser::ChromiumFactory;
use webpilot::llm::OpenAiClient;
use webpilot::server::{AppState, app_router};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webpilot=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = webpilot::load_yaml_config().context("failed to load config.yaml")?;

    let api_key = std::env::var(&config.llm.api_key_env).with_context(|| {
        format!(
            "environment variable {} must hold the completion API key",
            config.llm.api_key_env
        )
    })?;

    let llm = Arc::new(OpenAiClient::new(
        &config.llm.base_url,
        api_key,
        config.llm.model.clone(),
        config.llm.temperature,
    ));
    let engines = Arc::new(ChromiumFactory::new(config.browser.clone()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, model = %config.llm.model, "webpilot listening");

    let app = app_router(AppState {
        config,
        llm,
        engines,
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(signal_error) => {
            error!(%signal_error, "failed to install the shutdown handler");
            // Nothing to wait for without a handler; keep serving instead
            // of exiting at startup.
            std::future::pending::<()>().await;
        }
    }
}
