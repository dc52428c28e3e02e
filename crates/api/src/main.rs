use anyhow::Context;
use tracing::info;

use estateerp_infra::config::AppConfig;
use estateerp_observability::{LogFormat, init_with};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    init_with(LogFormat::parse(&config.log_format), "info");

    let bind_addr = config.bind_addr;
    let (app, services) = estateerp_api::app::build_app(config)
        .await
        .context("failed to start services")?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
        .context("server error")?;

    services.shutdown();
    Ok(())
}
