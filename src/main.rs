#![forbid(unsafe_code)]

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use upload_gateway::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tokio::fs::create_dir_all(&cfg.store_root)
        .await
        .with_context(|| format!("create store root {}", cfg.store_root.display()))?;

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr)
        .await
        .with_context(|| format!("bind {}", cfg.listen_addr))?;

    tracing::info!(
        bind = %cfg.listen_addr,
        store_root = %cfg.store_root.display(),
        sub_path = %cfg.sub_path,
        "upload-gateway listening"
    );

    let app = upload_gateway::app(cfg);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM so in-flight transfers drain before exit.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
