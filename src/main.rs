use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use securechat::{AppState, Config, app, auth, db};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    let db_pool = db::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open {}", config.database_url))?;
    db::migrate(&db_pool).await.context("failed to run migrations")?;

    if let Some((username, password)) = &config.bootstrap_admin {
        let admin = auth::ensure_admin(&db_pool, username, password, config.min_password_len)
            .await
            .context("failed to create bootstrap admin")?;
        if let Some(admin) = admin {
            tracing::info!(user_id = %admin.id, username = %admin.username, "created bootstrap admin");
        }
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, site = %config.site_name, "listening");

    let state = AppState {
        db_pool,
        config: Arc::new(config),
    };
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
