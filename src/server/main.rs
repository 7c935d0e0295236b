use anyhow::{Context, Result};
use mlqueue_core::domains::tasks::scheduler::{self, SchedulerConfig};
use mlqueue_core::kernel::{db, redis_conn};
use mlqueue_core::server::{build_app, AppState};
use mlqueue_core::Config;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mlqueue=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting MLQueue");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!("configuration loaded");

    tracing::info!("connecting to database...");
    let pool = db::connect(&config.database_url, config.database_max_connections)
        .await
        .context("failed to connect to database")?;
    db::migrate(&pool).await.context("failed to run migrations")?;
    tracing::info!("database connected and migrated");

    tracing::info!("connecting to queue-index store...");
    let redis = redis_conn::connect(&config.redis_url)
        .await
        .context("failed to connect to redis")?;
    tracing::info!("queue-index store connected");

    let scheduler_config = SchedulerConfig {
        worker_count: config.scheduler_worker_count,
        poll_timeout: std::time::Duration::from_secs(config.scheduler_poll_timeout_secs),
        pause_poll_interval: std::time::Duration::from_secs(config.scheduler_pause_poll_secs),
        webhook_max_retries: config.webhook_max_retries,
    };

    let state = AppState::new(pool, redis.clone(), config);
    let shutdown = CancellationToken::new();

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(state.config.webhook_timeout_secs))
        .build()
        .context("failed to build webhook http client")?;

    let worker_handles = scheduler::spawn_workers(
        scheduler_config,
        state.db.clone(),
        redis,
        http,
        state.pause.clone(),
        shutdown.clone(),
    );

    let app = build_app(state.clone());

    let addr = format!("{}:{}", state.config.bind_addr, state.config.port);
    tracing::info!(addr = %addr, "binding");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            tracing::info!("shutdown signal received, cancelling scheduler");
            server_shutdown.cancel();
        })
        .await
        .context("server error")?;

    // Join every worker so in-flight tasks finish before the process exits.
    shutdown.cancel();
    for handle in worker_handles {
        let _ = handle.await;
    }

    tracing::info!("MLQueue stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
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
