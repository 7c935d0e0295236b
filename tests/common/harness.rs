//! Test harness with testcontainers for integration testing.
//!
//! Shared Postgres and Redis containers are started once and reused across
//! all tests; migrations run once on first use. Each test gets a fresh
//! server bound to an ephemeral port with its own scheduler worker pool.

use anyhow::{Context, Result};
use mlqueue_core::kernel::{db, redis_conn};
use mlqueue_core::{
    domains::tasks::scheduler::{self, SchedulerConfig},
    server::{build_app, AppState},
    Config,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

struct SharedTestInfra {
    db_url: String,
    redis_url: String,
    _postgres: ContainerAsync<GenericImage>,
    _redis: ContainerAsync<Redis>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = GenericImage::new("postgres", "16-alpine")
            .with_wait_for(testcontainers::core::WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_exposed_port(testcontainers::core::ContainerPort::Tcp(5432))
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_DB", "postgres")
            .start()
            .await
            .context("failed to start postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{pg_host}:{pg_port}/postgres");

        let redis = Redis::default()
            .start()
            .await
            .context("failed to start redis container")?;
        let redis_host = redis.get_host().await?;
        let redis_port = redis.get_host_port_ipv4(6379).await?;
        let redis_url = format!("redis://{redis_host}:{redis_port}");

        let pool = PgPool::connect(&db_url)
            .await
            .context("failed to connect to postgres for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        pool.close().await;

        Ok(Self {
            db_url,
            redis_url,
            _postgres: postgres,
            _redis: redis,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async { Self::init().await.expect("failed to init test infra") })
            .await
    }
}

/// A running instance of the service under test, bound to an ephemeral port.
pub struct TestHarness {
    pub db: PgPool,
    pub base_url: String,
    pub http: reqwest::Client,
    pub config: Config,
    shutdown: CancellationToken,
    worker_handles: Vec<tokio::task::JoinHandle<()>>,
    server_handle: tokio::task::JoinHandle<()>,
}

fn test_config(infra: &SharedTestInfra) -> Config {
    Config {
        database_url: infra.db_url.clone(),
        database_max_connections: 5,
        redis_url: infra.redis_url.clone(),
        redis_max_connections: 5,
        bind_addr: "127.0.0.1".to_string(),
        port: 0,
        jwt_secret: String::new(),
        quota_standard_per_minute: 100,
        quota_premium_per_minute: 1000,
        quota_batch_per_minute: 20,
        scheduler_worker_count: 2,
        scheduler_poll_timeout_secs: 1,
        scheduler_pause_poll_secs: 1,
        webhook_timeout_secs: 5,
        webhook_max_retries: 2,
        request_timeout_secs: 10,
    }
}

impl TestHarness {
    /// Boot a fresh server against the shared containers, with the given
    /// quota limits override (so individual tests can exercise the rate
    /// limiter without waiting on the production defaults).
    pub async fn with_quota(standard: u32, premium: u32, batch: u32) -> Self {
        let infra = SharedTestInfra::get().await;
        let mut config = test_config(infra);
        config.quota_standard_per_minute = standard;
        config.quota_premium_per_minute = premium;
        config.quota_batch_per_minute = batch;
        Self::boot(config).await
    }

    pub async fn new() -> Self {
        let infra = SharedTestInfra::get().await;
        Self::boot(test_config(infra)).await
    }

    async fn boot(config: Config) -> Self {
        let pool = db::connect(&config.database_url, config.database_max_connections)
            .await
            .expect("failed to connect test pool");
        let redis = redis_conn::connect(&config.redis_url)
            .await
            .expect("failed to connect test redis");

        let scheduler_config = SchedulerConfig {
            worker_count: config.scheduler_worker_count,
            poll_timeout: Duration::from_secs(config.scheduler_poll_timeout_secs),
            pause_poll_interval: Duration::from_secs(config.scheduler_pause_poll_secs),
            webhook_max_retries: config.webhook_max_retries,
        };

        let state = AppState::new(pool.clone(), redis.clone(), config.clone());
        let shutdown = CancellationToken::new();
        let http = reqwest::Client::new();

        let worker_handles = scheduler::spawn_workers(
            scheduler_config,
            state.db.clone(),
            redis,
            http.clone(),
            state.pause.clone(),
            shutdown.clone(),
        );

        let app = build_app(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("listener has no local addr");

        let server_shutdown = shutdown.clone();
        let server_handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await;
        });

        Self {
            db: pool,
            base_url: format!("http://{addr}"),
            http,
            config,
            shutdown,
            worker_handles,
            server_handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Poll `condition` every 25ms for up to 2s.
    pub async fn wait_for<F, Fut>(&self, condition: F) -> bool
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..80 {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        false
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.worker_handles {
            let _ = handle.await;
        }
        let _ = self.server_handle.await;
        self.db.close().await;
    }
}
