use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use meetdash::auth::OAuthClient;
use meetdash::http::{self, AppState};
use meetdash::provider::HttpMeetingsProvider;
use meetdash::scheduler::SyncScheduler;
use meetdash::{config, db};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/meetdash.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let oauth = Arc::new(OAuthClient::from_config(&cfg)?);
    let provider: Arc<dyn meetdash::provider::MeetingsProvider> =
        Arc::new(HttpMeetingsProvider::from_config(&cfg)?);

    // Background sync across all connected users.
    let _scheduler = if cfg.sync.auto_sync {
        let scheduler = SyncScheduler::new(
            pool.clone(),
            oauth.clone(),
            provider.clone(),
            Duration::from_secs(cfg.sync.interval_minutes * 60),
        );
        info!(
            interval_minutes = cfg.sync.interval_minutes,
            "automatic sync enabled"
        );
        Some(scheduler.start())
    } else {
        info!("automatic sync disabled by configuration");
        None
    };

    let state = AppState {
        pool,
        oauth,
        provider,
        redirect_uri: cfg.redirect_uri(),
    };
    let app = http::router(&cfg.provider.name, state);

    let listener = tokio::net::TcpListener::bind(&cfg.app.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.app.bind_addr))?;
    info!(addr = %cfg.app.bind_addr, provider = %cfg.provider.name, "server listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
