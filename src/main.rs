use anyhow::Context;
use anyhow::Result;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use creator_market::config::Config;
use creator_market::{build_state, init_pool, init_router};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = init_pool(&config.database_url).await?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    if config.gateway_credentials().is_none() {
        warn!("razorpay credentials missing, paid plans are disabled");
    }

    let app = init_router(build_state(&config, pool));

    let addr: SocketAddr = ([0, 0, 0, 0], config.server_port).into();
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
