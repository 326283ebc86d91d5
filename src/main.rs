use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;

use bk_counsel::config::Config;
use bk_counsel::store::PgStore;
use bk_counsel::token::TokenService;
use bk_counsel::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::from_env()?;
    log::debug!("Loaded {:?}", config);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url.expose_secret())
        .await
        .context("could not connect to the database")?;
    let store = PgStore::new(pool);
    store.migrate().await.context("could not apply migrations")?;

    let tokens = TokenService::new(
        config.token_secret.expose_secret().as_bytes(),
        Duration::hours(config.token_ttl_hours),
    )
    .map_err(|err| anyhow::anyhow!("unusable TOKEN_SECRET: {}", err))?;

    log::info!("Session tokens expire after {} hours", tokens.ttl().num_hours());
    let app = app(AppState::new(Arc::new(store), tokens));

    log::info!("Starting BK counseling server on http://{}", config.bind_addr);
    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
