use anyhow::{Context, Result};
use clap::Args;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::telemetry::{self};
use crate::telemetry::ops::init::Phase as InitPhase;

/// adwatch init
#[derive(Args)]
pub struct InitCmd {}

pub async fn connect(dsn: &str) -> Result<PgPool> {
    let log = telemetry::init();
    let _s = log.span(&InitPhase::Connect).entered();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(dsn)
        .await
        .context("connect to database")?;
    Ok(pool)
}

pub async fn run(pool: &PgPool, _args: InitCmd) -> Result<()> {
    let log = telemetry::init();
    let _g = log.root_span().entered();
    let _s = log.span(&InitPhase::Migrate).entered();

    // Apply any pending migrations (idempotent)
    sqlx::migrate!().run(pool).await.context("apply migrations")?;

    log.info("✅ Database initialized");
    if telemetry::config::json_mode() {
        log.result(&serde_json::json!({ "migrated": true }))?;
    }
    Ok(())
}
