use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::adapter::{fetch, AdapterSet};
use crate::config::WatchConfig;
use crate::sink::telegram::{TelegramConfig, TelegramSink};
use crate::store::pg::PgStore;
use crate::telemetry::{self};

pub mod scheduler;

pub use scheduler::Scheduler;

/// adwatch run
#[derive(Args)]
pub struct RunCmd {
    /// Run a single cycle, print its report and exit
    #[arg(long, default_value_t = false)]
    pub once: bool,
}

pub async fn run(pool: &PgPool, args: RunCmd) -> Result<()> {
    let log = telemetry::poll();
    let _g = log.root_span_kv([("once", args.once.to_string())]).entered();

    let cfg = WatchConfig::from_env()?;
    let client = fetch::build_client(cfg.http_timeout)?;
    let sink = TelegramSink::new(TelegramConfig::from_env().with_timeout(cfg.http_timeout)).context("telegram sink")?;
    let store = Arc::new(PgStore::new(pool.clone()));
    let scheduler = Scheduler::new(store.clone(), store, AdapterSet::http(client), Arc::new(sink), cfg);

    if args.once {
        let report = scheduler.run_cycle().await?;
        if telemetry::config::json_mode() {
            log.result(&report)?;
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            telemetry::poll().info("🛑 Ctrl-C received, finishing current cycle");
            on_signal.cancel();
        }
    });
    scheduler.run(cancel).await;
    Ok(())
}
