use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use sqlx::PgPool;

use crate::telemetry::{self};
use crate::telemetry::ops::source::Phase as SourcePhase;
use types::SourceKind;

pub mod db;
pub mod types;

/// adwatch source add/ls/rm
#[derive(Args)]
pub struct SourceCmd {
    #[command(subcommand)]
    pub cmd: SourceSub,
}

#[derive(Subcommand)]
pub enum SourceSub {
    // register a listing page (plan-only by default; use --apply to write)
    Add {
        url: String,
        #[arg(long, value_enum)]
        kind: SourceKind,
        /// Channel the new listings are posted to, e.g. @my_channel or -100123
        #[arg(long)]
        destination: String,
        /// Skip listings whose title contains this text (case-insensitive)
        #[arg(long)]
        filter: Option<String>,
        #[arg(long, default_value_t = false)]
        apply: bool,
    },
    // list sources
    Ls {
        /// Include deleted sources
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    // stop watching a source; history is kept
    Rm {
        source_id: i32,
        #[arg(long, default_value_t = false)]
        apply: bool,
    },
}

pub async fn run(pool: &PgPool, args: SourceCmd) -> Result<()> {
    let log = telemetry::source();
    let _g = log.root_span().entered();
    match args.cmd {
        SourceSub::Add { url, kind, destination, filter, apply } => add_source(pool, url, kind, destination, filter, apply).await?,
        SourceSub::Ls { all } => ls_sources(pool, all).await?,
        SourceSub::Rm { source_id, apply } => rm_source(pool, source_id, apply).await?,
    }
    Ok(())
}

async fn add_source(
    pool: &PgPool,
    url: String,
    kind: SourceKind,
    destination: String,
    filter: Option<String>,
    apply: bool,
) -> Result<()> {
    let log = telemetry::source();
    let _g = log.root_span_kv([
        ("mode", if apply { "apply".to_string() } else { "plan".to_string() }),
        ("kind", kind.as_str().to_string()),
        ("url", url.clone()),
        ("destination", destination.clone()),
        ("filter", format!("{:?}", filter)),
    ]).entered();

    // friendly errors before DB I/O
    kind.validate_listing_url(&url)?;
    let destination = destination.trim().to_string();
    if destination.is_empty() { bail!("--destination must not be empty"); }
    let filter = filter.map(|f| f.trim().to_string()).filter(|f| !f.is_empty());

    if !apply {
        let _s = log.span(&SourcePhase::Plan).entered();
        log.info(format!("📝 Source plan — add kind={} url={} destination={} filter={:?}", kind.as_str(), url, destination, filter));
        log.info("   Use --apply to execute.");
        if telemetry::config::json_mode() {
            let plan = types::SourceAddPlan { action: "add", kind, url, destination, filter_text: filter };
            log.plan(&plan)?;
        }
        return Ok(());
    }

    let _s = log.span(&SourcePhase::Add).entered();
    let source_id = db::insert_source(pool, kind, &url, &destination, filter.as_deref()).await?;
    log.info(format!("➕ Source {} added", source_id));
    if telemetry::config::json_mode() {
        log.result(&types::SourceAddResult { source_id, url })?;
    }
    Ok(())
}

async fn ls_sources(pool: &PgPool, all: bool) -> Result<()> {
    let log = telemetry::source();
    let _g = log.root_span_kv([("all", all.to_string())]).entered();
    let _s = log.span(&SourcePhase::List).entered();
    let sources = db::list_sources(pool, all).await?;
    log.info("📡 Sources:");
    for row in &sources {
        let s = &row.source;
        log.info(format!(
            "[{}] {} {} → {} filter={:?} status={} delivered={} added_at={}",
            s.source_id, s.kind.as_str(), s.url, s.destination, s.filter_text, s.status.as_str(), row.delivered, row.added_at
        ));
    }
    if telemetry::config::json_mode() {
        log.result(&types::SourceList { sources })?;
    }
    Ok(())
}

async fn rm_source(pool: &PgPool, source_id: i32, apply: bool) -> Result<()> {
    let log = telemetry::source();
    let _g = log.root_span_kv([
        ("mode", if apply { "apply".to_string() } else { "plan".to_string() }),
        ("source_id", source_id.to_string()),
    ]).entered();

    if !apply {
        let _s = log.span(&SourcePhase::Plan).entered();
        log.info(format!("📝 Source plan — remove source_id={}", source_id));
        log.info("   Use --apply to execute.");
        if telemetry::config::json_mode() {
            log.plan(&types::SourceRemovePlan { action: "remove", source_id })?;
        }
        return Ok(());
    }

    let _s = log.span(&SourcePhase::Remove).entered();
    let removed = db::mark_deleted(pool, source_id).await?;
    if removed {
        log.info(format!("🗑️ Source {} removed", source_id));
    } else {
        log.warn(format!("Source {} not found or already removed", source_id));
    }
    if telemetry::config::json_mode() {
        log.result(&types::SourceRemoveResult { source_id, removed })?;
    }
    Ok(())
}
