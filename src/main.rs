use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::env;

mod adapter;
mod config;
mod delivery;
mod diff;
mod init;
mod sink;
mod source;
mod store;
mod telemetry;
mod watch;
#[cfg(test)]
mod testing;

#[derive(Parser)]
#[command(name = "adwatch", about = "Watch classified-ad listings and post new items to a channel")]
struct Cli {
    #[arg(global = true, short, long)]
    dsn: Option<String>,
    /// Emit a single JSON envelope to stdout; logs go to stderr
    #[arg(global = true, long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Init(init::InitCmd),
    Source(source::SourceCmd),
    Run(watch::RunCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);

    // initialize logging/tracing (stderr). Respect RUST_LOG and ADWATCH_LOG_FORMAT
    telemetry::config::init_tracing();
    let dsn = cli
        .dsn
        .or_else(|| env::var("DATABASE_URL").ok())
        .context("Please provide --dsn or set DATABASE_URL in .env")?;

    let pool = init::connect(&dsn).await?;

    match cli.command {
        Commands::Init(args) => init::run(&pool, args).await?,
        Commands::Source(args) => source::run(&pool, args).await?,
        Commands::Run(args) => watch::run(&pool, args).await?,
    }

    Ok(())
}
