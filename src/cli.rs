//! Command line entry points: the long running service and the one-shot
//! maintenance commands.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::{
    configuration::{
        get_configuration, set_configuration, AppState, Config, State,
    },
    error::Error,
    ingestion::{Ingestion, IngestionSettings},
    provider::{DatabasePool, RpcFactory},
    types::EventCatalog,
};

/// Perpetual exchange event history
#[derive(Parser)]
#[command(name = "history")]
#[command(about = "Ingests perpetual exchange contract events into Postgres", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run live ingestion with heartbeat and redundancy timers (default)
    Serve,

    /// Create missing tables and exit
    Migrate,

    /// Run one backfill pass up to the chain head and exit
    Backfill {
        /// Start time (RFC 3339) instead of the stored cursors
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
}

pub fn init_config() -> Result<Config, Error> {
    set_configuration()?;
    get_configuration()
}

async fn init_state() -> Result<AppState<State>, Error> {
    let config = init_config()?;
    let database = DatabasePool::new(&config).await?;
    let state = State::new(config, database).await?;

    Ok(AppState::new(state))
}

pub fn build_ingestion(app_state: &AppState<State>) -> Result<Ingestion, Error> {
    let config = &app_state.config;
    let factory = Arc::new(RpcFactory::new(config)?);
    let catalog =
        EventCatalog::new(config.perpetual_manager, config.share_tokens.clone());

    Ok(Ingestion::new(
        IngestionSettings::from(config),
        catalog,
        app_state.database.clone(),
        factory,
    ))
}

pub async fn run_serve() -> Result<(), Error> {
    let app_state = init_state().await?;
    let ingestion = Arc::new(build_ingestion(&app_state)?);

    info!(
        chain_id = app_state.config.chain_id,
        share_tokens = app_state.config.share_tokens.len(),
        "Starting ingestion"
    );

    ingestion.serve().await
}

pub async fn run_migrate() -> Result<(), Error> {
    let config = init_config()?;
    let database = DatabasePool::new(&config).await?;
    database.init_migrations().await?;
    info!("Migrations complete");

    Ok(())
}

pub async fn run_backfill(since: Option<DateTime<Utc>>) -> Result<(), Error> {
    let app_state = init_state().await?;
    let ingestion = build_ingestion(&app_state)?;

    let report = ingestion.backfill(since).await?;

    for (target, done) in &report.completed {
        info!(
            %target,
            from_block = done.from_block,
            to_block = done.to_block,
            inserted = done.handled.inserted,
            confirmed = done.handled.confirmed,
            skipped = done.handled.skipped,
            "Backfill finished"
        );
    }

    if let Some((target, message)) = report.failed.first() {
        return Err(Error::TaskError(format!(
            "Backfill of {} failed: {}",
            target, message
        )));
    }

    Ok(())
}
