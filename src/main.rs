use clap::Parser;
use tracing::{error, Level};

use history::{
    cli::{run_backfill, run_migrate, run_serve, Cli, Commands},
    error::Error,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    let result = app_main().await;

    if let Err(err) = &result {
        error!("{}", err);
    }

    result
}

async fn app_main() -> Result<(), Error> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_level(true)
        .with_max_level({
            #[cfg(debug_assertions)]
            {
                Level::DEBUG
            }

            #[cfg(not(debug_assertions))]
            {
                Level::INFO
            }
        })
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Serve) => run_serve().await,
        Some(Commands::Migrate) => run_migrate().await,
        Some(Commands::Backfill { since }) => run_backfill(since).await,
    }
}
