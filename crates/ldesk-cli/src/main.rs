mod reviews;
mod services;
mod sync;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::reviews::ReviewCommands;
use crate::services::Services;
use crate::sync::SyncCommands;

#[derive(Debug, Parser)]
#[command(name = "ldesk-cli")]
#[command(about = "Listing desk command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Run a sync job in the foreground and wait for it to settle
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Read and reply to reviews
    Reviews {
        #[command(subcommand)]
        command: ReviewCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = ldesk_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = ldesk_db::PoolConfig::from_app_config(&config);
    let pool = ldesk_db::connect_pool(&config.database_url, pool_config).await?;

    match cli.command {
        Commands::Migrate => {
            let applied = ldesk_db::run_migrations(&pool).await?;
            tracing::info!(applied, "migrations complete");
            println!("applied {applied} migration(s)");
        }
        Commands::Sync { command } => {
            let services = Services::connect(pool, &config)?;
            let job = sync::run_sync(&services.sync, &command).await?;
            println!("{}", sync::describe(&job));
        }
        Commands::Reviews { command } => {
            let services = Services::connect(pool, &config)?;
            match command {
                ReviewCommands::List(args) => {
                    let page = reviews::run_reviews_list(&services.pages, &args).await?;
                    print!("{}", reviews::render_page(&page));
                }
                ReviewCommands::Reply { id, text } => {
                    let review = reviews::run_reviews_reply(&services.lifecycle, id, &text).await?;
                    println!("replied to review {} ({})", review.id, review.reviewer_name);
                }
            }
        }
    }

    Ok(())
}
