use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

use adtrack::config::{Config, DatabaseBackend};
use adtrack::models::ReportPeriod;
use adtrack::storage::{PostgresStorage, SqliteStorage, Storage, StorageError};
use adtrack::tracking::SummaryAggregator;

#[derive(Parser)]
#[command(name = "adtrack-admin")]
#[command(about = "Ad tracking admin CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage media groups
    #[command(subcommand)]
    Media(MediaCommands),
    /// Manage ads and their tracking codes
    #[command(subcommand)]
    Ad(AdCommands),
    /// Print performance reports
    #[command(subcommand)]
    Report(ReportCommands),
}

#[derive(Subcommand)]
enum MediaCommands {
    /// Create a media group
    Add { name: String },
    /// List active media
    List,
    /// Soft delete a media group; its ads drop out of the media report
    Delete { media_id: i64 },
}

#[derive(Subcommand)]
enum AdCommands {
    /// Create an ad under a media group
    Add {
        media_id: i64,
        name: String,
        /// Tracking code used in the landing URL
        code: String,
    },
    /// List active ads
    List,
    /// Soft delete an ad; its tracking code stays reserved
    Delete { ad_id: i64 },
}

#[derive(Subcommand)]
enum ReportCommands {
    /// Per-media summary
    Media(PeriodArgs),
    /// Per-ad summary
    Ads(PeriodArgs),
}

#[derive(Args)]
struct PeriodArgs {
    /// Start time (Unix timestamp, inclusive)
    #[arg(long)]
    start: Option<i64>,
    /// End time (Unix timestamp, exclusive)
    #[arg(long)]
    end: Option<i64>,
}

impl From<PeriodArgs> for ReportPeriod {
    fn from(args: PeriodArgs) -> Self {
        ReportPeriod {
            start: args.start,
            end: args.end,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(
            SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
        DatabaseBackend::Postgres => Arc::new(
            PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
    };

    // Ensure database is initialized
    storage.init().await?;

    match cli.command {
        Commands::Media(MediaCommands::Add { name }) => {
            let media = storage.create_media(&name).await?;
            println!("✓ Created media '{}' with id {}", name, media.media_id);
        }
        Commands::Media(MediaCommands::List) => {
            let media = storage.list_media().await?;
            if media.is_empty() {
                println!("No media found.");
            } else {
                println!("{:<10} {}", "ID", "Name");
                println!("{}", "-".repeat(50));
                for m in media {
                    println!("{:<10} {}", m.media_id, m.name.unwrap_or_default());
                }
            }
        }
        Commands::Media(MediaCommands::Delete { media_id }) => {
            if storage.deactivate_media(media_id).await? {
                println!("✓ Deleted media {}", media_id);
            } else {
                println!("⚠ Media {} not found or already deleted", media_id);
            }
        }
        Commands::Ad(AdCommands::Add {
            media_id,
            name,
            code,
        }) => match storage.create_ad(media_id, &name, &code).await {
            Ok(ad) => println!("✓ Created ad '{}' ({}) with id {}", name, code, ad.ad_id),
            Err(StorageError::Conflict) => bail!("tracking code '{}' is already in use", code),
            Err(StorageError::Other(e)) => return Err(e),
        },
        Commands::Ad(AdCommands::List) => {
            let ads = storage.list_ads().await?;
            if ads.is_empty() {
                println!("No ads found.");
            } else {
                println!("{:<10} {:<10} {:<20} {}", "ID", "Media", "Code", "Name");
                println!("{}", "-".repeat(70));
                for ad in ads {
                    println!(
                        "{:<10} {:<10} {:<20} {}",
                        ad.ad_id, ad.media_id, ad.code, ad.name
                    );
                }
            }
        }
        Commands::Ad(AdCommands::Delete { ad_id }) => {
            if storage.deactivate_ad(ad_id).await? {
                println!("✓ Deleted ad {}", ad_id);
            } else {
                println!("⚠ Ad {} not found or already deleted", ad_id);
            }
        }
        Commands::Report(report) => {
            let aggregator = SummaryAggregator::new(Arc::clone(&storage), Duration::from_secs(60));
            print_report(&aggregator, report).await?;
        }
    }

    Ok(())
}

async fn print_report(aggregator: &SummaryAggregator, report: ReportCommands) -> Result<()> {
    match report {
        ReportCommands::Media(period) => {
            let rows = aggregator.media_summary(period.into()).await?;
            println!(
                "{:<8} {:<24} {:>10} {:>10} {:>10} {:>8}",
                "ID", "Media", "Accesses", "Visitors", "Orders", "Rate"
            );
            println!("{}", "-".repeat(75));
            for row in rows {
                println!(
                    "{:<8} {:<24} {:>10} {:>10} {:>10} {:>7.1}%",
                    row.media_id,
                    row.media_name.unwrap_or_default(),
                    row.total_accesses,
                    row.unique_visitors,
                    row.conversions,
                    row.conversion_rate * 100.0
                );
            }
        }
        ReportCommands::Ads(period) => {
            let rows = aggregator.ad_summary(period.into()).await?;
            println!(
                "{:<8} {:<16} {:<20} {:>10} {:>10} {:>10} {:>8}",
                "ID", "Code", "Ad", "Accesses", "Visitors", "Orders", "Rate"
            );
            println!("{}", "-".repeat(88));
            for row in rows {
                println!(
                    "{:<8} {:<16} {:<20} {:>10} {:>10} {:>10} {:>7.1}%",
                    row.ad_id,
                    row.ad_code,
                    row.ad_name,
                    row.total_accesses,
                    row.unique_visitors,
                    row.conversions,
                    row.conversion_rate * 100.0
                );
            }
        }
    }
    Ok(())
}
