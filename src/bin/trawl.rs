use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chequerd::config::AppConfig;
use chequerd::db::{self, SqliteCourseStore};
use chequerd::error::TrawlError;
use chequerd::roster::RosterHttpClient;
use chequerd::services::{TermLocks, TrawlService};
use chequerd::sync::{TracingReporter, TrawlSummary};

/// Synchronize one term of the course catalog with the class roster.
#[derive(Parser, Debug)]
#[command(name = "trawl", version)]
struct Args {
    /// Term code, e.g. SP24
    term: String,

    /// Maximum concurrent subject fetches and course writes
    #[arg(long, env = "TRAWL_CONCURRENCY")]
    concurrency: Option<usize>,

    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Base URL of the roster API
    #[arg(long, env = "ROSTER_API_URL")]
    roster_url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chequerd=info,trawl=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(summary) => {
            info!(
                "{}: {} subject(s), {} course(s) fetched",
                summary.term, summary.subjects, summary.fetched
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            if let Some(TrawlError::Apply { failures, .. }) = e.downcast_ref::<TrawlError>() {
                for failure in failures {
                    error!("{}", failure);
                }
            }
            error!("trawl failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<TrawlSummary, Box<dyn std::error::Error>> {
    let mut config = AppConfig::from_env()?;
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if let Some(url) = args.roster_url {
        config.roster.base_url = url;
    }
    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 {
            return Err("--concurrency must be greater than zero".into());
        }
        config.trawl.concurrency = concurrency;
    }

    info!("Connecting to database...");
    let pool = db::connect(&config.database_url, config.db.max_connections).await?;
    db::MIGRATOR.run(&pool).await?;

    let service = TrawlService::with_config(
        Arc::new(SqliteCourseStore::new(pool)),
        Arc::new(RosterHttpClient::new(config.roster)?),
        TermLocks::default(),
        config.trawl,
    );

    let summary = service
        .reconcile_with_progress(&args.term, &TracingReporter)
        .await?;
    Ok(summary)
}
