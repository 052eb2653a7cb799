use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chequerd::api::router;
use chequerd::config::AppConfig;
use chequerd::db::{self, CourseStore, SqliteCourseStore};
use chequerd::roster::{RosterClient, RosterHttpClient};
use chequerd::services::{TermLocks, TrawlScheduler};
use chequerd::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chequerd=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let pool = db::connect(&config.database_url, config.db.max_connections).await?;
    db::MIGRATOR.run(&pool).await?;

    let store: Arc<dyn CourseStore> = Arc::new(SqliteCourseStore::new(pool.clone()));
    let roster: Arc<dyn RosterClient> = Arc::new(RosterHttpClient::new(config.roster.clone())?);

    let state = AppState {
        db: pool,
        store,
        roster,
        locks: TermLocks::default(),
        search: config.search.clone(),
        trawl: config.trawl.clone(),
    };

    if let Some(schedule) = config.scheduler {
        let scheduler =
            TrawlScheduler::new(state.trawl_service(), schedule.terms, schedule.interval);
        tokio::spawn(scheduler.start());
    }

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
