use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use purifier_telemetry_service::app::Application;
use purifier_telemetry_service::config::Config;
use purifier_telemetry_service::db;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing with environment filter support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,purifier_telemetry_service=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env();
    info!(
        "Starting purifier telemetry service for topics {:?}",
        config.mqtt_topics
    );

    // Create database connection pool
    info!("Connecting to site store...");
    let pool = db::connect(&config.database_url).await?;
    info!("Database connection established");

    // Run migrations
    info!("Running database migrations...");
    db::migrate(&pool).await?;
    info!("Database migrations completed");

    // Build the application (spawns server, feed consumer, workers, scheduler)
    let application = Application::build(config, pool).await?;
    application.run_until_stopped().await?;

    Ok(())
}
