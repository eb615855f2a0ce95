use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use purifier_telemetry_service::db::{self, SiteRepository};
use purifier_telemetry_service::services::SiteUpsertRequest;

#[derive(Parser)]
#[command(name = "seed-sites")]
#[command(about = "Provision purifier site definitions from a JSON file", long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env)]
    database_url: String,

    /// Path to a JSON file containing an array of site definitions
    #[arg(long)]
    file: PathBuf,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if it exists (ignore errors if not found)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if !cli.file.exists() {
        return Err(format!("File not found: {:?}", cli.file).into());
    }

    let contents = std::fs::read_to_string(&cli.file)?;
    let requests: Vec<SiteUpsertRequest> = serde_json::from_str(&contents)?;

    if requests.is_empty() {
        println!("No site definitions found in {:?}", cli.file);
        return Ok(());
    }

    // Confirmation prompt
    if !cli.yes {
        println!(
            "\n⚠️  This will upsert {} site definitions into the database.",
            requests.len()
        );
        println!("File: {:?}", cli.file);
        println!("\nContinue? [y/N]: ");

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Seeding cancelled.");
            return Ok(());
        }
    }

    info!("Connecting to database...");
    let pool = db::connect(&cli.database_url).await?;
    db::migrate(&pool).await?;

    let site_repo = SiteRepository::new(pool);

    let mut upserted = 0;
    let mut failed = Vec::new();

    for (index, request) in requests.into_iter().enumerate() {
        match request.validate() {
            Ok(upsert) => match site_repo.upsert(&upsert).await {
                Ok(site) => {
                    println!("✓ {}", site.site_id);
                    upserted += 1;
                }
                Err(e) => {
                    println!("✗ {}: {}", upsert.site_id, e);
                    failed.push((upsert.site_id.clone(), e.to_string()));
                }
            },
            Err(missing) => {
                let label = format!("entry {}", index + 1);
                let reason = format!("missing required fields: {}", missing.join(", "));
                println!("✗ {label}: {reason}");
                failed.push((label, reason));
            }
        }
    }

    // Print summary
    println!("\n{}", "=".repeat(60));
    println!("Seed Summary");
    println!("{}", "=".repeat(60));
    println!("Upserted:           {upserted}");
    println!("Failed:             {}", failed.len());
    println!("{}", "=".repeat(60));

    if !failed.is_empty() {
        println!("\nFailed Definitions:");
        for (label, reason) in &failed {
            println!("  {label}: {reason}");
        }
        return Err(format!("{} site definitions failed", failed.len()).into());
    }

    Ok(())
}
