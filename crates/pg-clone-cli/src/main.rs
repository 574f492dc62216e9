//! pg-clone CLI - refresh a local PostgreSQL database from a production
//! snapshot, preserving referential structure.

use clap::{Parser, Subcommand};
use pg_clone::{CloneError, Config, Orchestrator, SOURCE_URL_VAR, TARGET_URL_VAR};
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser)]
#[command(name = "pg-clone")]
#[command(about = "Dependency-aware PostgreSQL database cloning")]
#[command(version)]
struct Cli {
    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Output the run report as JSON to stdout
    #[arg(long)]
    output_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone the source database into the destination
    Run {
        /// Source connection string (overrides PROD_DATABASE_URL)
        #[arg(long)]
        source_url: Option<String>,

        /// Destination connection string (overrides DATABASE_URL)
        #[arg(long)]
        target_url: Option<String>,

        /// Schema to clone
        #[arg(long, default_value = "public")]
        schema: String,

        /// Rows per fetch/insert batch
        #[arg(long, default_value = "1000")]
        batch_size: usize,

        /// Table forced to the front of the processing order
        #[arg(long, default_value = "User")]
        priority_table: String,

        /// Show the planned table order without touching the destination
        #[arg(long)]
        dry_run: bool,
    },

    /// Test connections to both databases
    HealthCheck {
        /// Source connection string (overrides PROD_DATABASE_URL)
        #[arg(long)]
        source_url: Option<String>,

        /// Destination connection string (overrides DATABASE_URL)
        #[arg(long)]
        target_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CloneError> {
    // Pick up a .env if the working directory has one, as deploy scripts
    // usually run this next to the application checkout.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    setup_logging(&cli.verbosity, &cli.log_format);

    match cli.command {
        Commands::Run {
            source_url,
            target_url,
            schema,
            batch_size,
            priority_table,
            dry_run,
        } => {
            let mut config = resolve_config(source_url, target_url)?;
            config.schema = schema;
            config.batch_size = batch_size;
            config.priority_table = Some(priority_table);

            let orchestrator = Orchestrator::new(config).await?;

            if dry_run {
                let plan = orchestrator.plan().await?;
                orchestrator.close().await;

                if cli.output_json {
                    println!("{}", serde_json::to_string_pretty(&plan)?);
                } else {
                    println!(
                        "Dry run: {} tables, {} foreign keys",
                        plan.tables.len(),
                        plan.foreign_keys.len()
                    );
                    for table in &plan.tables {
                        println!("  {}", table);
                    }
                    if !plan.cyclic_tables.is_empty() {
                        println!("  Cyclic tables: {:?}", plan.cyclic_tables);
                    }
                    if !plan.self_referencing_tables.is_empty() {
                        println!(
                            "  Self-referencing tables: {:?}",
                            plan.self_referencing_tables
                        );
                    }
                }
                return Ok(());
            }

            let report = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nData cloning completed.");
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!(
                    "  Tables: {}/{}",
                    report.tables_copied, report.tables_total
                );
                if !report.skipped_tables.is_empty() {
                    println!("  Skipped: {:?}", report.skipped_tables);
                }
                println!("  Rows: {}", report.rows_copied);
                println!("  Constraints restored: {}", report.constraints_restored);
            }
        }

        Commands::HealthCheck {
            source_url,
            target_url,
        } => {
            let config = resolve_config(source_url, target_url)?;
            let orchestrator = Orchestrator::new(config).await?;
            orchestrator.close().await;
            println!("Source: OK");
            println!("Destination: OK");
        }
    }

    Ok(())
}

/// Build the configuration from flags first, environment second.
fn resolve_config(
    source_url: Option<String>,
    target_url: Option<String>,
) -> Result<Config, CloneError> {
    Config::from_lookup(|key| {
        let flag = match key {
            SOURCE_URL_VAR => source_url.clone(),
            TARGET_URL_VAR => target_url.clone(),
            _ => None,
        };
        flag.or_else(|| std::env::var(key).ok())
    })
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
