//! loyalty-worker CLI entry point.

mod cli;

use clap::Parser;
use cli::{Batch, Cli};
use loyalty_core::ServiceBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    info!("loyalty-worker v{}", env!("CARGO_PKG_VERSION"));

    // Build configuration
    let config = cli.to_config()?;

    // Login handlers are not part of this binary; embedders attach them via
    // `RunningService::challenges`.
    let mut service = ServiceBuilder::new(config).build()?;

    // One-shot trigger: run the batch and print the summary
    if let Some(batch) = cli.once {
        let processor = service.processor();
        let summary = match batch {
            Batch::Warnings => {
                serde_json::to_string_pretty(&processor.send_trial_expiring_emails().await?)?
            }
            Batch::Expiry => {
                serde_json::to_string_pretty(&processor.process_expired_trials().await?)?
            }
        };
        println!("{summary}");
        return Ok(());
    }

    // Run until shutdown
    service.run().await?;

    info!("Goodbye!");
    Ok(())
}
