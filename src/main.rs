//! geowall - Country IPv4 whitelist firewall for Linux hosts
//!
//! Accepts inbound traffic only from one country's registry-allocated ranges.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use geowall::cli::{Cli, Commands};
use geowall::commands::{self, install::InstallOptions, Overrides};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity; stdout is reserved for command output
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Version = cli.command {
        println!("geowall {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let overrides = Overrides {
        country: cli.country.clone(),
        chain: cli.chain.clone(),
    };
    let config = commands::load_config(&cli.config, &overrides)?;

    match cli.command {
        Commands::Install {
            yes,
            dry_run,
            refresh,
            allow_empty,
        } => {
            let opts = InstallOptions {
                yes,
                dry_run,
                refresh,
                allow_empty,
            };
            commands::install::run(&config, opts).await
        }
        Commands::Remove => commands::remove::run(&config).await,
        Commands::Status => commands::status::run(&config).await,
        Commands::Ranges { refresh } => commands::ranges::run(&config, refresh).await,
        Commands::Version => Ok(()),
    }
}
