//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "geowall")]
#[command(author, version, about = "Country IPv4 whitelist firewall for Linux hosts")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Country to whitelist, overriding the config file (e.g. AU)
    #[arg(long, global = true)]
    pub country: Option<String>,

    /// Whitelist chain name, overriding the config file
    #[arg(long, global = true)]
    pub chain: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download the registry feed and install the country whitelist
    Install {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Print the iptables commands that would run, without touching the firewall
        #[arg(long)]
        dry_run: bool,

        /// Download the feed even if the cached copy is fresh
        #[arg(long)]
        refresh: bool,

        /// Install even if the feed yields no ranges (only mandatory ranges are accepted)
        #[arg(long)]
        allow_empty: bool,
    },

    /// Remove the whitelist chain and its INPUT rules
    #[command(alias = "uninstall")]
    Remove,

    /// Show whether the whitelist is installed and linked
    Status,

    /// Print the country's IPv4 ranges from the registry feed
    Ranges {
        /// Download the feed even if the cached copy is fresh
        #[arg(long)]
        refresh: bool,
    },

    /// Show version
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install_flags() {
        let cli = Cli::parse_from(["geowall", "install", "--yes", "--dry-run", "--allow-empty"]);
        match cli.command {
            Commands::Install {
                yes,
                dry_run,
                refresh,
                allow_empty,
            } => {
                assert!(yes);
                assert!(dry_run);
                assert!(!refresh);
                assert!(allow_empty);
            }
            _ => panic!("expected install"),
        }
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_global_overrides_after_subcommand() {
        let cli = Cli::parse_from(["geowall", "ranges", "--country", "nz", "--chain", "NZ_WL", "-q"]);
        assert!(matches!(cli.command, Commands::Ranges { refresh: false }));
        assert_eq!(cli.country.as_deref(), Some("nz"));
        assert_eq!(cli.chain.as_deref(), Some("NZ_WL"));
        assert!(cli.quiet);
    }

    #[test]
    fn test_uninstall_alias() {
        let cli = Cli::parse_from(["geowall", "uninstall"]);
        assert!(matches!(cli.command, Commands::Remove));
    }
}
