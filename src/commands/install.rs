//! Install command implementation.

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

use crate::config::Config;
use crate::enforcer::{check_backend, check_root, MemoryBackend};
use crate::error::GeowallError;
use crate::fetcher::{load_feed, FeedSource};
use crate::lock::LockGuard;
use crate::reconciler::FirewallReconciler;
use crate::registry::{self, AddressRange, ParseReport};
use crate::state::InstallState;
use crate::utils::{format_count, format_thousands};

use super::iptables_backend;

/// Flags of `geowall install`
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    pub yes: bool,
    pub dry_run: bool,
    pub refresh: bool,
    pub allow_empty: bool,
}

/// Run the install command
pub async fn run(config: &Config, opts: InstallOptions) -> Result<()> {
    let backend = iptables_backend(config);
    if !opts.dry_run {
        check_root()?;
        check_backend(&backend)?;
    }

    if !opts.yes && !opts.dry_run && !confirm(config)? {
        return Err(GeowallError::Aborted.into());
    }

    let _lock = if opts.dry_run {
        None
    } else {
        Some(LockGuard::acquire()?)
    };

    let feed = load_feed(config, opts.refresh).await?;
    if feed.source == FeedSource::StaleCache {
        warn!("Installing from a stale feed");
    }
    let report = registry::parse_bytes(&feed.bytes, &config.country);
    check_ranges(&report, &config.country, opts.allow_empty)?;

    let mandatory = config.mandatory_nets()?;

    if opts.dry_run {
        for command in plan(config, &report.ranges)? {
            println!("{}", command);
        }
        info!(
            "Dry run: {} ranges, no firewall changes made",
            format_count(report.ranges.len())
        );
        return Ok(());
    }

    let count = FirewallReconciler::new(&backend, &config.chain_name)
        .with_policy(config.link_policy)
        .install(&report.ranges, &mandatory)?;

    let state = InstallState {
        installed_at: chrono::Utc::now(),
        country: config.country.to_ascii_uppercase(),
        chain: config.chain_name.clone(),
        range_count: report.ranges.len(),
        rule_count: count.total(),
        address_count: report.address_count(),
    };
    // The firewall is already in place; a missing record only affects `status`
    if let Err(e) = state.save() {
        warn!("Failed to save install state: {:#}", e);
    }

    println!();
    println!(
        "Whitelist installed: {} {} ranges ({} addresses) + {} mandatory ranges",
        format_count(count.ranges),
        state.country,
        format_thousands(state.address_count),
        count.mandatory
    );
    if count.failed > 0 {
        println!("  {} ranges could not be added (see warnings above)", count.failed);
    }
    println!("  Chain: {}", config.chain_name);
    println!("  Inspect: iptables -L {} -n", config.chain_name);
    println!("  Remove:  geowall remove");
    println!();

    Ok(())
}

/// Reject an empty result unless explicitly allowed.
fn check_ranges(report: &ParseReport, country: &str, allow_empty: bool) -> Result<()> {
    if report.is_empty() {
        if !allow_empty {
            return Err(GeowallError::EmptyRangeSet {
                country: country.to_ascii_uppercase(),
            }
            .into());
        }
        warn!("No ranges found; only mandatory ranges will be accepted");
    }
    Ok(())
}

/// Commands an install would issue on a host without a previous install.
pub fn plan(config: &Config, ranges: &[AddressRange]) -> Result<Vec<String>> {
    let backend = MemoryBackend::new();
    FirewallReconciler::new(&backend, &config.chain_name)
        .with_policy(config.link_policy)
        .install(ranges, &config.mandatory_nets()?)?;
    Ok(backend
        .commands()
        .into_iter()
        .map(|c| c.replacen("iptables", &config.iptables_path, 1))
        .collect())
}

fn confirm(config: &Config) -> Result<bool> {
    println!();
    println!(
        "This will DROP all inbound IPv4 traffic except from {} ranges and:",
        config.country.to_ascii_uppercase()
    );
    for range in &config.mandatory_ranges {
        println!("  {}", range);
    }
    println!("Make sure your own address is covered, or you may lose access to this host.");
    print!("Type 'yes' to continue: ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}
