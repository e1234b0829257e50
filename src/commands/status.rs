//! Status command implementation.

use anyhow::Result;
use chrono::{DateTime, Local};

use crate::config::Config;
use crate::enforcer::{check_root, FirewallBackend};
use crate::reconciler::{FirewallReconciler, WhitelistStatus};
use crate::state::{format_duration_ago, InstallState};
use crate::utils::{format_count, format_thousands};

use super::iptables_backend;

/// Run the status command
pub async fn run(config: &Config) -> Result<()> {
    println!();
    println!("Country: {}", config.country.to_ascii_uppercase());
    println!("Chain: {}", config.chain_name);

    let backend = iptables_backend(config);
    if check_root().is_err() {
        println!("Firewall: unknown (run as root to inspect iptables)");
    } else if !backend.is_available() {
        println!("Firewall: {} not found", backend.name());
    } else {
        let status = FirewallReconciler::new(&backend, &config.chain_name).status()?;
        println!("Firewall: {}", describe(&status));
        if status.chain_present {
            println!("Rules in chain: {}", format_count(status.rule_count));
        }
    }

    match InstallState::load()? {
        Some(state) => {
            let local: DateTime<Local> = state.installed_at.into();
            println!(
                "Last install: {} ({}), {} {} ranges, {} addresses",
                local.format("%Y-%m-%d %H:%M:%S"),
                format_duration_ago(state.installed_at),
                format_count(state.range_count),
                state.country,
                format_thousands(state.address_count)
            );
            if state.chain != config.chain_name {
                println!("  (installed into chain {})", state.chain);
            }
        }
        None => println!("Last install: never"),
    }

    println!();
    Ok(())
}

/// One-line summary of the link state.
fn describe(status: &WhitelistStatus) -> &'static str {
    if status.is_active() {
        "ACTIVE"
    } else if status.is_clean() {
        "NOT INSTALLED"
    } else if status.chain_present && !status.jump_linked && !status.deny_linked {
        "INACTIVE (chain present but not linked into INPUT)"
    } else if status.jump_linked && !status.deny_linked {
        "PARTIAL (default-deny rule missing, unmatched traffic is accepted)"
    } else if status.deny_linked && !status.jump_linked {
        "PARTIAL (jump rule missing, all inbound traffic is dropped)"
    } else {
        "PARTIAL (linked to a missing chain)"
    }
}
